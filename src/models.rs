use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::status::Status;

#[derive(Debug, Clone)]
pub struct Shop {
    pub name: String,
    pub payment_terms: Option<String>,
}

/// One status transition. History is append-only; array order is
/// chronological order.
#[derive(Debug, Clone)]
pub struct StatusHistoryEntry {
    pub status: Status,
    pub occurred_at: DateTime<Utc>,
    pub entered_by: String,
    pub cost: Option<f64>,
    pub delivery_date: Option<NaiveDate>,
    pub note: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RepairOrder {
    pub ro_number: String,
    pub shop_name: String,
    pub current_status: Status,
    pub current_status_date: DateTime<Utc>,
    pub payment_terms: Option<String>,
    pub estimated_cost: Option<f64>,
    pub actual_cost: Option<f64>,
    pub status_history: Vec<StatusHistoryEntry>,
}

impl RepairOrder {
    pub fn first_history_date(&self) -> Option<NaiveDate> {
        self.status_history
            .first()
            .map(|entry| entry.occurred_at.date_naive())
    }

    /// Best known cost: the invoiced amount when recorded, otherwise the
    /// latest cost quoted anywhere in the history.
    pub fn known_cost(&self) -> Option<f64> {
        self.actual_cost.or_else(|| {
            self.status_history
                .iter()
                .rev()
                .find_map(|entry| entry.cost)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShippingDays {
    pub min: i64,
    pub max: i64,
}

/// Derived per-shop statistics. Ephemeral: recomputed from the full RO
/// snapshot on every call, never persisted. Statistics over an empty sample
/// set are `None`, not zero.
#[derive(Debug, Clone, Serialize)]
pub struct ShopAnalyticsProfile {
    pub shop_name: String,
    pub active_ros: Vec<String>,
    pub total_ros: usize,
    pub completed_samples: usize,
    pub median_turnaround: Option<f64>,
    pub overall_median: Option<f64>,
    pub recent_median: Option<f64>,
    /// Mean absolute deviation from the median, in days.
    pub variance: Option<f64>,
    /// Mean known repair cost across the shop's orders.
    pub average_cost: Option<f64>,
    pub trend: Trend,
    /// Status label -> median days spent in that status.
    pub status_velocity: BTreeMap<String, f64>,
    pub shipping_days: Option<ShippingDays>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PredictionStatus {
    OnTrack,
    AtRisk,
    Overdue,
}

impl fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PredictionStatus::OnTrack => "on-track",
            PredictionStatus::AtRisk => "at-risk",
            PredictionStatus::Overdue => "overdue",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionPrediction {
    pub ro_number: String,
    pub shop_name: String,
    pub estimated_date: NaiveDate,
    /// +/- band around the estimate, in days.
    pub confidence_days: f64,
    pub status: PredictionStatus,
}
