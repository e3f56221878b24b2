use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{CompletionPrediction, PredictionStatus, RepairOrder, ShopAnalyticsProfile};
use crate::predict;
use crate::rules;

const FOLLOW_UP_HORIZON_DAYS: i64 = 7;

fn format_days(days: f64) -> String {
    if (days - days.round()).abs() < f64::EPSILON {
        format!("{:.0}", days)
    } else {
        format!("{:.1}", days)
    }
}

pub fn build_report(
    scope: Option<&str>,
    today: NaiveDate,
    orders: &[RepairOrder],
    profiles: &HashMap<String, ShopAnalyticsProfile>,
) -> String {
    let mut output = String::new();
    let scope_label = scope.unwrap_or("all shops");

    let _ = writeln!(output, "# Repair Order Tracking Report");
    let _ = writeln!(output, "Generated for {} on {}", scope_label, today);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Shop Performance");

    let mut shops: Vec<&ShopAnalyticsProfile> = profiles.values().collect();
    shops.sort_by(|a, b| a.shop_name.cmp(&b.shop_name));

    if shops.is_empty() {
        let _ = writeln!(output, "No repair orders on file.");
    } else {
        for profile in shops.iter() {
            match profile.median_turnaround {
                Some(median) => {
                    let _ = writeln!(
                        output,
                        "- {}: {} ROs ({} active), median turnaround {} days over {} completions, MAD {} days, trend {}",
                        profile.shop_name,
                        profile.total_ros,
                        profile.active_ros.len(),
                        format_days(median),
                        profile.completed_samples,
                        format_days(profile.variance.unwrap_or(0.0)),
                        profile.trend,
                    );
                }
                None => {
                    let _ = writeln!(
                        output,
                        "- {}: {} ROs ({} active), no completed history yet",
                        profile.shop_name,
                        profile.total_ros,
                        profile.active_ros.len(),
                    );
                }
            }
            if let Some(shipping) = profile.shipping_days {
                let _ = writeln!(
                    output,
                    "  shipping {}-{} days observed",
                    shipping.min, shipping.max
                );
            }
            if let Some(cost) = profile.average_cost {
                let _ = writeln!(output, "  average repair cost ${cost:.2}");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Follow-Ups Due");

    let mut due: Vec<(&RepairOrder, NaiveDate)> = orders
        .iter()
        .filter_map(|ro| {
            let next = rules::ro_next_update_date(ro);
            if rules::is_due_within(next, today, FOLLOW_UP_HORIZON_DAYS) {
                next.map(|date| (ro, date))
            } else {
                None
            }
        })
        .collect();
    due.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.ro_number.cmp(&b.0.ro_number)));

    if due.is_empty() {
        let _ = writeln!(output, "Nothing due in the next {FOLLOW_UP_HORIZON_DAYS} days.");
    } else {
        for (ro, next) in due.iter() {
            let lapsed = rules::days_overdue(Some(*next), today);
            if lapsed > 0 {
                let _ = writeln!(
                    output,
                    "- {} ({}) {} - follow-up was due {}, {} days overdue",
                    ro.ro_number, ro.shop_name, ro.current_status, next, lapsed
                );
            } else {
                let _ = writeln!(
                    output,
                    "- {} ({}) {} - follow up by {}",
                    ro.ro_number, ro.shop_name, ro.current_status, next
                );
            }
            if let Some(cost) = ro.estimated_cost {
                let _ = writeln!(output, "  estimated cost ${cost:.2}");
            }
            if ro.current_status.is_paid_class() {
                // Payment reminders go out on business days only.
                let _ = writeln!(
                    output,
                    "  payment reminder lands {}, escalation {}",
                    rules::next_business_day(*next),
                    rules::add_business_days(*next, 5),
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Completion Outlook");

    let mut predictions: Vec<CompletionPrediction> = orders
        .iter()
        .filter_map(|ro| predict::predict_completion(ro, profiles, today))
        .collect();
    predictions.sort_by(|a, b| {
        rank(a.status)
            .cmp(&rank(b.status))
            .then_with(|| a.estimated_date.cmp(&b.estimated_date))
            .then_with(|| a.ro_number.cmp(&b.ro_number))
    });

    if predictions.is_empty() {
        let _ = writeln!(output, "No in-flight ROs with enough shop history to predict.");
    } else {
        for prediction in predictions.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): estimated completion {} +/- {} days - {}",
                prediction.ro_number,
                prediction.shop_name,
                prediction.estimated_date,
                format_days(prediction.confidence_days),
                prediction.status,
            );
        }
    }

    output
}

fn rank(status: PredictionStatus) -> u8 {
    match status {
        PredictionStatus::Overdue => 0,
        PredictionStatus::AtRisk => 1,
        PredictionStatus::OnTrack => 2,
    }
}
