use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use crate::models::{RepairOrder, ShippingDays, ShopAnalyticsProfile, Trend};
use crate::status::Status;

/// Recent vs overall medians must differ by more than this many days before
/// a trend is reported; small-sample noise inside the band reads as stable.
pub const TREND_TOLERANCE_DAYS: f64 = 2.0;
const RECENT_WINDOW_DAYS: i64 = 30;
/// A single recent completion is a point, not a trend.
const MIN_RECENT_SAMPLES: usize = 2;

/// Rebuilds every shop's profile from the full RO snapshot. No incremental
/// state: callers re-run this whenever the underlying set changes.
pub fn build_profiles(
    orders: &[RepairOrder],
    today: NaiveDate,
) -> HashMap<String, ShopAnalyticsProfile> {
    let mut by_shop: HashMap<&str, Vec<&RepairOrder>> = HashMap::new();
    for ro in orders {
        by_shop.entry(ro.shop_name.as_str()).or_default().push(ro);
    }

    by_shop
        .into_iter()
        .map(|(shop, ros)| (shop.to_string(), profile_for(shop, &ros, today)))
        .collect()
}

fn profile_for(shop_name: &str, ros: &[&RepairOrder], today: NaiveDate) -> ShopAnalyticsProfile {
    let mut active_ros: Vec<String> = ros
        .iter()
        .filter(|ro| !ro.current_status.is_terminal())
        .map(|ro| ro.ro_number.clone())
        .collect();
    active_ros.sort();

    let samples: Vec<(f64, NaiveDate)> = ros.iter().filter_map(|ro| turnaround_sample(ro)).collect();
    let all_days: Vec<f64> = samples.iter().map(|(days, _)| *days).collect();

    let overall_median = median(&all_days);
    let recent_days: Vec<f64> = samples
        .iter()
        .filter(|(_, completed)| (today - *completed).num_days() <= RECENT_WINDOW_DAYS)
        .map(|(days, _)| *days)
        .collect();
    let recent_median = if recent_days.len() >= MIN_RECENT_SAMPLES {
        median(&recent_days)
    } else {
        overall_median
    };

    let variance = overall_median.map(|m| mean_abs_deviation(&all_days, m));
    let trend = trend_for(recent_median, overall_median, TREND_TOLERANCE_DAYS);

    let costs: Vec<f64> = ros.iter().filter_map(|ro| ro.known_cost()).collect();
    let average_cost = if costs.is_empty() {
        None
    } else {
        Some(costs.iter().sum::<f64>() / costs.len() as f64)
    };

    ShopAnalyticsProfile {
        shop_name: shop_name.to_string(),
        active_ros,
        total_ros: ros.len(),
        completed_samples: samples.len(),
        median_turnaround: overall_median,
        overall_median,
        recent_median,
        variance,
        average_cost,
        trend,
        status_velocity: status_velocity(ros),
        shipping_days: shipping_span(ros),
    }
}

/// Calendar days from the first tracked event to the completion event.
/// Orders whose history lacks either end contribute no sample.
fn turnaround_sample(ro: &RepairOrder) -> Option<(f64, NaiveDate)> {
    let completion_idx = ro
        .status_history
        .iter()
        .position(|entry| entry.status.is_completion())?;
    if completion_idx == 0 {
        // A lone completion entry has no start event to measure from.
        return None;
    }

    let start = ro.first_history_date()?;
    let completed = ro.status_history[completion_idx].occurred_at.date_naive();
    Some(((completed - start).num_days().max(0) as f64, completed))
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Mean absolute deviation from the median. A part lost for a year widens
/// this linearly where it would explode a standard deviation.
pub fn mean_abs_deviation(values: &[f64], median: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - median).abs()).sum::<f64>() / values.len() as f64
}

pub fn trend_for(recent: Option<f64>, overall: Option<f64>, tolerance_days: f64) -> Trend {
    match (recent, overall) {
        (Some(recent), Some(overall)) if recent < overall - tolerance_days => Trend::Improving,
        (Some(recent), Some(overall)) if recent > overall + tolerance_days => Trend::Declining,
        _ => Trend::Stable,
    }
}

/// Median days between each status entry and the next one, per status.
/// Statuses never observed with a successor are omitted entirely.
fn status_velocity(ros: &[&RepairOrder]) -> BTreeMap<String, f64> {
    let mut durations: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for ro in ros {
        for window in ro.status_history.windows(2) {
            let days = (window[1].occurred_at.date_naive() - window[0].occurred_at.date_naive())
                .num_days()
                .max(0) as f64;
            durations
                .entry(window[0].status.label().to_string())
                .or_default()
                .push(days);
        }
    }

    durations
        .into_iter()
        .filter_map(|(status, days)| median(&days).map(|m| (status, m)))
        .collect()
}

/// Observed span between a shipped entry and its delivery, across all of
/// the shop's history. Delivery is the entry's own delivery date when
/// recorded, otherwise the next RECEIVED entry.
fn shipping_span(ros: &[&RepairOrder]) -> Option<ShippingDays> {
    let mut spans: Vec<i64> = Vec::new();

    for ro in ros {
        for (idx, entry) in ro.status_history.iter().enumerate() {
            if !matches!(
                entry.status,
                Status::Shipping | Status::CurrentlyBeingShipped
            ) {
                continue;
            }
            let delivered = entry.delivery_date.or_else(|| {
                ro.status_history[idx + 1..]
                    .iter()
                    .find(|later| later.status == Status::Received)
                    .map(|later| later.occurred_at.date_naive())
            });
            if let Some(delivered) = delivered {
                spans.push((delivered - entry.occurred_at.date_naive()).num_days().max(0));
            }
        }
    }

    let min = *spans.iter().min()?;
    let max = *spans.iter().max()?;
    Some(ShippingDays { min, max })
}
