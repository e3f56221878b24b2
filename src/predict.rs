use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::models::{CompletionPrediction, PredictionStatus, RepairOrder, ShopAnalyticsProfile};
use crate::rules;
use crate::status::Status;

/// The expected forward path of an RO; prediction walks the stages after
/// the current one.
const FORWARD_SEQUENCE: [Status; 6] = [
    Status::ToSend,
    Status::WaitingQuote,
    Status::Approved,
    Status::BeingRepaired,
    Status::Shipping,
    Status::Paid,
];

/// Below this many completed samples the confidence band doubles.
const SMALL_SAMPLE_THRESHOLD: usize = 3;

/// Estimated completion for one in-flight RO, from its own shop's profile
/// only. `None` when there is no profile or no completed history to reason
/// from: sparse data degrades to no answer, not a fabricated one.
pub fn predict_completion(
    ro: &RepairOrder,
    profiles: &HashMap<String, ShopAnalyticsProfile>,
    today: NaiveDate,
) -> Option<CompletionPrediction> {
    if ro.current_status.is_terminal() {
        return None;
    }
    let profile = profiles.get(&ro.shop_name)?;
    if profile.completed_samples == 0 {
        return None;
    }

    let elapsed = rules::days_in_status(ro.current_status_date, today) as f64;

    let (remaining_days, remaining_stages) = match stage_index(&ro.current_status) {
        Some(stage) => {
            let current_velocity = profile
                .status_velocity
                .get(ro.current_status.label())
                .copied()
                .unwrap_or(0.0);
            let mut remaining = (current_velocity - elapsed).max(0.0);
            let mut stages = 1usize;
            for later in &FORWARD_SEQUENCE[stage + 1..] {
                remaining += profile
                    .status_velocity
                    .get(later.label())
                    .copied()
                    .unwrap_or(0.0);
                stages += 1;
            }
            (remaining, stages)
        }
        None => {
            // Off the canonical path: fall back to the shop's median
            // turnaround less the time already spent on this order.
            let total_elapsed = ro
                .first_history_date()
                .map(|start| (today - start).num_days().max(0) as f64)
                .unwrap_or(elapsed);
            let median = profile.median_turnaround?;
            ((median - total_elapsed).max(0.0), 1)
        }
    };

    let estimated_date = today + Duration::days(remaining_days.round() as i64);

    // Remaining-stage durations are correlated per shop, so uncertainty
    // sums across stages instead of shrinking under a root.
    let mut confidence_days = profile.variance.unwrap_or(0.0).max(1.0) * remaining_stages as f64;
    if profile.completed_samples < SMALL_SAMPLE_THRESHOLD {
        confidence_days *= 2.0;
    }

    let next_update = rules::ro_next_update_date(ro);
    let status = if estimated_date < today || rules::is_overdue(next_update, today) {
        PredictionStatus::Overdue
    } else if (estimated_date - today).num_days() as f64 <= confidence_days
        || rules::is_due_today(next_update, today)
    {
        PredictionStatus::AtRisk
    } else {
        PredictionStatus::OnTrack
    };

    Some(CompletionPrediction {
        ro_number: ro.ro_number.clone(),
        shop_name: ro.shop_name.clone(),
        estimated_date,
        confidence_days,
        status,
    })
}

/// Position of a status in the forward sequence. CURRENTLY BEING SHIPPED
/// predicts as the SHIPPING stage; RECEIVED sits past SHIPPING with only
/// payment left.
fn stage_index(status: &Status) -> Option<usize> {
    match status {
        Status::CurrentlyBeingShipped => Some(4),
        Status::Received => Some(5),
        _ => FORWARD_SEQUENCE.iter().position(|stage| stage == status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics;
    use crate::models::{StatusHistoryEntry, Trend};
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::BTreeMap;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 10, 0, 0).unwrap()
    }

    fn in_flight_ro(shop: &str, status: &str, status_date: DateTime<Utc>) -> RepairOrder {
        RepairOrder {
            ro_number: "RO-100".to_string(),
            shop_name: shop.to_string(),
            current_status: Status::parse(status),
            current_status_date: status_date,
            payment_terms: None,
            estimated_cost: None,
            actual_cost: None,
            status_history: vec![StatusHistoryEntry {
                status: Status::parse(status),
                occurred_at: status_date,
                entered_by: "ops".to_string(),
                cost: None,
                delivery_date: None,
                note: None,
            }],
        }
    }

    fn profile(shop: &str, samples: usize, velocity: &[(&str, f64)]) -> ShopAnalyticsProfile {
        ShopAnalyticsProfile {
            shop_name: shop.to_string(),
            active_ros: vec![],
            total_ros: samples,
            completed_samples: samples,
            median_turnaround: Some(20.0),
            overall_median: Some(20.0),
            recent_median: Some(20.0),
            variance: Some(2.0),
            average_cost: None,
            trend: Trend::Stable,
            status_velocity: velocity
                .iter()
                .map(|(status, days)| (status.to_string(), *days))
                .collect::<BTreeMap<_, _>>(),
            shipping_days: None,
        }
    }

    fn profiles_for(profile: ShopAnalyticsProfile) -> HashMap<String, ShopAnalyticsProfile> {
        HashMap::from([(profile.shop_name.clone(), profile)])
    }

    #[test]
    fn no_profile_means_no_prediction() {
        let ro = in_flight_ro("Aerotech", "BEING REPAIRED", at(2024, 5, 27));
        assert!(predict_completion(&ro, &HashMap::new(), date(2024, 6, 1)).is_none());
    }

    #[test]
    fn no_completed_history_means_no_prediction() {
        let ro = in_flight_ro("Aerotech", "BEING REPAIRED", at(2024, 5, 27));
        let mut shop = profile("Aerotech", 0, &[]);
        shop.median_turnaround = None;
        shop.variance = None;
        assert!(predict_completion(&ro, &profiles_for(shop), date(2024, 6, 1)).is_none());
    }

    #[test]
    fn terminal_orders_are_not_predicted() {
        let ro = in_flight_ro("Aerotech", "PAYMENT SENT", at(2024, 5, 27));
        let profiles = profiles_for(profile("Aerotech", 5, &[("BEING REPAIRED", 10.0)]));
        assert!(predict_completion(&ro, &profiles, date(2024, 6, 1)).is_none());
    }

    #[test]
    fn remaining_stage_velocities_add_up() {
        // Five days into a ten-day repair stage; shipping takes three.
        let ro = in_flight_ro("Aerotech", "BEING REPAIRED", at(2024, 5, 27));
        let profiles = profiles_for(profile(
            "Aerotech",
            5,
            &[("BEING REPAIRED", 10.0), ("SHIPPING", 3.0)],
        ));
        let prediction = predict_completion(&ro, &profiles, date(2024, 6, 1)).unwrap();
        assert_eq!(prediction.estimated_date, date(2024, 6, 9));
        // Three remaining stages (repair, shipping, payment) at MAD 2.0.
        assert_eq!(prediction.confidence_days, 6.0);
        assert_eq!(prediction.status, PredictionStatus::OnTrack);
    }

    #[test]
    fn overrunning_the_current_stage_never_goes_negative() {
        // Twenty days into the ten-day repair stage.
        let ro = in_flight_ro("Aerotech", "BEING REPAIRED", at(2024, 5, 12));
        let profiles = profiles_for(profile(
            "Aerotech",
            5,
            &[("BEING REPAIRED", 10.0), ("SHIPPING", 3.0)],
        ));
        let prediction = predict_completion(&ro, &profiles, date(2024, 6, 1)).unwrap();
        assert_eq!(prediction.estimated_date, date(2024, 6, 4));
        // Follow-up lapsed (+10 from May 12), so the order reads overdue.
        assert_eq!(prediction.status, PredictionStatus::Overdue);
    }

    #[test]
    fn estimates_inside_the_band_are_at_risk() {
        // Nine days in: one day of repair plus three of shipping left.
        let ro = in_flight_ro("Aerotech", "BEING REPAIRED", at(2024, 5, 23));
        let profiles = profiles_for(profile(
            "Aerotech",
            5,
            &[("BEING REPAIRED", 10.0), ("SHIPPING", 3.0)],
        ));
        let prediction = predict_completion(&ro, &profiles, date(2024, 6, 1)).unwrap();
        assert_eq!(prediction.estimated_date, date(2024, 6, 5));
        assert_eq!(prediction.status, PredictionStatus::AtRisk);
    }

    #[test]
    fn sparse_history_doubles_the_band() {
        let ro = in_flight_ro("Aerotech", "BEING REPAIRED", at(2024, 5, 27));
        let profiles = profiles_for(profile(
            "Aerotech",
            2,
            &[("BEING REPAIRED", 10.0), ("SHIPPING", 3.0)],
        ));
        let prediction = predict_completion(&ro, &profiles, date(2024, 6, 1)).unwrap();
        assert_eq!(prediction.confidence_days, 12.0);
    }

    #[test]
    fn off_sequence_statuses_fall_back_to_median_turnaround() {
        let ro = in_flight_ro("Aerotech", "AWAITING CUSTOMS", at(2024, 5, 20));
        let profiles = profiles_for(profile("Aerotech", 5, &[]));
        let prediction = predict_completion(&ro, &profiles, date(2024, 6, 1)).unwrap();
        // Median 20 less the 12 days already elapsed.
        assert_eq!(prediction.estimated_date, date(2024, 6, 9));
    }

    #[test]
    fn received_orders_only_wait_on_payment() {
        let ro = in_flight_ro("Aerotech", "RECEIVED", at(2024, 5, 31));
        let profiles = profiles_for(profile(
            "Aerotech",
            5,
            &[("RECEIVED", 4.0), ("BEING REPAIRED", 10.0)],
        ));
        let prediction = predict_completion(&ro, &profiles, date(2024, 6, 1)).unwrap();
        // One remaining day of the RECEIVED stage; earlier stages ignored.
        assert_eq!(prediction.estimated_date, date(2024, 6, 4));
    }

    #[test]
    fn composes_with_the_aggregator_end_to_end() {
        let entry = |status: &str, month: u32, day: u32| StatusHistoryEntry {
            status: Status::parse(status),
            occurred_at: at(2024, month, day),
            entered_by: "ops".to_string(),
            cost: None,
            delivery_date: None,
            note: None,
        };
        let completed = |number: &str, history: Vec<StatusHistoryEntry>| RepairOrder {
            ro_number: number.to_string(),
            shop_name: "Aerotech".to_string(),
            current_status: Status::PaymentSent,
            current_status_date: history.last().unwrap().occurred_at,
            payment_terms: None,
            estimated_cost: None,
            actual_cost: None,
            status_history: history,
        };

        let history = |start: u32| {
            vec![
                entry("BEING REPAIRED", 4, start),
                entry("SHIPPING", 4, start + 10),
                entry("PAYMENT SENT", 4, start + 13),
            ]
        };
        let orders = vec![
            completed("RO-1", history(1)),
            completed("RO-2", history(5)),
            completed("RO-3", history(10)),
        ];
        let today = date(2024, 6, 1);
        let profiles = analytics::build_profiles(&orders, today);

        let ro = in_flight_ro("Aerotech", "BEING REPAIRED", at(2024, 5, 27));
        let prediction = predict_completion(&ro, &profiles, today).unwrap();
        // Velocity is 10 days repairing and 3 shipping; 5 already elapsed.
        assert_eq!(prediction.estimated_date, date(2024, 6, 9));
        assert_eq!(prediction.shop_name, "Aerotech");
    }
}
