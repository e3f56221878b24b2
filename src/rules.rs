use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

use crate::models::RepairOrder;
use crate::status::Status;

/// An RO is on track only with more than this many days of runway left.
const ON_TRACK_RUNWAY_DAYS: i64 = 3;
/// Fallback offset for statuses with no configured follow-up cadence.
const DEFAULT_FOLLOW_UP_DAYS: i64 = 7;
/// Conservative fallback when payment terms cannot be parsed.
const UNPARSED_TERMS_FOLLOW_UP_DAYS: i64 = 30;

/// When the next status check-in is due, or `None` for settled/terminal
/// orders. Timestamps are truncated to their UTC date first, so time of day
/// never shifts the result.
pub fn next_update_date(
    status: &Status,
    status_date: DateTime<Utc>,
    payment_terms: Option<&str>,
) -> Option<NaiveDate> {
    if status.is_terminal() {
        return None;
    }

    let base = status_date.date_naive();

    if status.is_paid_class() {
        return payment_follow_up_days(payment_terms).map(|days| base + Duration::days(days));
    }

    let days = match status {
        Status::ToSend => 3,
        Status::WaitingQuote => 14,
        Status::Approved => 7,
        Status::BeingRepaired => 10,
        Status::CurrentlyBeingShipped => 5,
        Status::Received => 3,
        Status::Shipping => 3,
        _ => DEFAULT_FOLLOW_UP_DAYS,
    };

    Some(base + Duration::days(days))
}

pub fn ro_next_update_date(ro: &RepairOrder) -> Option<NaiveDate> {
    next_update_date(
        &ro.current_status,
        ro.current_status_date,
        ro.payment_terms.as_deref(),
    )
}

/// Days until an invoice follow-up, from the payment terms string.
/// `None` means settled: no follow-up is ever due.
fn payment_follow_up_days(terms: Option<&str>) -> Option<i64> {
    let raw = terms?.trim();
    if raw.is_empty() {
        return None;
    }

    let upper = raw.to_uppercase();
    if let Some(days) = parse_net_days(&upper) {
        return Some(days);
    }
    if ["COD", "PREPAID", "CREDIT CARD"]
        .iter()
        .any(|settled| upper.contains(settled))
    {
        return None;
    }
    if upper.contains("WIRE") || upper.contains("XFER") {
        return Some(3);
    }

    Some(UNPARSED_TERMS_FOLLOW_UP_DAYS)
}

/// `NET 30`, `net30`, `Net  45` and the like.
fn parse_net_days(upper: &str) -> Option<i64> {
    let rest = &upper[upper.find("NET")? + 3..];
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

pub fn days_in_status(status_date: DateTime<Utc>, today: NaiveDate) -> i64 {
    (today - status_date.date_naive()).num_days().max(0)
}

/// True when the follow-up date is today or already lapsed.
pub fn is_due_today(next_update: Option<NaiveDate>, today: NaiveDate) -> bool {
    next_update.is_some_and(|due| due <= today)
}

pub fn is_due_within(next_update: Option<NaiveDate>, today: NaiveDate, days: i64) -> bool {
    next_update.is_some_and(|due| due <= today + Duration::days(days))
}

pub fn is_overdue(next_update: Option<NaiveDate>, today: NaiveDate) -> bool {
    next_update.is_some_and(|due| due < today)
}

pub fn days_overdue(next_update: Option<NaiveDate>, today: NaiveDate) -> i64 {
    next_update.map_or(0, |due| (today - due).num_days().max(0))
}

/// No pending follow-up is vacuously on track.
pub fn is_on_track(next_update: Option<NaiveDate>, today: NaiveDate) -> bool {
    next_update.map_or(true, |due| (due - today).num_days() > ON_TRACK_RUNWAY_DAYS)
}

/// `date` itself if it is a weekday, otherwise the following Monday.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut day = date;
    while matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        day += Duration::days(1);
    }
    day
}

/// Advance by `days` business days, skipping Saturdays and Sundays. The
/// result always lands on a weekday.
pub fn add_business_days(start: NaiveDate, days: i64) -> NaiveDate {
    let mut day = next_business_day(start);
    for _ in 0..days.max(0) {
        day += Duration::days(1);
        day = next_business_day(day);
    }
    day
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 9, 30, 0).unwrap()
    }

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn waiting_quote_follows_up_after_fourteen_days() {
        let next = next_update_date(&Status::WaitingQuote, at(2024, 1, 1), None);
        assert_eq!(next, Some(date(2024, 1, 15)));
    }

    #[test]
    fn follow_up_ignores_time_of_day() {
        let morning = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let night = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 59).unwrap();
        assert_eq!(
            next_update_date(&Status::ToSend, morning, None),
            next_update_date(&Status::ToSend, night, None),
        );
    }

    #[test]
    fn unknown_status_falls_back_to_a_week() {
        let status = Status::parse("AWAITING CUSTOMS");
        let next = next_update_date(&status, at(2024, 3, 1), None);
        assert_eq!(next, Some(date(2024, 3, 8)));
    }

    #[test]
    fn paid_with_net_terms_adds_calendar_days() {
        let status = Status::parse("PAID >>>>");
        let next = next_update_date(&status, at(2024, 1, 1), Some("NET 30"));
        assert_eq!(next, Some(date(2024, 1, 31)));
    }

    #[test]
    fn net_parsing_tolerates_spacing_and_case() {
        let status = Status::Paid;
        assert_eq!(
            next_update_date(&status, at(2024, 1, 1), Some("net15")),
            Some(date(2024, 1, 16)),
        );
        assert_eq!(
            next_update_date(&status, at(2024, 1, 1), Some("Net  45 days")),
            Some(date(2024, 2, 15)),
        );
    }

    #[test]
    fn settled_terms_need_no_follow_up() {
        let status = Status::parse("PAID >>>>");
        assert_eq!(next_update_date(&status, at(2024, 1, 1), Some("COD")), None);
        assert_eq!(
            next_update_date(&status, at(2024, 1, 1), Some("Prepaid")),
            None,
        );
        assert_eq!(
            next_update_date(&status, at(2024, 1, 1), Some("credit card on file")),
            None,
        );
    }

    #[test]
    fn wire_terms_follow_up_in_three_days() {
        let next = next_update_date(&Status::Paid, at(2024, 1, 1), Some("wire xfer"));
        assert_eq!(next, Some(date(2024, 1, 4)));
    }

    #[test]
    fn unrecognized_terms_default_to_thirty_days() {
        let next = next_update_date(&Status::Paid, at(2024, 1, 1), Some("2/10 n30??"));
        assert_eq!(next, Some(date(2024, 1, 31)));
    }

    #[test]
    fn paid_without_terms_is_settled() {
        assert_eq!(next_update_date(&Status::Paid, at(2024, 1, 1), None), None);
        assert_eq!(
            next_update_date(&Status::Paid, at(2024, 1, 1), Some("  ")),
            None,
        );
    }

    #[test]
    fn terminal_statuses_ignore_terms() {
        assert_eq!(
            next_update_date(&Status::PaymentSent, at(2024, 1, 1), Some("NET 30")),
            None,
        );
        assert_eq!(next_update_date(&Status::Ber, at(2024, 1, 1), None), None);
    }

    #[test]
    fn days_in_status_floors_and_clamps() {
        let today = date(2024, 6, 1);
        assert_eq!(days_in_status(at(2024, 5, 27), today), 5);
        assert_eq!(days_in_status(at(2024, 6, 1), today), 0);
        // Future-dated entries clamp instead of going negative.
        assert_eq!(days_in_status(at(2024, 6, 10), today), 0);
    }

    #[test]
    fn due_today_covers_the_whole_day_and_lapsed_dates() {
        let today = date(2024, 6, 1);
        assert!(is_due_today(Some(date(2024, 6, 1)), today));
        assert!(is_due_today(Some(date(2024, 5, 20)), today));
        assert!(!is_due_today(Some(date(2024, 6, 2)), today));
        assert!(!is_due_today(None, today));
    }

    #[test]
    fn due_within_window() {
        let today = date(2024, 6, 1);
        assert!(is_due_within(Some(date(2024, 6, 5)), today, 5));
        assert!(!is_due_within(Some(date(2024, 6, 7)), today, 5));
    }

    #[test]
    fn on_track_requires_runway() {
        let today = date(2024, 6, 1);
        assert!(is_on_track(None, today));
        assert!(is_on_track(Some(date(2024, 6, 5)), today));
        assert!(!is_on_track(Some(date(2024, 6, 4)), today));
        assert!(!is_on_track(Some(date(2024, 5, 30)), today));
    }

    #[test]
    fn overdue_days_count_from_the_lapsed_date() {
        let today = date(2024, 6, 1);
        assert!(is_overdue(Some(date(2024, 5, 28)), today));
        assert_eq!(days_overdue(Some(date(2024, 5, 28)), today), 4);
        assert!(!is_overdue(Some(date(2024, 6, 1)), today));
        assert_eq!(days_overdue(None, today), 0);
    }

    #[test]
    fn weekend_dates_land_on_monday() {
        // 2024-06-01 is a Saturday.
        assert_eq!(next_business_day(date(2024, 6, 1)), date(2024, 6, 3));
        assert_eq!(next_business_day(date(2024, 6, 2)), date(2024, 6, 3));
        assert_eq!(next_business_day(date(2024, 6, 3)), date(2024, 6, 3));
    }

    #[test]
    fn business_day_addition_skips_weekends() {
        // Friday + 1 business day = Monday.
        assert_eq!(add_business_days(date(2024, 5, 31), 1), date(2024, 6, 3));
        // Thursday + 5 business days = next Thursday.
        assert_eq!(add_business_days(date(2024, 5, 30), 5), date(2024, 6, 6));
        assert_eq!(add_business_days(date(2024, 5, 30), 0), date(2024, 5, 30));
    }
}
