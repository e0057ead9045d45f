//! Timestamp and calendar helpers

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current calendar date (UTC)
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Half-open UTC range `[start, end)` covering one calendar day
pub fn day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap_or_default());
    (start, start + Duration::days(1))
}

/// First and last day of the month containing `date`
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let next_month = if first.month() == 12 {
        NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)
    };
    let last = next_month
        .and_then(|d| d.pred_opt())
        .unwrap_or(first);
    (first, last)
}

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Seconds since the Unix epoch as a float, microsecond precision
pub fn epoch_seconds(ts: DateTime<Utc>) -> f64 {
    ts.timestamp_micros() as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_recent_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01
        assert!(timestamp.timestamp() < 4_102_444_800); // 2100-01-01
    }

    #[test]
    fn test_day_bounds_span_one_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let (start, end) = day_bounds(date);
        assert_eq!(start.to_rfc3339(), "2024-03-10T00:00:00+00:00");
        assert_eq!(end - start, Duration::days(1));
    }

    #[test]
    fn test_month_bounds_regular_and_december() {
        let (first, last) = month_bounds(NaiveDate::from_ymd_opt(2024, 2, 17).unwrap());
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());

        let (first, last) = month_bounds(NaiveDate::from_ymd_opt(2023, 12, 5).unwrap());
        assert_eq!(first, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2024-03-14 is a Thursday
        let monday = week_start(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(monday, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn test_epoch_seconds_keeps_micros() {
        let ts = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        assert!((epoch_seconds(ts) - 1_700_000_000.25).abs() < 1e-6);
    }
}
