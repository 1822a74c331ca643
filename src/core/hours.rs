//! Eastern wall-clock policy as pure functions of an instant. Nothing here
//! reads the system clock; callers pass `DateTime<Utc>` so every cutoff is
//! unit-testable.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc, Weekday};
use chrono_tz::US::Eastern;

use crate::config::TradingWindow;

pub fn minute_of_day_eastern(t: DateTime<Utc>) -> u32 {
    let et = t.with_timezone(&Eastern);
    et.hour() * 60 + et.minute()
}

/// Inclusive containment in an Eastern minute-of-day window. Windows that
/// wrap midnight (start > end) are honored the same way session windows are.
pub fn within_window(t: DateTime<Utc>, window: &TradingWindow) -> bool {
    let current = minute_of_day_eastern(t);
    let start = window.start.0 * 60 + window.start.1;
    let end = window.end.0 * 60 + window.end.1;

    if start <= end {
        current >= start && current <= end
    } else {
        current >= start || current <= end
    }
}

pub fn before_cutoff(t: DateTime<Utc>, cutoff: (u32, u32)) -> bool {
    minute_of_day_eastern(t) < cutoff.0 * 60 + cutoff.1
}

/// Eastern calendar date, the partition key for archives and bias records.
pub fn date_key(t: DateTime<Utc>) -> String {
    t.with_timezone(&Eastern).format("%Y-%m-%d").to_string()
}

pub fn is_week_end_day(t: DateTime<Utc>) -> bool {
    t.with_timezone(&Eastern).weekday() == Weekday::Fri
}

/// Monday through Friday date keys of the Eastern week containing `t`.
pub fn week_date_keys(t: DateTime<Utc>) -> Vec<String> {
    let et = t.with_timezone(&Eastern).date_naive();
    let monday = et - Duration::days(et.weekday().num_days_from_monday() as i64);
    (0..5)
        .map(|d| (monday + Duration::days(d)).format("%Y-%m-%d").to_string())
        .collect()
}

/// Render a payload timestamp for humans (and for the signal fingerprint).
/// Unparseable input is passed through, or "N/A" when empty.
pub fn format_display(raw: &str) -> String {
    if raw.is_empty() {
        return "N/A".to_string();
    }
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => t
            .with_timezone(&Eastern)
            .format("%a, %b %-d, %Y, %-I:%M %p %Z")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}
