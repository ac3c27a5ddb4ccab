//! Dutch display strings for durations, deviations and clock times.

use std::fmt::Display;

use chrono::{DateTime, TimeZone};

/// Format a duration or deviation given in seconds.
///
/// With `signed`, zero and positive values (behind schedule) get a "+ "
/// prefix and negative values (ahead of schedule) a "- " prefix.
///
/// ```
/// use linker_engine::seconds_to_hours_minutes;
///
/// assert_eq!(seconds_to_hours_minutes(Some(5400), true), "+ 1 uur 30 minuten");
/// assert_eq!(seconds_to_hours_minutes(Some(-30), true), "- 30 seconden");
/// assert_eq!(seconds_to_hours_minutes(Some(600), false), "10 minuten");
/// assert_eq!(seconds_to_hours_minutes(None, true), "-");
/// ```
pub fn seconds_to_hours_minutes(seconds: Option<i64>, signed: bool) -> String {
    let Some(seconds) = seconds else {
        return "-".to_string();
    };

    let sign = match (signed, seconds < 0) {
        (false, _) => "",
        (true, true) => "- ",
        (true, false) => "+ ",
    };
    let magnitude = seconds.unsigned_abs();

    if magnitude == 0 {
        return format!("{}0 minuten", sign);
    }
    if magnitude < 60 {
        return format!("{}{} seconden", sign, magnitude);
    }

    let hours = magnitude / 3600;
    let minutes = (magnitude / 60) % 60;
    if hours > 0 {
        format!("{}{} uur {} minuten", sign, hours, minutes)
    } else {
        format!("{}{} minuten", sign, minutes)
    }
}

/// Clock time "HH:MM" in the timestamp's own offset, empty when absent.
pub fn to_hours_minutes<Tz: TimeZone>(date_time: Option<&DateTime<Tz>>) -> String
where
    Tz::Offset: Display,
{
    date_time
        .map(|dt| dt.format("%H:%M").to_string())
        .unwrap_or_default()
}

/// Compact average label in whole minutes, e.g. "27m".
pub fn average_minutes_label(seconds: Option<i64>) -> String {
    match seconds {
        // Halves round up, towards positive infinity
        Some(s) => format!("{}m", (s as f64 / 60.0 + 0.5).floor() as i64),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    #[test]
    fn test_zero_and_sub_minute() {
        assert_eq!(seconds_to_hours_minutes(Some(0), true), "+ 0 minuten");
        assert_eq!(seconds_to_hours_minutes(Some(0), false), "0 minuten");
        assert_eq!(seconds_to_hours_minutes(Some(-30), true), "- 30 seconden");
        assert_eq!(seconds_to_hours_minutes(Some(59), true), "+ 59 seconden");
        assert_eq!(seconds_to_hours_minutes(Some(45), false), "45 seconden");
    }

    #[test]
    fn test_hours_and_minutes() {
        assert_eq!(seconds_to_hours_minutes(Some(5400), true), "+ 1 uur 30 minuten");
        assert_eq!(seconds_to_hours_minutes(Some(60), true), "+ 1 minuten");
        assert_eq!(seconds_to_hours_minutes(Some(119), true), "+ 1 minuten");
        assert_eq!(seconds_to_hours_minutes(Some(3600), true), "+ 1 uur 0 minuten");
        assert_eq!(seconds_to_hours_minutes(Some(-7325), true), "- 2 uur 2 minuten");
        assert_eq!(seconds_to_hours_minutes(Some(1500), false), "25 minuten");
    }

    #[test]
    fn test_missing_value() {
        assert_eq!(seconds_to_hours_minutes(None, true), "-");
        assert_eq!(seconds_to_hours_minutes(None, false), "-");
        assert_eq!(average_minutes_label(None), "-");
    }

    #[test]
    fn test_extreme_values_do_not_overflow() {
        let formatted = seconds_to_hours_minutes(Some(i64::MIN), true);
        assert!(formatted.starts_with("- "));
    }

    #[test]
    fn test_to_hours_minutes() {
        let utc = Utc.with_ymd_and_hms(2024, 7, 20, 9, 5, 30).unwrap();
        assert_eq!(to_hours_minutes(Some(&utc)), "09:05");

        let brussels = FixedOffset::east_opt(2 * 3600).unwrap();
        assert_eq!(to_hours_minutes(Some(&utc.with_timezone(&brussels))), "11:05");

        assert_eq!(to_hours_minutes::<Utc>(None), "");
    }

    #[test]
    fn test_average_minutes_label() {
        assert_eq!(average_minutes_label(Some(1620)), "27m");
        assert_eq!(average_minutes_label(Some(90)), "2m");
        assert_eq!(average_minutes_label(Some(89)), "1m");
        assert_eq!(average_minutes_label(Some(-90)), "-1m");
        assert_eq!(average_minutes_label(Some(0)), "0m");
    }
}
