//! UTC calendar formatting for file names.
//!
//! Only the handful of formats used for default output names and log files
//! are needed, so dates are derived directly from the Unix timestamp.

use std::time::{SystemTime, UNIX_EPOCH};

/// Format a [`SystemTime`] as `YYYY-MM-DD` in UTC.
pub fn format_utc_date(time: SystemTime) -> String {
    let (year, month, day, _) = split_utc(time);
    format!("{year:04}-{month:02}-{day:02}")
}

/// Format a [`SystemTime`] as `YYYYMMDD_HHMMSS` in UTC.
pub fn format_utc_timestamp(time: SystemTime) -> String {
    let (year, month, day, time_of_day) = split_utc(time);
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;

    format!("{year:04}{month:02}{day:02}_{hours:02}{minutes:02}{seconds:02}")
}

/// Today's date in UTC as `YYYY-MM-DD`.
pub fn today_utc() -> String {
    format_utc_date(SystemTime::now())
}

fn split_utc(time: SystemTime) -> (u64, u64, u64, u64) {
    let secs = time
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    let (year, month, day) = days_to_date(secs / 86400);
    (year, month, day, secs % 86400)
}

/// Convert days since Unix epoch to (year, month, day) in the Gregorian calendar.
fn days_to_date(days_since_epoch: u64) -> (u64, u64, u64) {
    // civil_from_days (Howard Hinnant); epoch shifted to 0000-03-01.
    let z = days_since_epoch as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097) as u64; // [0, 146096]
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365; // [0, 399]
    let y = (yoe as i64) + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100); // [0, 365]
    let mp = (5 * doy + 2) / 153; // [0, 11]
    let d = doy - (153 * mp + 2) / 5 + 1; // [1, 31]
    let m = if mp < 10 { mp + 3 } else { mp - 9 }; // [1, 12]
    let y = if m <= 2 { y + 1 } else { y };

    (y as u64, m, d)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_should_format_epoch() {
        assert_eq!(format_utc_date(UNIX_EPOCH), "1970-01-01");
        assert_eq!(format_utc_timestamp(UNIX_EPOCH), "19700101_000000");
    }

    #[test]
    fn test_should_format_known_instant() {
        // 2026-02-03 14:30:12 UTC
        let time = UNIX_EPOCH + Duration::from_secs(1_770_129_012);
        assert_eq!(format_utc_date(time), "2026-02-03");
        assert_eq!(format_utc_timestamp(time), "20260203_143012");
    }

    #[test]
    fn test_should_convert_days_to_known_dates() {
        assert_eq!(days_to_date(0), (1970, 1, 1));
        assert_eq!(days_to_date(10957), (2000, 1, 1));
        assert_eq!(days_to_date(19782), (2024, 2, 29));
    }
}
