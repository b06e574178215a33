//! Timestamp utilities
//!
//! Queue timestamps are persisted as integer microseconds since the Unix
//! epoch so that SQLite compares and orders them numerically.

use chrono::{DateTime, Duration, TimeZone, Utc};

/// Get current UTC timestamp, truncated to the stored precision
pub fn now() -> DateTime<Utc> {
    from_micros(Utc::now().timestamp_micros())
}

/// Convert a timestamp to stored microseconds
pub fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Convert stored microseconds back to a timestamp
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    Utc.timestamp_micros(micros)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Retention cutoff: entries played before the returned instant may be purged
///
/// A window reaching past the representable range clamps to the Unix epoch,
/// which purges nothing.
pub fn retention_cutoff(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        // After 2000-01-01 and before 2100-01-01
        assert!(timestamp.timestamp() > 946_684_800);
        assert!(timestamp.timestamp() < 4_102_444_800);
    }

    #[test]
    fn test_micros_conversion_is_exact() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 45).unwrap()
            + Duration::microseconds(123_456);
        assert_eq!(from_micros(to_micros(ts)), ts);
    }

    #[test]
    fn test_now_has_no_sub_microsecond_part() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn test_retention_cutoff() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap();
        let cutoff = retention_cutoff(now, 7);
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 5, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_retention_cutoff_clamps_huge_window() {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap();
        assert_eq!(retention_cutoff(now, i64::MAX), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(retention_cutoff(now, 1_000_000_000), DateTime::<Utc>::UNIX_EPOCH);
    }
}
