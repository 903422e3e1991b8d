use time::OffsetDateTime;
use tracing::debug;

/// Request header carrying a millisecond Unix timestamp that overrides the
/// wall clock while test mode is enabled.
pub const TEST_NOW_HEADER: &str = "x-test-now-ms";

/// Resolves the instant used for expiry comparisons.
///
/// With `test_mode_enabled`, a `override_ms` holding an integer number of
/// milliseconds since the Unix epoch is returned as that exact UTC instant.
/// Anything else (test mode off, no override, unparsable or out-of-range
/// override) falls back to the current wall-clock time. This never fails.
#[must_use]
pub fn resolve_now(override_ms: Option<&str>, test_mode_enabled: bool) -> OffsetDateTime {
    if test_mode_enabled {
        if let Some(raw) = override_ms {
            match parse_millis(raw) {
                Some(now) => return now,
                None => debug!(raw, "Ignoring malformed {TEST_NOW_HEADER} override"),
            }
        }
    }
    OffsetDateTime::now_utc()
}

fn parse_millis(raw: &str) -> Option<OffsetDateTime> {
    let millis: i64 = raw.trim().parse().ok()?;
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::*;

    fn assert_close_to_wall_clock(actual: OffsetDateTime) {
        // NOTE: slight tolerance is allowed in case of slow tests
        let drift = (OffsetDateTime::now_utc() - actual).abs();
        assert!(drift < Duration::seconds(5), "drifted by {drift}");
    }

    #[test]
    fn test_override_is_exact_in_test_mode() {
        let now = resolve_now(Some("1000"), true);
        assert_eq!(now, OffsetDateTime::UNIX_EPOCH + Duration::seconds(1));
    }

    #[test]
    fn test_override_keeps_millisecond_precision() {
        let now = resolve_now(Some("1700000000123"), true);
        assert_eq!(now.unix_timestamp(), 1_700_000_000);
        assert_eq!(now.millisecond(), 123);
    }

    #[test]
    fn test_override_tolerates_surrounding_whitespace() {
        let now = resolve_now(Some(" 2000 "), true);
        assert_eq!(now, OffsetDateTime::UNIX_EPOCH + Duration::seconds(2));
    }

    #[test]
    fn test_negative_override_is_before_epoch() {
        let now = resolve_now(Some("-1500"), true);
        assert_eq!(now, OffsetDateTime::UNIX_EPOCH - Duration::milliseconds(1500));
    }

    #[test]
    fn test_malformed_override_falls_back_to_wall_clock() {
        let now = resolve_now(Some("not-a-number"), true);
        assert_ne!(now, OffsetDateTime::UNIX_EPOCH);
        assert_close_to_wall_clock(now);
    }

    #[test]
    fn test_fractional_override_falls_back_to_wall_clock() {
        assert_close_to_wall_clock(resolve_now(Some("1000.5"), true));
    }

    #[test]
    fn test_empty_override_falls_back_to_wall_clock() {
        assert_close_to_wall_clock(resolve_now(Some(""), true));
    }

    #[test]
    fn test_out_of_range_override_falls_back_to_wall_clock() {
        assert_close_to_wall_clock(resolve_now(Some(&i64::MAX.to_string()), true));
    }

    #[test]
    fn test_override_ignored_outside_test_mode() {
        assert_close_to_wall_clock(resolve_now(Some("1000"), false));
    }

    #[test]
    fn test_missing_override_uses_wall_clock() {
        assert_close_to_wall_clock(resolve_now(None, true));
        assert_close_to_wall_clock(resolve_now(None, false));
    }
}
