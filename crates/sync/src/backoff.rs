use std::time::Duration;
use time::UtcDateTime;

/// Largest exponent: delays stop growing at 64 seconds.
const MAX_EXPONENT: i64 = 6;

fn exponent(attempt_count: i64) -> i64 {
    attempt_count.saturating_add(1).clamp(1, MAX_EXPONENT)
}

/// Delay before retrying an event that has already failed `attempt_count` times.
///
/// `2^(attempt_count + 1)` seconds, between 2 and 64.
pub fn backoff_delay(attempt_count: i64) -> Duration {
    Duration::from_secs(1 << exponent(attempt_count))
}

/// When an event that has failed `attempt_count` times is next due.
pub fn next_attempt_at(attempt_count: i64, now: UtcDateTime) -> UtcDateTime {
    now + time::Duration::seconds(1 << exponent(attempt_count))
}
