use crate::http::retry_after_wait;
use chrono::Utc;
use reqwest::header::HeaderMap;
use std::time::Duration;

pub const MAX_BACKOFF: Duration = Duration::from_secs(120);
pub const LOCKED_COOLDOWN: Duration = Duration::from_secs(1);

/// Wait before retrying a throttled attempt.
///
/// Server guidance wins; a locked cadence takes a single cooldown tick;
/// otherwise `base * 2^attempt`, capped at [`MAX_BACKOFF`].
pub fn compute_wait(
    headers: &HeaderMap,
    attempt: u32,
    locked: bool,
    base_backoff: Duration,
) -> Duration {
    if let Some(wait) = retry_after_wait(headers, Utc::now(), base_backoff) {
        return wait;
    }
    if locked {
        return LOCKED_COOLDOWN;
    }
    exponential(base_backoff, attempt)
}

fn exponential(base: Duration, attempt: u32) -> Duration {
    1u32.checked_shl(attempt)
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_BACKOFF, |d| d.min(MAX_BACKOFF))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(1);

    fn retry_after(v: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("retry-after", v.parse().unwrap());
        h
    }

    #[test]
    fn retry_after_wins_everywhere() {
        for attempt in 0..6 {
            for locked in [false, true] {
                assert_eq!(
                    compute_wait(&retry_after("3"), attempt, locked, BASE),
                    Duration::from_secs(3)
                );
            }
        }
    }

    #[test]
    fn zero_retry_after_uses_base() {
        assert_eq!(compute_wait(&retry_after("0"), 4, true, BASE), BASE);
    }

    #[test]
    fn locked_waits_one_second() {
        assert_eq!(compute_wait(&HeaderMap::new(), 4, true, BASE), LOCKED_COOLDOWN);
    }

    #[test]
    fn exponential_when_unlocked() {
        let h = HeaderMap::new();
        assert_eq!(compute_wait(&h, 0, false, BASE), Duration::from_secs(1));
        assert_eq!(compute_wait(&h, 3, false, BASE), Duration::from_secs(8));
        assert_eq!(compute_wait(&h, 6, false, BASE), Duration::from_secs(64));
        assert_eq!(compute_wait(&h, 7, false, BASE), MAX_BACKOFF);
    }

    #[test]
    fn exponential_never_overflows() {
        let h = HeaderMap::new();
        assert_eq!(compute_wait(&h, 31, false, BASE), MAX_BACKOFF);
        assert_eq!(compute_wait(&h, 64, false, BASE), MAX_BACKOFF);
        assert_eq!(
            compute_wait(&h, 20, false, Duration::from_secs(u64::MAX / 2)),
            MAX_BACKOFF
        );
    }

    #[test]
    fn unparsable_retry_after_falls_through() {
        assert_eq!(compute_wait(&retry_after("later"), 2, false, BASE), Duration::from_secs(4));
        assert_eq!(compute_wait(&retry_after("later"), 2, true, BASE), LOCKED_COOLDOWN);
    }
}
