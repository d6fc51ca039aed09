//! Shared rate state: what the server declared plus the cadence the client
//! discovered for itself.

use crate::http::{extract_declared_limits, DeclaredLimits};
use crate::types::RateSnapshot;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::header::HeaderMap;
use std::time::Duration;
use tokio::time::Instant;

/// Locally discovered request cadence, in requests per second.
///
/// `Discovering` may move to `Locked`; nothing ever moves back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// No safe rate found yet. `probing` is false while declared headers are
    /// in charge, in which case `rate` is left alone.
    Discovering { rate: u32, probing: bool },
    /// The rate one below the first throttled probe. Terminal.
    Locked { rate: u32 },
}

impl Cadence {
    /// Requests per second currently in force.
    pub fn dynamic_rate(&self) -> u32 {
        match *self {
            Cadence::Discovering { rate, .. } | Cadence::Locked { rate } => rate,
        }
    }

    /// Locked safe rate, or 0 while still discovering.
    pub fn safe_rate(&self) -> u32 {
        match *self {
            Cadence::Locked { rate } => rate,
            Cadence::Discovering { .. } => 0,
        }
    }

    /// Whether a 429 has fixed the cadence for good.
    pub fn is_locked(&self) -> bool {
        matches!(self, Cadence::Locked { .. })
    }

    /// Whether the rate is still being raised after header-less successes.
    pub fn is_probing(&self) -> bool {
        matches!(self, Cadence::Discovering { probing: true, .. })
    }

    /// Minimum spacing between dispatches, or `None` when the declared
    /// window governs instead of the local cadence.
    pub fn min_interval(&self) -> Option<Duration> {
        let rate = match *self {
            Cadence::Locked { rate } => rate,
            Cadence::Discovering { rate, probing: true } => rate,
            Cadence::Discovering { probing: false, .. } => return None,
        };
        Some(Duration::from_secs(1) / rate.max(1))
    }
}

#[derive(Debug)]
pub struct RateState {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: Option<DateTime<Utc>>,
    pub cadence: Cadence,
    pub last_request_at: Option<Instant>,
}

impl Default for RateState {
    fn default() -> Self {
        Self {
            limit: 0,
            remaining: 0,
            reset_at: None,
            cadence: Cadence::Discovering {
                rate: 1,
                probing: false,
            },
            last_request_at: None,
        }
    }
}

impl RateState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest the rate-limit headers of one response.
    pub fn observe(&mut self, headers: &HeaderMap) {
        let declared = extract_declared_limits(headers);
        self.apply_declared(&declared);
    }

    pub fn apply_declared(&mut self, declared: &DeclaredLimits) {
        if let Some(limit) = declared.limit {
            self.limit = limit;
        }
        if let Some(remaining) = declared.remaining {
            self.remaining = remaining;
        }
        if let Some(reset_at) = declared.reset_at {
            self.reset_at = Some(reset_at);
        }

        if let Cadence::Discovering { probing, .. } = &mut self.cadence {
            // Any declared value hands control to the server; silence hands it back.
            *probing = declared.is_empty();
        }
    }

    /// Move the cadence after a response: ramp up on success, lock on 429.
    pub fn adjust(&mut self, hit_429: bool) {
        let rate = match self.cadence {
            Cadence::Locked { .. } => return,
            Cadence::Discovering { probing: false, .. } => return,
            Cadence::Discovering { rate, probing: true } => rate,
        };

        if hit_429 {
            let safe = rate.saturating_sub(1).max(1);
            info!("safe request rate locked at {} req/s", safe);
            self.cadence = Cadence::Locked { rate: safe };
        } else {
            let next = rate.saturating_add(1);
            debug!("raising discovery rate to {} req/s", next);
            self.cadence = Cadence::Discovering {
                rate: next,
                probing: true,
            };
        }
    }

    /// Reserve the next dispatch slot at or after `now` and return it.
    ///
    /// Returns `None` without claiming anything when the slot would fall
    /// after `deadline`.
    pub fn reserve_slot(&mut self, now: Instant, deadline: Option<Instant>) -> Option<Instant> {
        let slot = match (self.cadence.min_interval(), self.last_request_at) {
            (Some(interval), Some(last)) => (last + interval).max(now),
            _ => now,
        };
        if deadline.is_some_and(|deadline| slot > deadline) {
            return None;
        }
        self.last_request_at = Some(slot);
        Some(slot)
    }

    /// How long a caller must hold off because the declared quota is spent.
    pub fn reset_window_wait(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.limit <= 0 || self.remaining > 0 {
            return None;
        }
        let reset_at = self.reset_at?;
        if now >= reset_at {
            return None;
        }
        let until = (reset_at - now).to_std().unwrap_or_default();
        Some(until.max(Duration::from_secs(1)))
    }

    pub fn snapshot(&self) -> RateSnapshot {
        RateSnapshot {
            limit: self.limit,
            remaining: self.remaining,
            reset_at: self.reset_at.map(|t| t.to_rfc3339()),
            discovering: self.cadence.is_probing(),
            dynamic_rate: self.cadence.dynamic_rate(),
            safe_rate: self.cadence.safe_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("x-ratelimit-limit", "10".parse().unwrap());
        h.insert("x-ratelimit-remaining", "0".parse().unwrap());
        h.insert("x-ratelimit-reset", "4102444800".parse().unwrap());
        h
    }

    #[test]
    fn starts_discovering_at_one_without_probing() {
        let s = RateState::new();
        assert_eq!(s.cadence, Cadence::Discovering { rate: 1, probing: false });
        assert_eq!(s.cadence.safe_rate(), 0);
        assert_eq!(s.cadence.min_interval(), None);
    }

    #[test]
    fn header_less_successes_ramp_by_one() {
        let mut s = RateState::new();
        for expected in 2..=10u32 {
            s.observe(&HeaderMap::new());
            s.adjust(false);
            assert_eq!(s.cadence.dynamic_rate(), expected);
            assert!(s.cadence.is_probing());
        }
    }

    #[test]
    fn first_throttle_locks_one_below() {
        let mut s = RateState::new();
        for _ in 0..4 {
            s.observe(&HeaderMap::new());
            s.adjust(false);
        }
        assert_eq!(s.cadence.dynamic_rate(), 5);
        s.observe(&HeaderMap::new());
        s.adjust(true);
        assert_eq!(s.cadence, Cadence::Locked { rate: 4 });
        assert_eq!(s.cadence.safe_rate(), 4);
    }

    #[test]
    fn lock_floor_is_one() {
        let mut s = RateState::new();
        s.observe(&HeaderMap::new());
        s.adjust(true);
        assert_eq!(s.cadence, Cadence::Locked { rate: 1 });
    }

    #[test]
    fn locked_never_reverts() {
        let mut s = RateState::new();
        s.observe(&HeaderMap::new());
        s.adjust(false);
        s.adjust(true);
        let locked = s.cadence;
        assert!(locked.is_locked());

        for hit in [false, true, false, true] {
            s.observe(&HeaderMap::new());
            s.adjust(hit);
            s.observe(&declared_headers());
            s.adjust(hit);
            assert_eq!(s.cadence, locked);
        }
    }

    #[test]
    fn declared_headers_suspend_probing_and_rate() {
        let mut s = RateState::new();
        s.observe(&HeaderMap::new());
        s.adjust(false);
        assert_eq!(s.cadence.dynamic_rate(), 2);

        s.observe(&declared_headers());
        assert_eq!(s.limit, 10);
        assert_eq!(s.remaining, 0);
        assert!(s.reset_at.is_some());
        assert!(!s.cadence.is_probing());
        assert_eq!(s.cadence.min_interval(), None);

        // 429 while the server governs does not lock anything.
        s.adjust(true);
        assert_eq!(s.cadence, Cadence::Discovering { rate: 2, probing: false });

        // Header-less response resumes probing where it left off.
        s.observe(&HeaderMap::new());
        s.adjust(false);
        assert_eq!(s.cadence, Cadence::Discovering { rate: 3, probing: true });
    }

    #[test]
    fn one_valid_header_is_enough_to_suspend_probing() {
        let mut s = RateState::new();
        s.observe(&HeaderMap::new());
        let mut h = HeaderMap::new();
        h.insert("x-ratelimit-limit", "abc".parse().unwrap());
        h.insert("x-ratelimit-remaining", "3".parse().unwrap());
        s.observe(&h);
        assert_eq!(s.limit, 0);
        assert_eq!(s.remaining, 3);
        assert!(!s.cadence.is_probing());
    }

    #[test]
    fn only_malformed_headers_count_as_silence() {
        let mut s = RateState::new();
        let mut h = HeaderMap::new();
        h.insert("x-ratelimit-limit", "lots".parse().unwrap());
        s.observe(&h);
        assert!(s.cadence.is_probing());
    }

    #[test]
    fn reserve_slot_spaces_by_interval() {
        let mut s = RateState::new();
        s.cadence = Cadence::Locked { rate: 4 };
        let now = Instant::now();
        let first = s.reserve_slot(now, None).unwrap();
        let second = s.reserve_slot(now, None).unwrap();
        let third = s.reserve_slot(now, None).unwrap();
        assert_eq!(first, now);
        assert_eq!(second - first, Duration::from_millis(250));
        assert_eq!(third - second, Duration::from_millis(250));
    }

    #[test]
    fn reserve_slot_records_without_spacing_when_declared() {
        let mut s = RateState::new();
        let now = Instant::now();
        assert_eq!(s.reserve_slot(now, None), Some(now));
        assert_eq!(s.reserve_slot(now, None), Some(now));
        assert_eq!(s.last_request_at, Some(now));
    }

    #[test]
    fn reserve_slot_past_deadline_claims_nothing() {
        let mut s = RateState::new();
        s.cadence = Cadence::Locked { rate: 1 };
        let now = Instant::now();
        assert_eq!(s.reserve_slot(now, None), Some(now));

        let deadline = now + Duration::from_millis(100);
        assert_eq!(s.reserve_slot(now, Some(deadline)), None);
        assert_eq!(s.reserve_slot(now, Some(deadline)), None);
        assert_eq!(s.last_request_at, Some(now));

        let fits = now + Duration::from_secs(1);
        assert_eq!(s.reserve_slot(now, Some(fits)), Some(fits));
        assert_eq!(s.last_request_at, Some(fits));
    }

    #[test]
    fn reset_window_wait_rules() {
        let now = Utc::now();
        let mut s = RateState::new();
        s.reset_at = Some(now + chrono::Duration::seconds(30));
        s.remaining = 0;

        // limit unknown
        assert_eq!(s.reset_window_wait(now), None);

        s.limit = 10;
        let wait = s.reset_window_wait(now).unwrap();
        assert_eq!(wait, Duration::from_secs(30));

        s.remaining = 1;
        assert_eq!(s.reset_window_wait(now), None);

        s.remaining = 0;
        s.reset_at = Some(now + chrono::Duration::milliseconds(200));
        assert_eq!(s.reset_window_wait(now), Some(Duration::from_secs(1)));

        s.reset_at = Some(now - chrono::Duration::seconds(1));
        assert_eq!(s.reset_window_wait(now), None);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut s = RateState::new();
        s.observe(&declared_headers());
        let snap = s.snapshot();
        assert_eq!(snap.limit, 10);
        assert_eq!(snap.remaining, 0);
        assert_eq!(snap.reset_at.as_deref(), Some("2100-01-01T00:00:00+00:00"));
        assert!(!snap.discovering);
        assert_eq!(snap.dynamic_rate, 1);
        assert_eq!(snap.safe_rate, 0);
    }
}
