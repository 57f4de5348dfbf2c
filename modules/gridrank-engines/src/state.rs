//! Per-engine request-budget and block state.
//!
//! One `EngineState` lives inside each engine, behind a mutex that is only
//! held for state math — the sleeps and HTTP calls happen outside it. Every
//! method takes `now` so the graduated-block behavior is testable without
//! clocks.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};

use crate::config::ThrottleConfig;

/// How many successful requests one fingerprint serves before rotating.
pub(crate) const SESSION_ROTATION_REQUESTS: u32 = 20;

/// Error-streak backoff is clamped here.
const MAX_BACKOFF_MS: u64 = 5 * 60 * 1000;

/// Derived engine health, never stored raw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Healthy,
    Throttled,
    Blocked,
    Disabled,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::Healthy => "healthy",
            EngineStatus::Throttled => "throttled",
            EngineStatus::Blocked => "blocked",
            EngineStatus::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
pub(crate) struct EngineState {
    requests_this_hour: u32,
    requests_today: u32,
    hour_bucket_start: DateTime<Utc>,
    day_bucket_date: NaiveDate,
    last_request_at: Option<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
    error_streak: u32,
    /// CAPTCHA events inside the sliding 24 h window.
    captcha_events: VecDeque<DateTime<Utc>>,
    successes_since_rotation: u32,
}

impl EngineState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            requests_this_hour: 0,
            requests_today: 0,
            hour_bucket_start: hour_floor(now),
            day_bucket_date: now.date_naive(),
            last_request_at: None,
            blocked_until: None,
            error_streak: 0,
            captcha_events: VecDeque::new(),
            successes_since_rotation: 0,
        }
    }

    /// Reset the hourly bucket on each elapsed hour and the daily bucket at
    /// the next UTC midnight.
    pub fn refresh_buckets(&mut self, now: DateTime<Utc>) {
        let hour = hour_floor(now);
        if hour > self.hour_bucket_start {
            self.hour_bucket_start = hour;
            self.requests_this_hour = 0;
        }
        let today = now.date_naive();
        if today > self.day_bucket_date {
            self.day_bucket_date = today;
            self.requests_today = 0;
        }
    }

    /// blocked → throttled → healthy, in that read order.
    pub fn status(&mut self, now: DateTime<Utc>, throttle: &ThrottleConfig) -> EngineStatus {
        if let Some(until) = self.blocked_until {
            if now < until {
                return EngineStatus::Blocked;
            }
            // Block elapsed — transition back silently
            self.blocked_until = None;
        }
        self.refresh_buckets(now);
        if self.requests_this_hour >= throttle.max_per_hour
            || self.requests_today >= throttle.max_per_day
        {
            return EngineStatus::Throttled;
        }
        EngineStatus::Healthy
    }

    pub fn requests_today(&mut self, now: DateTime<Utc>) -> u32 {
        self.refresh_buckets(now);
        self.requests_today
    }

    pub fn error_streak(&self) -> u32 {
        self.error_streak
    }

    pub fn last_request_at(&self) -> Option<DateTime<Utc>> {
        self.last_request_at
    }

    pub fn blocked_until(&self) -> Option<DateTime<Utc>> {
        self.blocked_until
    }

    /// Pre-request delay in milliseconds: uniform(min, max) + triangular
    /// jitter, doubled per error-streak step (clamped to five minutes), then
    /// scaled by a random factor in [0.7, 1.3] to defeat periodicity
    /// detection.
    pub fn next_delay_ms(&mut self, now: DateTime<Utc>, throttle: &ThrottleConfig) -> u64 {
        use rand::Rng;

        self.refresh_buckets(now);

        let mut delay = crate::stealth::human_delay_ms(
            throttle.min_delay_ms,
            throttle.max_delay_ms,
            throttle.jitter_ms,
        ) as f64;

        if throttle.backoff_on_error && self.error_streak > 0 {
            let factor = 2u64.saturating_pow(self.error_streak.min(16)) as f64;
            delay = (delay * factor).min(MAX_BACKOFF_MS as f64);
        }

        delay *= rand::rng().random_range(0.7..1.3);
        delay as u64
    }

    /// A request went through: bump both buckets, stamp the time, clear the
    /// error streak. Returns true when the fingerprint is due for rotation.
    pub fn record_success(&mut self, now: DateTime<Utc>) -> bool {
        self.refresh_buckets(now);
        self.requests_this_hour += 1;
        self.requests_today += 1;
        self.last_request_at = Some(now);
        self.error_streak = 0;
        self.successes_since_rotation += 1;
        if self.successes_since_rotation >= SESSION_ROTATION_REQUESTS {
            self.successes_since_rotation = 0;
            true
        } else {
            false
        }
    }

    /// A transient failure: extend the error streak.
    pub fn record_error(&mut self, now: DateTime<Utc>) -> u32 {
        self.refresh_buckets(now);
        self.last_request_at = Some(now);
        self.error_streak += 1;
        self.error_streak
    }

    /// A CAPTCHA (or Google 429) event. Graduated response over the 24 h
    /// window: 1st event blocks 15 minutes, 2nd 2 hours, 3rd+ 24 hours —
    /// never beyond the configured ceiling. Returns the block expiry.
    pub fn record_block(
        &mut self,
        now: DateTime<Utc>,
        throttle: &ThrottleConfig,
    ) -> DateTime<Utc> {
        let window_start = now - Duration::hours(24);
        while let Some(front) = self.captcha_events.front() {
            if *front < window_start {
                self.captcha_events.pop_front();
            } else {
                break;
            }
        }
        self.captcha_events.push_back(now);

        let graduated = match self.captcha_events.len() {
            1 => Duration::minutes(15),
            2 => Duration::hours(2),
            _ => Duration::hours(24),
        };
        let ceiling = Duration::hours(throttle.pause_on_captcha_hours as i64);
        let pause = if graduated > ceiling { ceiling } else { graduated };

        let until = now + pause;
        self.blocked_until = Some(until);
        self.successes_since_rotation = 0;
        until
    }

    pub fn captcha_events_in_window(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - Duration::hours(24);
        self.captcha_events
            .iter()
            .filter(|t| **t >= window_start)
            .count()
    }

    /// Manual clear: forget the block, the streak, and the CAPTCHA window.
    pub fn clear_block(&mut self) {
        self.blocked_until = None;
        self.error_streak = 0;
        self.captcha_events.clear();
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn preload_requests_today(&mut self, n: u32) {
        self.requests_today = n;
    }
}

fn hour_floor(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(now.hour(), 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn throttle() -> ThrottleConfig {
        ThrottleConfig {
            min_delay_ms: 10,
            max_delay_ms: 20,
            max_per_hour: 5,
            max_per_day: 10,
            jitter_ms: 5,
            backoff_on_error: true,
            pause_on_captcha_hours: 24,
        }
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().expect("test timestamp")
    }

    #[test]
    fn fresh_state_is_healthy() {
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        assert_eq!(state.status(now, &throttle()), EngineStatus::Healthy);
    }

    #[test]
    fn hourly_limit_throttles_until_next_hour() {
        let t = throttle();
        let now = at("2026-03-01T10:30:00Z");
        let mut state = EngineState::new(now);
        for _ in 0..5 {
            state.record_success(now);
        }
        assert_eq!(state.status(now, &t), EngineStatus::Throttled);

        let next_hour = at("2026-03-01T11:00:01Z");
        assert_eq!(state.status(next_hour, &t), EngineStatus::Healthy);
    }

    #[test]
    fn daily_limit_resets_at_utc_midnight() {
        let t = throttle();
        let mut now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        for i in 0..10 {
            // Spread across hours so only the daily limit trips
            now = at("2026-03-01T10:00:00Z") + Duration::minutes(i * 13);
            state.refresh_buckets(now);
            state.record_success(now);
        }
        let later = at("2026-03-01T23:00:00Z");
        let mut s2 = state;
        assert_eq!(s2.status(later, &t), EngineStatus::Throttled);

        let tomorrow = at("2026-03-02T00:00:01Z");
        assert_eq!(s2.status(tomorrow, &t), EngineStatus::Healthy);
        assert_eq!(s2.requests_today(tomorrow), 0);
    }

    #[test]
    fn graduated_block_escalates() {
        let t = throttle();
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);

        // 1st CAPTCHA → 15 minutes
        let until = state.record_block(now, &t);
        assert_eq!(until, now + Duration::minutes(15));
        assert_eq!(state.status(now, &t), EngineStatus::Blocked);

        // 2nd event 30 minutes later → 2 hours
        let second = now + Duration::minutes(30);
        let until = state.record_block(second, &t);
        assert_eq!(until, second + Duration::hours(2));

        // 3rd within 24 h → 24 hours
        let third = now + Duration::hours(3);
        let until = state.record_block(third, &t);
        assert_eq!(until, third + Duration::hours(24));
    }

    #[test]
    fn captcha_window_slides() {
        let t = throttle();
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        state.record_block(now, &t);
        state.record_block(now + Duration::hours(1), &t);

        // 25 hours later both events have aged out — back to 15 minutes
        let later = now + Duration::hours(25);
        let until = state.record_block(later, &t);
        assert_eq!(until, later + Duration::minutes(15));
        assert_eq!(state.captcha_events_in_window(later), 1);
    }

    #[test]
    fn ceiling_caps_graduated_pause() {
        let mut t = throttle();
        t.pause_on_captcha_hours = 1;
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        state.record_block(now, &t);
        let until = state.record_block(now + Duration::minutes(5), &t);
        // graduated says 2 h, ceiling says 1 h
        assert_eq!(until, now + Duration::minutes(5) + Duration::hours(1));
    }

    #[test]
    fn block_expires_silently() {
        let t = throttle();
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        state.record_block(now, &t);
        assert_eq!(state.status(now + Duration::minutes(14), &t), EngineStatus::Blocked);
        assert_eq!(state.status(now + Duration::minutes(16), &t), EngineStatus::Healthy);
        assert_eq!(state.blocked_until(), None);
    }

    #[test]
    fn clear_block_resets_everything() {
        let t = throttle();
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        state.record_error(now);
        state.record_block(now, &t);
        state.clear_block();
        assert_eq!(state.status(now, &t), EngineStatus::Healthy);
        assert_eq!(state.error_streak(), 0);
        assert_eq!(state.captcha_events_in_window(now), 0);
    }

    #[test]
    fn success_resets_error_streak() {
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        state.record_error(now);
        state.record_error(now);
        assert_eq!(state.error_streak(), 2);
        state.record_success(now);
        assert_eq!(state.error_streak(), 0);
    }

    #[test]
    fn rotation_due_after_twenty_successes() {
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        // Limits don't matter here; we only watch the rotation counter
        for i in 1..=19 {
            assert!(!state.record_success(now), "rotated early at {i}");
        }
        assert!(state.record_success(now));
        assert!(!state.record_success(now));
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let t = ThrottleConfig {
            min_delay_ms: 1000,
            max_delay_ms: 1000,
            jitter_ms: 0,
            ..throttle()
        };
        let now = at("2026-03-01T10:00:00Z");
        let mut state = EngineState::new(now);
        for _ in 0..3 {
            state.record_error(now);
        }
        // base 1000 × 2³ = 8000, scaled by [0.7, 1.3]
        for _ in 0..50 {
            let d = state.next_delay_ms(now, &t);
            assert!((5600..=10400).contains(&d), "delay out of band: {d}");
        }

        for _ in 0..20 {
            state.record_error(now);
        }
        // clamped to 5 min before the final scale factor
        for _ in 0..50 {
            let d = state.next_delay_ms(now, &t);
            assert!(d <= 390_000, "unclamped delay: {d}");
        }
    }
}
