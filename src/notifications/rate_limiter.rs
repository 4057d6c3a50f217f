//! Non-blocking admission control for sounds and browser redirects.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct LimiterState {
    burst_count: u32,
    window_start: Instant,
}

/// Fixed-window admission gate: at most `burst_limit` events per `burst_window`.
///
/// Back-to-back events are admitted until the cap is reached. The count resets
/// once `now - window_start` exceeds the window, and the new window starts at
/// the call that observed the expiry.
#[derive(Debug)]
pub struct RateLimiter {
    burst_window: Duration,
    burst_limit: u32,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(burst_window: Duration, burst_limit: u32) -> Self {
        Self {
            burst_window,
            burst_limit,
            state: Mutex::new(LimiterState {
                burst_count: 0,
                window_start: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: RateLimitConfig) -> Self {
        Self::new(config.burst_window(), config.burst_limit)
    }

    pub async fn allow(&self) -> bool {
        self.allow_at(Instant::now()).await
    }

    pub async fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock().await;

        if now.saturating_duration_since(state.window_start) > self.burst_window {
            state.burst_count = 0;
            state.window_start = now;
        }

        if state.burst_count < self.burst_limit {
            state.burst_count += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sound_limiter() -> RateLimiter {
        RateLimiter::new(Duration::from_secs(30), 5)
    }

    #[tokio::test]
    async fn six_undelayed_calls_admit_five() {
        let limiter = sound_limiter();
        let now = Instant::now();

        let mut admitted = 0;
        for _ in 0..6 {
            if limiter.allow_at(now).await {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn spaced_call_is_admitted_mid_window_under_cap() {
        let limiter = sound_limiter();
        let start = Instant::now();
        for _ in 0..3 {
            assert!(limiter.allow_at(start).await);
        }

        assert!(limiter.allow_at(start + Duration::from_secs(2)).await);
        assert!(limiter.allow_at(start + Duration::from_secs(4)).await);
        assert!(!limiter.allow_at(start + Duration::from_secs(6)).await);
    }

    #[tokio::test]
    async fn steady_calls_never_exceed_cap_within_one_window() {
        let limiter = sound_limiter();
        let start = Instant::now();

        let mut admitted = 0;
        let mut offset = Duration::ZERO;
        while offset <= Duration::from_secs(30) {
            if limiter.allow_at(start + offset).await {
                admitted += 1;
            }
            offset += Duration::from_millis(500);
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn window_expiry_resets_burst() {
        let limiter = RateLimiter::new(Duration::from_secs(30), 2);
        let start = Instant::now();
        assert!(limiter.allow_at(start).await);
        assert!(limiter.allow_at(start).await);
        assert!(!limiter.allow_at(start + Duration::from_secs(10)).await);

        let next_window = start + Duration::from_secs(31);
        assert!(limiter.allow_at(next_window).await);
        assert!(limiter.allow_at(next_window).await);
        assert!(!limiter.allow_at(next_window).await);
    }

    #[tokio::test]
    async fn denied_calls_do_not_consume_capacity() {
        let limiter = RateLimiter::new(Duration::from_secs(30), 2);
        let start = Instant::now();
        assert!(limiter.allow_at(start).await);
        assert!(limiter.allow_at(start).await);
        for secs in 1..=30 {
            assert!(!limiter.allow_at(start + Duration::from_secs(secs)).await);
        }
        let next_window = start + Duration::from_secs(31);
        assert!(limiter.allow_at(next_window).await);
        assert!(limiter.allow_at(next_window).await);
    }
}
