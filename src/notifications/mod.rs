//! # Notifications
//!
//! Turns newly triggered incidents into a desktop banner, a queued sound and an
//! optional browser redirect, each behind its own gate.

use std::time::Duration;

use thiserror::Error;

pub mod dispatcher;
pub mod memo;
pub mod rate_limiter;
pub mod settings;
pub mod sink;

pub use dispatcher::{
    NotificationDispatcher, NotificationOutcome, NotificationQueues, NotificationWorkers,
    RedirectOutcome, SoundOutcome,
};
pub use memo::ProcessedIncidentMemo;
pub use rate_limiter::RateLimiter;
pub use settings::{DEFAULT_SOUND, NotificationSettings, SnoozeClock, SystemClock};
pub use sink::{AlertSink, DesktopAlertSink};

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("sound queue is full")]
    QueueFull,
    #[error("sound playback did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("sound worker is not running")]
    WorkerStopped,
    #[error("playback failed: {0}")]
    Playback(String),
    #[error("invalid snooze duration: {0}")]
    InvalidSnooze(String),
}
