//! User notification preferences and the sound snooze.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Sound value that means "speak the service name" instead of playing a file.
pub const DEFAULT_SOUND: &str = "default";

/// Wall-clock source for snooze deadlines.
pub trait SnoozeClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SnoozeClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub sound: String,
    pub snoozed: bool,
    #[schema(value_type = Option<String>, example = "2025-01-01T12:30:00Z")]
    pub snooze_until: Option<DateTime<Utc>>,
    pub browser_redirect: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: DEFAULT_SOUND.to_string(),
            snoozed: false,
            snooze_until: None,
            browser_redirect: false,
        }
    }
}

impl NotificationSettings {
    /// Whether the snooze holds at `now`. An expired deadline clears the snooze
    /// in place, so the answer depends only on `now` and the stored deadline.
    pub fn is_snooze_active_at(&mut self, now: DateTime<Utc>) -> bool {
        match (self.snoozed, self.snooze_until) {
            (true, Some(until)) if until > now => true,
            (false, None) => false,
            _ => {
                self.snoozed = false;
                self.snooze_until = None;
                false
            }
        }
    }

    pub fn snooze_until(&mut self, until: DateTime<Utc>) {
        self.snoozed = true;
        self.snooze_until = Some(until);
    }

    pub fn clear_snooze(&mut self) {
        self.snoozed = false;
        self.snooze_until = None;
    }

    pub fn uses_spoken_sound(&self) -> bool {
        self.sound.is_empty() || self.sound == DEFAULT_SOUND
    }
}
