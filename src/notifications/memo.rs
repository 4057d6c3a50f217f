//! Per-incident redirect memo.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// Remembers when each incident last caused a browser redirect.
#[derive(Debug, Default)]
pub struct ProcessedIncidentMemo {
    entries: HashMap<String, Instant>,
}

impl ProcessedIncidentMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when `incident_id` was redirected less than `cooldown` before `now`.
    pub fn in_cooldown(&self, incident_id: &str, now: Instant, cooldown: Duration) -> bool {
        self.entries
            .get(incident_id)
            .is_some_and(|at| now.saturating_duration_since(*at) < cooldown)
    }

    pub fn record(&mut self, incident_id: &str, now: Instant) {
        self.entries.insert(incident_id.to_string(), now);
    }

    /// Drop entries older than `horizon`. Returns the number removed.
    pub fn purge_older_than(&mut self, now: Instant, horizon: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, at| now.saturating_duration_since(*at) <= horizon);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cooldown_expires() {
        let mut memo = ProcessedIncidentMemo::new();
        let start = Instant::now();
        let cooldown = Duration::from_secs(300);
        memo.record("P1", start);

        assert!(memo.in_cooldown("P1", start + Duration::from_secs(299), cooldown));
        assert!(!memo.in_cooldown("P1", start + Duration::from_secs(300), cooldown));
        assert!(!memo.in_cooldown("P2", start, cooldown));
    }

    #[test]
    fn purge_drops_entries_past_horizon() {
        let mut memo = ProcessedIncidentMemo::new();
        let start = Instant::now();
        memo.record("OLD", start);
        memo.record("NEW", start + Duration::from_secs(1500));

        let removed = memo.purge_older_than(start + Duration::from_secs(1801), Duration::from_secs(1800));
        assert_eq!(removed, 1);
        assert_eq!(memo.len(), 1);
        assert!(memo.in_cooldown("NEW", start + Duration::from_secs(1801), Duration::from_secs(600)));
    }
}
