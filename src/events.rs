//! Change events pushed to the UI.
//!
//! One broadcast channel carries every event; the Rust facade and the SSE
//! endpoint subscribe independently. Events emitted with no subscriber are
//! dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Which incident lists changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IncidentScope {
    Open,
    Resolved,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    IncidentsUpdated {
        scope: IncidentScope,
    },
    ServicesConfigUpdated,
    NotificationSnoozed {
        #[schema(value_type = String)]
        until: DateTime<Utc>,
    },
    NotificationUnsnoozed,
    ApiKeyConfigured,
}

impl MonitorEvent {
    /// Dot-namespaced name used as the SSE `event:` field.
    pub fn name(&self) -> &'static str {
        match self {
            MonitorEvent::IncidentsUpdated { .. } => "incidents.updated",
            MonitorEvent::ServicesConfigUpdated => "services.config_updated",
            MonitorEvent::NotificationSnoozed { .. } => "notification.snoozed",
            MonitorEvent::NotificationUnsnoozed => "notification.unsnoozed",
            MonitorEvent::ApiKeyConfigured => "api_key.configured",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MonitorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: MonitorEvent) {
        tracing::debug!(
            event = event.name(),
            subscriber_count = self.tx.receiver_count(),
            "Emitting monitor event"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_each_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(MonitorEvent::IncidentsUpdated {
            scope: IncidentScope::Both,
        });

        assert_eq!(
            first.recv().await.unwrap(),
            MonitorEvent::IncidentsUpdated {
                scope: IncidentScope::Both
            }
        );
        assert_eq!(second.recv().await.unwrap().name(), "incidents.updated");
    }

    #[test]
    fn emit_without_subscribers_is_a_no_op() {
        let bus = EventBus::default();
        bus.emit(MonitorEvent::ApiKeyConfigured);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(MonitorEvent::IncidentsUpdated {
            scope: IncidentScope::Resolved,
        })
        .unwrap();
        assert_eq!(json["type"], "incidents_updated");
        assert_eq!(json["scope"], "resolved");
    }
}
