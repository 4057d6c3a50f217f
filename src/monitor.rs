//! # Incident Monitor
//!
//! The facade the UI talks to: incident queries, user commands and the change
//! event stream, wired over the scheduler, sidebar service and dispatcher.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::info;

use crate::config::AppConfig;
use crate::error::RepositoryError;
use crate::events::{EventBus, MonitorEvent};
use crate::models::Incident;
use crate::notifications::{
    AlertSink, NotificationDispatcher, NotificationError, NotificationQueues, NotificationSettings,
};
use crate::remote::{IncidentSource, SyncError};
use crate::repositories::CacheStore;
use crate::scheduler::{FilterState, SchedulerError, SyncScheduler};
use crate::secrets::{API_KEY_SECRET, SecretStore, SecretStoreError};
use crate::sidebar::{SidebarData, SidebarError, SidebarService};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Cache(#[from] RepositoryError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    Notification(#[from] NotificationError),
    #[error(transparent)]
    Sidebar(#[from] SidebarError),
    #[error("secret store failed: {0}")]
    Secrets(#[from] SecretStoreError),
}

pub struct IncidentMonitor {
    scheduler: Arc<SyncScheduler>,
    sidebar: SidebarService,
    dispatcher: Arc<NotificationDispatcher>,
    secrets: Arc<dyn SecretStore>,
    events: EventBus,
}

impl IncidentMonitor {
    /// Wire every component. The returned queues must be spawned for sounds
    /// and redirects to be delivered.
    pub fn new(
        config: &AppConfig,
        cache: CacheStore,
        source: Arc<dyn IncidentSource>,
        sink: Arc<dyn AlertSink>,
        secrets: Arc<dyn SecretStore>,
    ) -> (Self, NotificationQueues) {
        let events = EventBus::default();
        let (dispatcher, queues) =
            NotificationDispatcher::new(config.notifications.clone(), sink, events.clone());
        let dispatcher = Arc::new(dispatcher);

        let scheduler = Arc::new(SyncScheduler::new(
            source.clone(),
            cache.clone(),
            dispatcher.clone(),
            events.clone(),
            config.scheduler.clone(),
        ));

        let monitor = Self {
            scheduler,
            sidebar: SidebarService::new(source, cache),
            dispatcher,
            secrets,
            events,
        };
        (monitor, queues)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    pub async fn open_incidents(&self) -> Result<Vec<Incident>, MonitorError> {
        Ok(self.scheduler.open_incidents().await?)
    }

    pub async fn resolved_incidents(&self) -> Result<Vec<Incident>, MonitorError> {
        Ok(self.scheduler.resolved_incidents().await?)
    }

    pub async fn sidebar_data(&self, incident_id: &str) -> Result<SidebarData, MonitorError> {
        if incident_id.trim().is_empty() {
            return Err(MonitorError::Validation(
                "incident id must not be empty".to_string(),
            ));
        }
        Ok(self.sidebar.get_sidebar_data(incident_id).await?)
    }

    /// Store a new API key. Empty keys are rejected before anything is written.
    pub async fn configure_credential(&self, api_key: &str) -> Result<(), MonitorError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(MonitorError::Validation(
                "API key must not be empty".to_string(),
            ));
        }

        self.secrets.set(API_KEY_SECRET, api_key).await?;
        info!("API key configured");
        self.events.emit(MonitorEvent::ApiKeyConfigured);
        Ok(())
    }

    pub async fn filters(&self) -> FilterState {
        self.scheduler.filters().await
    }

    pub async fn set_selected_services(&self, service_ids: Vec<String>) {
        self.scheduler.set_selected_services(service_ids).await;
    }

    pub async fn set_filter_by_user(&self, enabled: bool) {
        self.scheduler.set_filter_by_user(enabled).await;
    }

    pub async fn notification_settings(&self) -> NotificationSettings {
        self.dispatcher.settings().await
    }

    pub async fn set_notifications_enabled(&self, enabled: bool) {
        self.dispatcher.set_enabled(enabled).await;
    }

    pub async fn set_notification_sound(&self, sound: &str) -> Result<(), MonitorError> {
        if sound.trim().is_empty() {
            return Err(MonitorError::Validation(
                "sound must not be empty".to_string(),
            ));
        }
        self.dispatcher.set_sound(sound).await;
        Ok(())
    }

    pub async fn set_browser_redirect(&self, enabled: bool) {
        self.dispatcher.set_browser_redirect(enabled).await;
    }

    pub async fn snooze(&self, minutes: u32) -> Result<DateTime<Utc>, MonitorError> {
        Ok(self.dispatcher.snooze_sound(minutes).await?)
    }

    pub async fn unsnooze(&self) {
        self.dispatcher.unsnooze_sound().await;
    }

    pub async fn test_sound(&self) -> Result<(), MonitorError> {
        Ok(self.dispatcher.test_sound().await?)
    }

    pub async fn start_polling(&self) {
        self.scheduler.start().await;
    }

    pub async fn stop_polling(&self) {
        self.scheduler.stop().await;
    }

    pub async fn is_polling(&self) -> bool {
        self.scheduler.is_running().await
    }

    /// Run one reconciliation cycle now, regardless of polling state.
    pub async fn refresh(&self) -> Result<(), MonitorError> {
        self.scheduler.run_cycle().await?;
        Ok(())
    }
}
