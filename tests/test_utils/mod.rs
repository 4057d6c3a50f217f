//! Shared fixtures for the integration tests: an in-memory cache, a scripted
//! incident source and an alert sink that records what it was asked to do.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use incident_monitor::models::{Incident, IncidentStatus, SidebarAlert, SidebarNote, Urgency};
use incident_monitor::notifications::{AlertSink, NotificationError};
use incident_monitor::remote::{FetchOptions, IncidentSource, SyncError};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 10, 12, 0, 0).unwrap()
}

/// Incident fixture whose timestamps sit `minutes_ago` before now.
pub fn incident(id: &str, status: IncidentStatus, service: &str, minutes_ago: i64) -> Incident {
    let at = (Utc::now() - Duration::minutes(minutes_ago)).fixed_offset();
    Incident {
        incident_id: id.to_string(),
        incident_number: 1,
        title: format!("Incident {}", id),
        service_id: service.to_string(),
        service_summary: format!("Service {}", service),
        status,
        html_url: format!("https://example.pagerduty.com/incidents/{}", id),
        urgency: Urgency::High,
        alert_count: 1,
        created_at: at,
        updated_at: at,
    }
}

pub fn alert(id: &str) -> SidebarAlert {
    SidebarAlert {
        alert_id: id.to_string(),
        summary: format!("Alert {}", id),
        status: "triggered".to_string(),
        severity: Some("critical".to_string()),
        created_at: base_time().fixed_offset(),
        body: json!({"details": id}),
    }
}

pub fn note(id: &str) -> SidebarNote {
    SidebarNote {
        note_id: id.to_string(),
        content: format!("Note {}", id),
        author: Some("On-call".to_string()),
        created_at: base_time().fixed_offset(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenFetch {
    pub service_ids: Vec<String>,
    pub user_id: Option<String>,
}

/// Incident source whose answers are scripted by the test.
pub struct FakeIncidentSource {
    open: Mutex<Result<Vec<Incident>, SyncError>>,
    resolved: Mutex<Result<Vec<Incident>, SyncError>>,
    recent: Mutex<Result<Vec<Incident>, SyncError>>,
    recent_assigned: Mutex<Result<Vec<Incident>, SyncError>>,
    alerts: Mutex<Result<Vec<SidebarAlert>, SyncError>>,
    notes: Mutex<Result<Vec<SidebarNote>, SyncError>>,
    user: Mutex<Result<String, SyncError>>,
    open_fetches: Mutex<Vec<OpenFetch>>,
    recent_fetches: Mutex<Vec<FetchOptions>>,
    /// Holding the write half parks open fetches after they are counted.
    pub open_gate: RwLock<()>,
    pub open_calls: AtomicUsize,
    pub resolved_calls: AtomicUsize,
    pub recent_calls: AtomicUsize,
    pub alert_calls: AtomicUsize,
    pub note_calls: AtomicUsize,
    pub user_calls: AtomicUsize,
}

impl Default for FakeIncidentSource {
    fn default() -> Self {
        Self {
            open: Mutex::new(Ok(Vec::new())),
            resolved: Mutex::new(Ok(Vec::new())),
            recent: Mutex::new(Ok(Vec::new())),
            recent_assigned: Mutex::new(Ok(Vec::new())),
            alerts: Mutex::new(Ok(Vec::new())),
            notes: Mutex::new(Ok(Vec::new())),
            user: Mutex::new(Ok("PUSER1".to_string())),
            open_fetches: Mutex::new(Vec::new()),
            recent_fetches: Mutex::new(Vec::new()),
            open_gate: RwLock::new(()),
            open_calls: AtomicUsize::new(0),
            resolved_calls: AtomicUsize::new(0),
            recent_calls: AtomicUsize::new(0),
            alert_calls: AtomicUsize::new(0),
            note_calls: AtomicUsize::new(0),
            user_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeIncidentSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn set_open(&self, result: Result<Vec<Incident>, SyncError>) {
        *self.open.lock().await = result;
    }

    /// Answer for the on-demand resolved fetch.
    pub async fn set_resolved(&self, result: Result<Vec<Incident>, SyncError>) {
        *self.resolved.lock().await = result;
    }

    /// Answer for the per-cycle recently-resolved fetch without a user filter.
    pub async fn set_recent(&self, result: Result<Vec<Incident>, SyncError>) {
        *self.recent.lock().await = result;
    }

    /// Recently resolved incidents assigned to the current user, on any service.
    pub async fn set_recent_assigned(&self, result: Result<Vec<Incident>, SyncError>) {
        *self.recent_assigned.lock().await = result;
    }

    pub async fn set_alerts(&self, result: Result<Vec<SidebarAlert>, SyncError>) {
        *self.alerts.lock().await = result;
    }

    pub async fn set_notes(&self, result: Result<Vec<SidebarNote>, SyncError>) {
        *self.notes.lock().await = result;
    }

    pub async fn set_user(&self, result: Result<String, SyncError>) {
        *self.user.lock().await = result;
    }

    pub async fn open_fetches(&self) -> Vec<OpenFetch> {
        self.open_fetches.lock().await.clone()
    }

    pub async fn recent_fetches(&self) -> Vec<FetchOptions> {
        self.recent_fetches.lock().await.clone()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IncidentSource for FakeIncidentSource {
    async fn current_user_id(&self) -> Result<String, SyncError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        self.user.lock().await.clone()
    }

    async fn fetch_open_incidents(
        &self,
        service_ids: &[String],
        user_id: Option<&str>,
    ) -> Result<Vec<Incident>, SyncError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.open_fetches.lock().await.push(OpenFetch {
            service_ids: service_ids.to_vec(),
            user_id: user_id.map(str::to_string),
        });
        let _gate = self.open_gate.read().await;
        self.open.lock().await.clone()
    }

    async fn fetch_resolved_incidents(
        &self,
        _service_ids: &[String],
    ) -> Result<Vec<Incident>, SyncError> {
        self.resolved_calls.fetch_add(1, Ordering::SeqCst);
        self.resolved.lock().await.clone()
    }

    /// Service and user filters combine with AND, like the remote API.
    async fn fetch_incidents_with_options(
        &self,
        options: FetchOptions,
    ) -> Result<Vec<Incident>, SyncError> {
        self.recent_calls.fetch_add(1, Ordering::SeqCst);
        self.recent_fetches.lock().await.push(options.clone());

        let candidates = if options.user_ids.is_empty() {
            self.recent.lock().await.clone()
        } else {
            self.recent_assigned.lock().await.clone()
        }?;
        Ok(candidates
            .into_iter()
            .filter(|incident| {
                options.service_ids.is_empty() || options.service_ids.contains(&incident.service_id)
            })
            .collect())
    }

    async fn fetch_incident_alerts(
        &self,
        _incident_id: &str,
    ) -> Result<Vec<SidebarAlert>, SyncError> {
        self.alert_calls.fetch_add(1, Ordering::SeqCst);
        self.alerts.lock().await.clone()
    }

    async fn fetch_incident_notes(&self, _incident_id: &str) -> Result<Vec<SidebarNote>, SyncError> {
        self.note_calls.fetch_add(1, Ordering::SeqCst);
        self.notes.lock().await.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Speak(String),
    Sound(String),
    Banner { title: String, body: String },
    Open(String),
}

/// Alert sink that records every request instead of touching the desktop.
#[derive(Default)]
pub struct RecordingAlertSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingAlertSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().await.clone()
    }

    pub async fn banners(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                SinkCall::Banner { title, .. } => Some(title.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn speak(&self, text: &str) -> Result<(), NotificationError> {
        self.calls.lock().await.push(SinkCall::Speak(text.to_string()));
        Ok(())
    }

    async fn play_sound(&self, name: &str) -> Result<(), NotificationError> {
        self.calls.lock().await.push(SinkCall::Sound(name.to_string()));
        Ok(())
    }

    async fn show_banner(&self, title: &str, body: &str) -> Result<(), NotificationError> {
        self.calls.lock().await.push(SinkCall::Banner {
            title: title.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), NotificationError> {
        self.calls.lock().await.push(SinkCall::Open(url.to_string()));
        Ok(())
    }
}
