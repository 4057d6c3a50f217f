use std::sync::Arc;

use incident_monitor::config::AppConfig;
use incident_monitor::error::RepositoryError;
use incident_monitor::models::IncidentStatus;
use incident_monitor::monitor::{IncidentMonitor, MonitorError};
use incident_monitor::remote::SyncError;
use incident_monitor::repositories::CacheStore;
use incident_monitor::secrets::InMemorySecretStore;
use incident_monitor::sidebar::SidebarError;

mod test_utils;
use test_utils::{FakeIncidentSource, RecordingAlertSink, alert, incident, note, setup_test_db};

async fn monitor_with_incident() -> (IncidentMonitor, Arc<FakeIncidentSource>) {
    let db = setup_test_db().await.expect("test db");
    let source = FakeIncidentSource::new();
    source
        .set_open(Ok(vec![incident("INC1", IncidentStatus::Triggered, "S1", 5)]))
        .await;
    source.set_alerts(Ok(vec![alert("AL1")])).await;
    source.set_notes(Ok(vec![note("N1")])).await;

    let (monitor, _queues) = IncidentMonitor::new(
        &AppConfig::default(),
        CacheStore::new(db),
        source.clone(),
        RecordingAlertSink::new(),
        Arc::new(InMemorySecretStore::new()),
    );
    monitor.refresh().await.expect("initial cycle");
    (monitor, source)
}

#[tokio::test]
async fn sidebar_is_fetched_once_until_incident_changes() {
    let (monitor, source) = monitor_with_incident().await;

    let first = monitor.sidebar_data("INC1").await.unwrap();
    assert_eq!(first.alerts.len(), 1);
    assert_eq!(first.notes.len(), 1);
    assert!(!first.stale);

    let second = monitor.sidebar_data("INC1").await.unwrap();
    assert_eq!(second.alerts, first.alerts);
    assert_eq!(FakeIncidentSource::count(&source.alert_calls), 1);
    assert_eq!(FakeIncidentSource::count(&source.note_calls), 1);

    let mut changed = incident("INC1", IncidentStatus::Triggered, "S1", 5);
    changed.alert_count = 2;
    source.set_open(Ok(vec![changed])).await;
    source.set_alerts(Ok(vec![alert("AL1"), alert("AL2")])).await;
    monitor.refresh().await.unwrap();

    let third = monitor.sidebar_data("INC1").await.unwrap();
    assert_eq!(third.alerts.len(), 2);
    assert_eq!(FakeIncidentSource::count(&source.alert_calls), 2);
    assert_eq!(third.metadata.unwrap().last_alert_count, 2);
}

#[tokio::test]
async fn failed_refresh_serves_cached_copy_as_stale() {
    let (monitor, source) = monitor_with_incident().await;
    monitor.sidebar_data("INC1").await.unwrap();

    let mut changed = incident("INC1", IncidentStatus::Acknowledged, "S1", 1);
    changed.alert_count = 4;
    source.set_open(Ok(vec![changed])).await;
    source
        .set_alerts(Err(SyncError::transient("upstream 503")))
        .await;
    monitor.refresh().await.unwrap();

    let sidebar = monitor.sidebar_data("INC1").await.unwrap();
    assert!(sidebar.stale);
    assert_eq!(sidebar.alerts.len(), 1);
    assert_eq!(sidebar.alerts[0].alert_id, "AL1");
    assert_eq!(sidebar.notes[0].note_id, "N1");
}

#[tokio::test]
async fn failed_first_fetch_is_an_error() {
    let (monitor, source) = monitor_with_incident().await;
    source
        .set_notes(Err(SyncError::unauthorized("key revoked")))
        .await;

    let err = monitor.sidebar_data("INC1").await.unwrap_err();
    assert!(matches!(
        err,
        MonitorError::Sidebar(SidebarError::Sync(ref sync)) if sync.is_unauthorized()
    ));
}

#[tokio::test]
async fn unknown_incident_is_not_found() {
    let (monitor, source) = monitor_with_incident().await;

    let err = monitor.sidebar_data("PMISSING").await.unwrap_err();
    assert!(matches!(
        err,
        MonitorError::Sidebar(SidebarError::Cache(RepositoryError::NotFound { .. }))
    ));
    assert_eq!(FakeIncidentSource::count(&source.alert_calls), 0);
}

#[tokio::test]
async fn blank_incident_id_is_rejected() {
    let (monitor, _) = monitor_with_incident().await;

    let err = monitor.sidebar_data("  ").await.unwrap_err();
    assert!(matches!(err, MonitorError::Validation(_)));
}
