//! # Sync Scheduler
//!
//! Drives the fetch-and-reconcile cycle: pulls open and recently resolved
//! incidents from the remote source, writes them to the cache, flips open
//! rows that disappeared to resolved, notifies on new triggers and tells the UI
//! the lists changed. Cycles never overlap.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::SchedulerConfig;
use crate::error::RepositoryError;
use crate::events::{EventBus, IncidentScope, MonitorEvent};
use crate::models::{Incident, IncidentStatus};
use crate::notifications::NotificationDispatcher;
use crate::remote::{FetchOptions, IncidentSource, SyncError, SyncErrorKind, dedupe_by_id};
use crate::repositories::CacheStore;
use crate::telemetry::{
    OPEN_INCIDENTS, SYNC_CYCLE_DURATION_MS, SYNC_CYCLES_TOTAL, SYNC_FAILURES_TOTAL,
};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("remote sync failed: {0}")]
    Sync(#[from] SyncError),
    #[error("incident cache failed: {0}")]
    Cache(#[from] RepositoryError),
}

/// Which incidents the user asked to watch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterState {
    pub selected_services: Vec<String>,
    pub filter_by_user: bool,
}

/// Summary of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub open_fetched: usize,
    pub resolved_fetched: usize,
    pub stale_resolved: usize,
    pub newly_triggered: usize,
    pub cache_write_failed: bool,
}

enum SchedulerState {
    Stopped,
    Running {
        shutdown: CancellationToken,
        handle: JoinHandle<()>,
    },
}

pub struct SyncScheduler {
    source: Arc<dyn IncidentSource>,
    cache: CacheStore,
    dispatcher: Arc<NotificationDispatcher>,
    events: EventBus,
    config: SchedulerConfig,
    filters: RwLock<FilterState>,
    cycle_lock: Mutex<()>,
    state: Mutex<SchedulerState>,
}

fn failure_kind(err: &SchedulerError) -> &'static str {
    match err {
        SchedulerError::Sync(sync) => match sync.kind {
            SyncErrorKind::Unauthorized => "unauthorized",
            SyncErrorKind::RateLimited { .. } => "rate_limited",
            SyncErrorKind::Transient => "transient",
            SyncErrorKind::Permanent => "permanent",
        },
        SchedulerError::Cache(_) => "cache",
    }
}

impl SyncScheduler {
    pub fn new(
        source: Arc<dyn IncidentSource>,
        cache: CacheStore,
        dispatcher: Arc<NotificationDispatcher>,
        events: EventBus,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            cache,
            dispatcher,
            events,
            config,
            filters: RwLock::new(FilterState::default()),
            cycle_lock: Mutex::new(()),
            state: Mutex::new(SchedulerState::Stopped),
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, SchedulerState::Running { .. })
    }

    /// Run one cycle immediately, then poll on the configured interval.
    /// No-op when already running.
    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if matches!(*state, SchedulerState::Running { .. }) {
            debug!("Sync scheduler already running");
            return;
        }

        info!(
            poll_interval_secs = self.config.poll_interval_seconds,
            "Starting sync scheduler"
        );
        if let Err(err) = self.run_cycle().await {
            warn!(error = %err, "Initial reconciliation cycle failed");
        }

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(self.clone().run_loop(shutdown.clone()));
        *state = SchedulerState::Running { shutdown, handle };
    }

    /// Stop polling and wait for the loop to exit. A cycle in flight completes
    /// first. No-op when already stopped.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let SchedulerState::Running { shutdown, handle } =
            std::mem::replace(&mut *state, SchedulerState::Stopped)
        else {
            debug!("Sync scheduler already stopped");
            return;
        };

        shutdown.cancel();
        if let Err(err) = handle.await {
            error!(error = %err, "Sync scheduler task ended abnormally");
        }
        info!("Sync scheduler stopped");
    }

    async fn run_loop(self: Arc<Self>, shutdown: CancellationToken) {
        let tick_interval = self.config.poll_interval();
        let sweep_interval = self.config.sidebar_sweep_interval();
        self.sweep_sidebar().await;
        let mut last_sweep = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick_interval) => {
                    self.tick().await;
                    if last_sweep.elapsed() >= sweep_interval {
                        self.sweep_sidebar().await;
                        last_sweep = Instant::now();
                    }
                }
            }
        }
    }

    /// Timer-driven cycle. Skipped while another cycle holds the lock.
    async fn tick(&self) {
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            debug!("Previous reconciliation cycle still running, skipping tick");
            return;
        };
        if let Err(err) = self.reconcile().await {
            warn!(error = %err, "Reconciliation cycle failed");
        }
    }

    /// Run one reconciliation cycle, waiting for any cycle in flight.
    pub async fn run_cycle(&self) -> Result<CycleReport, SchedulerError> {
        let _cycle = self.cycle_lock.lock().await;
        self.reconcile().await
    }

    #[instrument(skip_all)]
    async fn reconcile(&self) -> Result<CycleReport, SchedulerError> {
        let started = Instant::now();
        let result = self.reconcile_inner().await;
        histogram!(SYNC_CYCLE_DURATION_MS).record(started.elapsed().as_secs_f64() * 1_000.0);

        match &result {
            Ok(report) => {
                counter!(SYNC_CYCLES_TOTAL).increment(1);
                gauge!(OPEN_INCIDENTS).set(report.open_fetched as f64);
                debug!(
                    open = report.open_fetched,
                    resolved = report.resolved_fetched,
                    stale = report.stale_resolved,
                    triggered = report.newly_triggered,
                    "Reconciliation cycle completed"
                );
            }
            Err(err) => {
                counter!(SYNC_FAILURES_TOTAL, "kind" => failure_kind(err)).increment(1);
            }
        }
        result
    }

    async fn reconcile_inner(&self) -> Result<CycleReport, SchedulerError> {
        let filters = self.filters.read().await.clone();

        let user_id = if filters.filter_by_user {
            match self.source.current_user_id().await {
                Ok(id) => Some(id),
                Err(err) => {
                    error!(error = %err, "Failed to resolve current user, skipping cycle");
                    return Err(err.into());
                }
            }
        } else {
            None
        };

        let open = self
            .source
            .fetch_open_incidents(&filters.selected_services, user_id.as_deref())
            .await?;
        let resolved = self
            .fetch_recently_resolved(&filters.selected_services, user_id.as_deref())
            .await?;

        let mut report = CycleReport {
            open_fetched: open.len(),
            resolved_fetched: resolved.len(),
            ..CycleReport::default()
        };

        let open_ids: Vec<String> = open.iter().map(|i| i.incident_id.clone()).collect();
        let previous = match self.cache.incidents.get_statuses(&open_ids).await {
            Ok(statuses) => Some(statuses),
            Err(err) => {
                warn!(error = %err, "Failed to read cached statuses, notifications skipped this cycle");
                None
            }
        };
        let triggered = previous
            .as_ref()
            .map(|statuses| newly_triggered(&open, statuses))
            .unwrap_or_default();

        if let Err(err) = self.cache.incidents.batch_upsert_incidents(open).await {
            error!(error = %err, "Failed to cache open incidents");
            report.cache_write_failed = true;
        } else {
            match self
                .cache
                .incidents
                .remove_stale_open_incidents(&open_ids, &filters.selected_services)
                .await
            {
                Ok(flipped) => report.stale_resolved = flipped.len(),
                Err(err) => {
                    error!(error = %err, "Failed to sweep stale open incidents");
                    report.cache_write_failed = true;
                }
            }
        }

        if !resolved.is_empty()
            && let Err(err) = self.cache.incidents.batch_upsert_incidents(resolved).await
        {
            error!(error = %err, "Failed to cache recently resolved incidents");
            report.cache_write_failed = true;
        }

        report.newly_triggered = triggered.len();
        for incident in &triggered {
            self.dispatcher.notify_incident(incident).await;
        }

        self.events.emit(MonitorEvent::IncidentsUpdated {
            scope: IncidentScope::Both,
        });

        Ok(report)
    }

    /// Incidents resolved within the recent window, matching the open fetch:
    /// selected services and the user's incidents are separate queries whose
    /// results are merged, since the remote ANDs both filters in one query.
    async fn fetch_recently_resolved(
        &self,
        service_ids: &[String],
        user_id: Option<&str>,
    ) -> Result<Vec<Incident>, SyncError> {
        let now = Utc::now();
        let window = FetchOptions {
            statuses: vec![IncidentStatus::Resolved],
            since: Some(now - self.config.recently_resolved_window()),
            until: Some(now),
            ..FetchOptions::default()
        };
        let user_id = user_id.filter(|id| !id.is_empty());

        match user_id {
            Some(user_id) if !service_ids.is_empty() => {
                let (mut incidents, assigned) = tokio::try_join!(
                    self.source
                        .fetch_incidents_with_options(window.clone().with_services(service_ids)),
                    self.source
                        .fetch_incidents_with_options(window.with_user(user_id)),
                )?;
                incidents.extend(assigned);
                Ok(dedupe_by_id(incidents))
            }
            Some(user_id) => {
                self.source
                    .fetch_incidents_with_options(window.with_user(user_id))
                    .await
            }
            None => {
                self.source
                    .fetch_incidents_with_options(window.with_services(service_ids))
                    .await
            }
        }
    }

    async fn sweep_sidebar(&self) {
        let cutoff = (Utc::now() - self.config.sidebar_retention()).fixed_offset();
        match self.cache.sidebar.purge_stale_sidebar_data(cutoff).await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "Purged stale sidebar data"),
            Err(err) => warn!(error = %err, "Sidebar retention sweep failed"),
        }
    }

    /// Open incidents for the current filters. Reads the cache directly while
    /// polling; otherwise reconciles first.
    pub async fn open_incidents(&self) -> Result<Vec<Incident>, SchedulerError> {
        if self.is_running().await {
            let _cycle = self.cycle_lock.lock().await;
        } else {
            self.run_cycle().await?;
        }

        let filters = self.filters.read().await.clone();
        let incidents = if filters.selected_services.is_empty() || filters.filter_by_user {
            self.cache.incidents.get_open_incidents().await?
        } else {
            self.cache
                .incidents
                .get_open_incidents_by_services(&filters.selected_services)
                .await?
        };
        Ok(incidents)
    }

    /// Resolved incidents for the current filters. While stopped the resolved
    /// window is fetched and cached first.
    pub async fn resolved_incidents(&self) -> Result<Vec<Incident>, SchedulerError> {
        let filters = self.filters.read().await.clone();

        if self.is_running().await {
            let _cycle = self.cycle_lock.lock().await;
        } else {
            let _cycle = self.cycle_lock.lock().await;
            let resolved = self
                .source
                .fetch_resolved_incidents(&filters.selected_services)
                .await?;
            if let Err(err) = self.cache.incidents.batch_upsert_incidents(resolved).await {
                error!(error = %err, "Failed to cache resolved incidents");
            }
            self.events.emit(MonitorEvent::IncidentsUpdated {
                scope: IncidentScope::Resolved,
            });
        }

        let incidents = if filters.selected_services.is_empty() {
            self.cache.incidents.get_resolved_incidents().await?
        } else {
            self.cache
                .incidents
                .get_resolved_incidents_by_services(&filters.selected_services)
                .await?
        };
        Ok(incidents)
    }

    pub async fn filters(&self) -> FilterState {
        self.filters.read().await.clone()
    }

    pub async fn set_selected_services(&self, service_ids: Vec<String>) {
        let mut services: Vec<String> = service_ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        services.sort();
        services.dedup();

        self.filters.write().await.selected_services = services;
        self.events.emit(MonitorEvent::ServicesConfigUpdated);
    }

    pub async fn set_filter_by_user(&self, enabled: bool) {
        self.filters.write().await.filter_by_user = enabled;
        self.events.emit(MonitorEvent::ServicesConfigUpdated);
    }
}

/// Incidents that are triggered now but were not triggered in the cache.
fn newly_triggered(
    fetched: &[Incident],
    previous: &HashMap<String, IncidentStatus>,
) -> Vec<Incident> {
    fetched
        .iter()
        .filter(|incident| incident.status == IncidentStatus::Triggered)
        .filter(|incident| {
            previous.get(&incident.incident_id) != Some(&IncidentStatus::Triggered)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Urgency;

    fn incident(id: &str, status: IncidentStatus) -> Incident {
        let now = Utc::now().fixed_offset();
        Incident {
            incident_id: id.to_string(),
            incident_number: 1,
            title: "Queue backlog".to_string(),
            service_id: "S1".to_string(),
            service_summary: "Workers".to_string(),
            status,
            html_url: String::new(),
            urgency: Urgency::High,
            alert_count: 1,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn only_transitions_into_triggered_count() {
        let fetched = vec![
            incident("NEW", IncidentStatus::Triggered),
            incident("STILL", IncidentStatus::Triggered),
            incident("REOPENED", IncidentStatus::Triggered),
            incident("ACKED", IncidentStatus::Acknowledged),
        ];
        let previous = HashMap::from([
            ("STILL".to_string(), IncidentStatus::Triggered),
            ("REOPENED".to_string(), IncidentStatus::Acknowledged),
            ("ACKED".to_string(), IncidentStatus::Triggered),
        ]);

        let ids: Vec<String> = newly_triggered(&fetched, &previous)
            .into_iter()
            .map(|i| i.incident_id)
            .collect();
        assert_eq!(ids, vec!["NEW".to_string(), "REOPENED".to_string()]);
    }

    #[test]
    fn failure_kinds_label_sync_errors() {
        let err = SchedulerError::Sync(SyncError::unauthorized("no key"));
        assert_eq!(failure_kind(&err), "unauthorized");
        let err = SchedulerError::Cache(RepositoryError::Validation("x".into()));
        assert_eq!(failure_kind(&err), "cache");
    }
}
