//! Lazily refreshed incident detail (alerts and notes).
//!
//! The remote is only asked again when the incident's `alert_count` or
//! `updated_at` moved since the last fetch.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

use crate::error::RepositoryError;
use crate::models::{Incident, SidebarAlert, SidebarMetadata, SidebarNote};
use crate::remote::{IncidentSource, SyncError};
use crate::repositories::{CacheStore, SidebarSnapshot};

#[derive(Debug, Error)]
pub enum SidebarError {
    #[error("incident cache failed: {0}")]
    Cache(#[from] RepositoryError),
    #[error("sidebar fetch failed: {0}")]
    Sync(#[from] SyncError),
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SidebarData {
    pub incident_id: String,
    pub alerts: Vec<SidebarAlert>,
    pub notes: Vec<SidebarNote>,
    pub metadata: Option<SidebarMetadata>,
    /// True when a refresh failed and older cached content is served instead
    pub stale: bool,
}

impl SidebarData {
    fn from_snapshot(incident_id: &str, snapshot: SidebarSnapshot, stale: bool) -> Self {
        Self {
            incident_id: incident_id.to_string(),
            alerts: snapshot.alerts,
            notes: snapshot.notes,
            metadata: snapshot.metadata,
            stale,
        }
    }
}

#[derive(Clone)]
pub struct SidebarService {
    source: Arc<dyn IncidentSource>,
    cache: CacheStore,
}

impl SidebarService {
    pub fn new(source: Arc<dyn IncidentSource>, cache: CacheStore) -> Self {
        Self { source, cache }
    }

    pub async fn get_sidebar_data(&self, incident_id: &str) -> Result<SidebarData, SidebarError> {
        let incident = self
            .cache
            .incidents
            .get_incident(incident_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("incident", incident_id))?;

        let cached = self.cache.sidebar.get_sidebar(incident_id).await?;
        if let Some(metadata) = &cached.metadata
            && !metadata.is_stale_for(&incident)
        {
            debug!(incident_id, "Serving cached sidebar");
            return Ok(SidebarData::from_snapshot(incident_id, cached, false));
        }

        match self.refresh(&incident).await {
            Ok(fresh) => Ok(fresh),
            Err(err) if cached.metadata.is_some() => {
                warn!(incident_id, error = %err, "Sidebar refresh failed, serving cached copy");
                Ok(SidebarData::from_snapshot(incident_id, cached, true))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn refresh(&self, incident: &Incident) -> Result<SidebarData, SyncError> {
        let id = incident.incident_id.as_str();
        let (alerts, notes) = tokio::try_join!(
            self.source.fetch_incident_alerts(id),
            self.source.fetch_incident_notes(id)
        )?;

        let fetched_at = Utc::now().fixed_offset();
        let metadata = SidebarMetadata {
            incident_id: incident.incident_id.clone(),
            alerts_fetched_at: Some(fetched_at),
            notes_fetched_at: Some(fetched_at),
            last_alert_count: incident.alert_count,
            last_updated_at: incident.updated_at,
        };

        if let Err(err) = self
            .cache
            .sidebar
            .replace_sidebar(id, alerts.clone(), notes.clone(), metadata.clone())
            .await
        {
            error!(incident_id = id, error = %err, "Failed to cache sidebar");
        }

        debug!(
            incident_id = id,
            alerts = alerts.len(),
            notes = notes.len(),
            "Refreshed sidebar"
        );

        Ok(SidebarData {
            incident_id: incident.incident_id.clone(),
            alerts,
            notes,
            metadata: Some(metadata),
            stale: false,
        })
    }
}
