//! Mapping of remote API records onto cache models.
//!
//! Only the fields the monitor consumes are declared; everything else in the
//! remote payload is ignored by serde.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::models::{Incident, IncidentStatus, SidebarAlert, SidebarNote, Urgency};

/// Reference object (`{id, summary}`) used for services and users.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteReference {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteAlertCounts {
    #[serde(default)]
    pub all: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteIncident {
    pub id: String,
    #[serde(default)]
    pub incident_number: i64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub status: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub service: Option<RemoteReference>,
    #[serde(default)]
    pub alert_counts: Option<RemoteAlertCounts>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_status_change_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAlert {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteNote {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub user: Option<RemoteReference>,
    pub created_at: DateTime<Utc>,
}

/// Errors that can occur while mapping remote records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("unknown incident status: {0}")]
    UnknownStatus(String),
    #[error("record missing required field: {field}")]
    MissingField { field: &'static str },
}

static HIGH_URGENCY_TITLE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(critical|sev[ -]?[01]|p[01]|outage|down|unreachable|data loss|breach)\b")
        .ok()
});

/// Urgency inferred from an incident title when the remote did not report one.
pub fn infer_urgency(title: &str) -> Urgency {
    match HIGH_URGENCY_TITLE.as_ref() {
        Some(pattern) if pattern.is_match(title) => Urgency::High,
        Some(_) => Urgency::Low,
        None => Urgency::default(),
    }
}

/// Map one remote incident onto the cache model. Timestamps are stored in UTC.
pub fn normalize_incident(remote: RemoteIncident) -> Result<Incident, NormalizationError> {
    if remote.id.trim().is_empty() {
        return Err(NormalizationError::MissingField { field: "id" });
    }

    let status = IncidentStatus::from_remote(&remote.status)
        .ok_or_else(|| NormalizationError::UnknownStatus(remote.status.clone()))?;

    let title = remote
        .title
        .or(remote.summary)
        .unwrap_or_default();

    let urgency = remote
        .urgency
        .as_deref()
        .and_then(Urgency::from_remote)
        .unwrap_or_else(|| infer_urgency(&title));

    let (service_id, service_summary) = match remote.service {
        Some(service) => {
            let summary = service.summary.unwrap_or_else(|| service.id.clone());
            (service.id, summary)
        }
        None => (String::new(), String::new()),
    };

    let updated_at = remote
        .updated_at
        .or(remote.last_status_change_at)
        .unwrap_or(remote.created_at);

    Ok(Incident {
        incident_id: remote.id,
        incident_number: remote.incident_number,
        title,
        service_id,
        service_summary,
        status,
        html_url: remote.html_url.unwrap_or_default(),
        urgency,
        alert_count: remote
            .alert_counts
            .map(|counts| counts.all.max(0))
            .unwrap_or(0),
        created_at: remote.created_at.fixed_offset(),
        updated_at: updated_at.fixed_offset(),
    })
}

pub fn normalize_alert(remote: RemoteAlert) -> SidebarAlert {
    SidebarAlert {
        alert_id: remote.id,
        summary: remote.summary.unwrap_or_default(),
        status: remote.status.unwrap_or_default(),
        severity: remote.severity,
        created_at: remote.created_at.fixed_offset(),
        body: remote.body.unwrap_or(Value::Null),
    }
}

pub fn normalize_note(remote: RemoteNote) -> SidebarNote {
    SidebarNote {
        note_id: remote.id,
        content: remote.content,
        author: remote
            .user
            .map(|user| user.summary.unwrap_or(user.id)),
        created_at: remote.created_at.fixed_offset(),
    }
}
