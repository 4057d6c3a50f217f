//! # Remote Incident Source
//!
//! The interface the scheduler and sidebar service use to read incident state
//! from the remote incident-management API, plus the error taxonomy shared by
//! every implementation.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Incident, IncidentStatus, SidebarAlert, SidebarNote};

pub mod pagerduty;

pub use pagerduty::PagerDutyClient;

/// Wire-level failure of a single remote request
#[derive(Debug, Clone)]
pub enum SourceError {
    /// Non-success HTTP status from the remote API
    HttpError { status: u16, body: Option<String> },
    /// Response body could not be decoded
    MalformedResponse { details: String },
    /// Network or connectivity error
    NetworkError { details: String },
    /// 401/403, or no credential configured
    AuthenticationError { details: String },
    /// 429 with the server's Retry-After hint
    RateLimitError { retry_after: Option<u64> },
    /// Invalid base URL or similar setup problem
    ConfigurationError { details: String },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::HttpError { status, body } => {
                write!(
                    f,
                    "HTTP error {}: {}",
                    status,
                    body.as_deref().unwrap_or("No body")
                )
            }
            SourceError::MalformedResponse { details } => {
                write!(f, "Malformed response: {}", details)
            }
            SourceError::NetworkError { details } => write!(f, "Network error: {}", details),
            SourceError::AuthenticationError { details } => {
                write!(f, "Authentication error: {}", details)
            }
            SourceError::RateLimitError { retry_after } => {
                write!(f, "Rate limit exceeded")?;
                if let Some(after) = retry_after {
                    write!(f, " (retry after: {}s)", after)?;
                }
                Ok(())
            }
            SourceError::ConfigurationError { details } => {
                write!(f, "Configuration error: {}", details)
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Classified failure of a sync operation
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SyncError {
    #[serde(flatten)]
    pub kind: SyncErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Missing or rejected credential
    Unauthorized,
    /// Rate limited with optional retry after hint
    RateLimited {
        #[serde(skip_serializing_if = "Option::is_none")]
        retry_after_secs: Option<u64>,
    },
    /// Retryable on the next tick
    Transient,
    /// Will not succeed without a configuration change
    Permanent,
}

impl SyncError {
    pub fn unauthorized<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Unauthorized,
            message: Some(message.into()),
        }
    }

    pub fn rate_limited(retry_after_secs: Option<u64>) -> Self {
        Self {
            kind: SyncErrorKind::RateLimited { retry_after_secs },
            message: None,
        }
    }

    pub fn transient<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Transient,
            message: Some(message.into()),
        }
    }

    pub fn permanent<S: Into<String>>(message: S) -> Self {
        Self {
            kind: SyncErrorKind::Permanent,
            message: Some(message.into()),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.kind, SyncErrorKind::Unauthorized)
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            SyncErrorKind::Unauthorized => write!(f, "Unauthorized")?,
            SyncErrorKind::RateLimited { retry_after_secs } => {
                write!(f, "Rate limited")?;
                if let Some(after) = retry_after_secs {
                    write!(f, " (retry after: {}s)", after)?;
                }
            }
            SyncErrorKind::Transient => write!(f, "Transient error")?,
            SyncErrorKind::Permanent => write!(f, "Permanent error")?,
        }
        if let Some(msg) = &self.message {
            write!(f, ": {}", msg)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {}

impl From<SourceError> for SyncError {
    fn from(source_error: SourceError) -> Self {
        match source_error {
            SourceError::RateLimitError { retry_after } => SyncError::rate_limited(retry_after),
            SourceError::AuthenticationError { details } => SyncError::unauthorized(details),
            SourceError::NetworkError { details } => SyncError::transient(details),
            SourceError::HttpError { status, body } => match status {
                401 | 403 => SyncError::unauthorized(format!("HTTP error {}", status)),
                429 => SyncError::rate_limited(None),
                400..=499 => SyncError::permanent(format!(
                    "HTTP error {}: {}",
                    status,
                    body.unwrap_or_default()
                )),
                _ => SyncError::transient(format!(
                    "HTTP error {}: {}",
                    status,
                    body.unwrap_or_default()
                )),
            },
            SourceError::MalformedResponse { details } => {
                SyncError::transient(format!("Malformed response: {}", details))
            }
            SourceError::ConfigurationError { details } => {
                SyncError::permanent(format!("Configuration error: {}", details))
            }
        }
    }
}

/// Filters for an arbitrary incident query. Empty sets mean "no filter".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOptions {
    pub statuses: Vec<IncidentStatus>,
    pub service_ids: Vec<String>,
    pub user_ids: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl FetchOptions {
    pub fn open() -> Self {
        Self {
            statuses: IncidentStatus::OPEN.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_services(mut self, service_ids: &[String]) -> Self {
        self.service_ids = service_ids.to_vec();
        self
    }

    pub fn with_user(mut self, user_id: &str) -> Self {
        self.user_ids = vec![user_id.to_string()];
        self
    }
}

#[async_trait]
pub trait IncidentSource: Send + Sync {
    /// Id of the user the configured credential belongs to.
    async fn current_user_id(&self) -> Result<String, SyncError>;

    /// Open incidents on `service_ids` unioned with open incidents assigned to
    /// `user_id`. Service results come first; duplicates keep their first copy.
    async fn fetch_open_incidents(
        &self,
        service_ids: &[String],
        user_id: Option<&str>,
    ) -> Result<Vec<Incident>, SyncError>;

    /// Incidents resolved inside the client's resolved window.
    async fn fetch_resolved_incidents(
        &self,
        service_ids: &[String],
    ) -> Result<Vec<Incident>, SyncError>;

    async fn fetch_incidents_with_options(
        &self,
        options: FetchOptions,
    ) -> Result<Vec<Incident>, SyncError>;

    async fn fetch_incident_alerts(&self, incident_id: &str)
    -> Result<Vec<SidebarAlert>, SyncError>;

    async fn fetch_incident_notes(&self, incident_id: &str) -> Result<Vec<SidebarNote>, SyncError>;
}

/// Drop repeated incident ids, keeping the first occurrence and the input order.
pub fn dedupe_by_id(incidents: Vec<Incident>) -> Vec<Incident> {
    let mut seen = HashSet::with_capacity(incidents.len());
    incidents
        .into_iter()
        .filter(|incident| seen.insert(incident.incident_id.clone()))
        .collect()
}
