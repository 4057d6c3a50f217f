//! # Error Handling
//!
//! Typed errors for the cache layer and the `problem+json` envelope used by the
//! local control API. Each failure class of the monitor maps to one HTTP status.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::monitor::MonitorError;
use crate::notifications::NotificationError;
use crate::remote::{SyncError, SyncErrorKind};
use crate::scheduler::SchedulerError;
use crate::sidebar::SidebarError;

/// Errors surfaced by the incident cache repositories.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("validation failed: {0}")]
    Validation(String),
}

impl RepositoryError {
    pub fn database_error(err: sea_orm::DbErr) -> Self {
        RepositoryError::Database(err)
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        RepositoryError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    #[schema(value_type = String)]
    pub code: Box<str>,
    /// Human-readable error message
    #[schema(value_type = String)]
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation id for matching a response with log lines
    #[schema(value_type = String)]
    pub trace_id: Box<str>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
            retry_after: None,
            trace_id: format!("corr-{}", &uuid::Uuid::new_v4().simple().to_string()[..8]).into(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn validation(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::validation(&message)
    }
}

impl From<RepositoryError> for ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { entity, id } => {
                Self::not_found(&format!("{} not found: {}", entity, id))
            }
            RepositoryError::Validation(message) => Self::validation(&message),
            RepositoryError::Database(err) => {
                tracing::error!(error = %err, "Database error while serving request");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CACHE_UNAVAILABLE",
                    "Incident cache is unavailable",
                )
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(error: SyncError) -> Self {
        let message = error.to_string();
        match error.kind {
            SyncErrorKind::Unauthorized => {
                Self::new(StatusCode::UNAUTHORIZED, "REMOTE_UNAUTHORIZED", &message)
            }
            SyncErrorKind::RateLimited { retry_after_secs } => {
                let api_error =
                    Self::new(StatusCode::TOO_MANY_REQUESTS, "REMOTE_RATE_LIMITED", &message);
                match retry_after_secs {
                    Some(seconds) => api_error.with_retry_after(seconds),
                    None => api_error,
                }
            }
            SyncErrorKind::Transient | SyncErrorKind::Permanent => {
                Self::new(StatusCode::BAD_GATEWAY, "REMOTE_ERROR", &message)
            }
        }
    }
}

impl From<NotificationError> for ApiError {
    fn from(error: NotificationError) -> Self {
        let message = error.to_string();
        match error {
            NotificationError::QueueFull => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "SOUND_QUEUE_FULL", &message)
            }
            NotificationError::TimedOut(_) => {
                Self::new(StatusCode::GATEWAY_TIMEOUT, "SOUND_TIMEOUT", &message)
            }
            NotificationError::WorkerStopped => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "SOUND_WORKER_STOPPED", &message)
            }
            NotificationError::Playback(_) => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "SOUND_FAILED", &message)
            }
            NotificationError::InvalidSnooze(_) => Self::validation(&message),
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(error: SchedulerError) -> Self {
        match error {
            SchedulerError::Sync(err) => err.into(),
            SchedulerError::Cache(err) => err.into(),
        }
    }
}

impl From<SidebarError> for ApiError {
    fn from(error: SidebarError) -> Self {
        match error {
            SidebarError::Cache(err) => err.into(),
            SidebarError::Sync(err) => err.into(),
        }
    }
}

impl From<MonitorError> for ApiError {
    fn from(error: MonitorError) -> Self {
        match error {
            MonitorError::Validation(message) => Self::validation(&message),
            MonitorError::Cache(err) => err.into(),
            MonitorError::Sync(err) => err.into(),
            MonitorError::Scheduler(err) => err.into(),
            MonitorError::Notification(err) => err.into(),
            MonitorError::Sidebar(err) => err.into(),
            MonitorError::Secrets(err) => {
                tracing::error!(error = %err, "Secret store failure");
                Self::internal()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
        assert!(error.trace_id.starts_with("corr-"));
    }

    #[test]
    fn test_api_error_with_details() {
        let error = ApiError::validation("bad input").with_details(json!({"field": "api_key"}));

        assert_eq!(error.details, Some(Box::new(json!({"field": "api_key"}))));
    }

    #[test]
    fn test_repository_not_found_maps_to_404() {
        let error: ApiError = RepositoryError::not_found("incident", "PABC123").into();

        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert!(error.message.contains("PABC123"));
    }

    #[test]
    fn test_rate_limited_sync_error_sets_retry_after() {
        let error: ApiError = SyncError::rate_limited(Some(30)).into();

        assert_eq!(error.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(error.retry_after, Some(30));
    }

    #[test]
    fn test_empty_credential_maps_to_validation_failure() {
        let error: ApiError = MonitorError::Validation("API key must not be empty".into()).into();

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
    }

    #[test]
    fn test_sound_timeout_maps_to_gateway_timeout() {
        let error: ApiError =
            NotificationError::TimedOut(std::time::Duration::from_secs(5)).into();

        assert_eq!(error.status, StatusCode::GATEWAY_TIMEOUT);
    }
}
