//! # API Handlers
//!
//! HTTP endpoint handlers for the local control API.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod events;
pub mod incidents;
pub mod notifications;
pub mod settings;

/// Liveness of the process and its cache
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    pub polling: bool,
}

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Health check
///
/// Verifies the incident cache answers queries.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Cache reachable", body = HealthResponse),
        (status = 503, description = "Cache unavailable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    db::health_check(&state.db).await.map_err(|err| {
        tracing::warn!(error = %err, "Health check failed");
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "CACHE_UNAVAILABLE",
            "Incident cache is unavailable",
        )
    })?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        polling: state.monitor.is_polling().await,
    }))
}

#[cfg(test)]
mod tests;
