//! # Incident Handlers
//!
//! Open and resolved incident lists, plus per-incident sidebar detail.

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::models::IncidentResponse;
use crate::server::AppState;
use crate::sidebar::SidebarData;

/// Incident list wrapper
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IncidentListResponse {
    pub incidents: Vec<IncidentResponse>,
}

/// List open incidents
///
/// Triggered incidents first, newest first within each status.
#[utoipa::path(
    get,
    path = "/incidents/open",
    responses(
        (status = 200, description = "Open incidents", body = IncidentListResponse),
        (status = 401, description = "Remote rejected the credential", body = ApiError),
        (status = 502, description = "Remote API failure", body = ApiError),
        (status = 503, description = "Cache unavailable", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn open_incidents(
    State(state): State<AppState>,
) -> Result<Json<IncidentListResponse>, ApiError> {
    let incidents = state.monitor.open_incidents().await?;
    Ok(Json(IncidentListResponse {
        incidents: incidents.into_iter().map(IncidentResponse::from).collect(),
    }))
}

/// List resolved incidents
///
/// Most recently updated first, at most 100.
#[utoipa::path(
    get,
    path = "/incidents/resolved",
    responses(
        (status = 200, description = "Resolved incidents", body = IncidentListResponse),
        (status = 401, description = "Remote rejected the credential", body = ApiError),
        (status = 502, description = "Remote API failure", body = ApiError),
        (status = 503, description = "Cache unavailable", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn resolved_incidents(
    State(state): State<AppState>,
) -> Result<Json<IncidentListResponse>, ApiError> {
    let incidents = state.monitor.resolved_incidents().await?;
    Ok(Json(IncidentListResponse {
        incidents: incidents.into_iter().map(IncidentResponse::from).collect(),
    }))
}

/// Alerts and notes of one incident
#[utoipa::path(
    get,
    path = "/incidents/{id}/sidebar",
    params(
        ("id" = String, Path, description = "Remote incident id", example = "PABC123")
    ),
    responses(
        (status = 200, description = "Sidebar detail", body = SidebarData),
        (status = 404, description = "Incident not in cache", body = ApiError),
        (status = 502, description = "Remote API failure with nothing cached", body = ApiError)
    ),
    tag = "incidents"
)]
pub async fn incident_sidebar(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SidebarData>, ApiError> {
    let sidebar = state.monitor.sidebar_data(&id).await?;
    Ok(Json(sidebar))
}
