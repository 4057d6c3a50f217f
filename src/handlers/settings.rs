//! # Settings Handlers
//!
//! Credential, service selection and polling control.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::scheduler::FilterState;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CredentialRequest {
    /// Remote API key; stored in the secret store, never echoed back
    #[schema(example = "u+abcdefghijklmnop")]
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServicesRequest {
    /// Remote service ids to watch; empty watches every service
    #[schema(example = json!(["PSVC1", "PSVC2"]))]
    pub service_ids: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FilterByUserRequest {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FilterStateResponse {
    pub selected_services: Vec<String>,
    pub filter_by_user: bool,
}

impl From<FilterState> for FilterStateResponse {
    fn from(state: FilterState) -> Self {
        Self {
            selected_services: state.selected_services,
            filter_by_user: state.filter_by_user,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PollingStatusResponse {
    pub running: bool,
}

/// Configure the remote API key
#[utoipa::path(
    put,
    path = "/settings/credential",
    request_body = CredentialRequest,
    responses(
        (status = 204, description = "Credential stored"),
        (status = 400, description = "Empty or malformed key", body = ApiError)
    ),
    tag = "settings"
)]
pub async fn configure_credential(
    State(state): State<AppState>,
    payload: Result<Json<CredentialRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(request) = payload?;
    state
        .monitor
        .configure_credential(&request.api_key)
        .await
        .map_err(|err| ApiError::from(err).with_details(serde_json::json!({"field": "api_key"})))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Select the services to watch
#[utoipa::path(
    put,
    path = "/settings/services",
    request_body = ServicesRequest,
    responses(
        (status = 200, description = "Updated filters", body = FilterStateResponse),
        (status = 400, description = "Malformed request", body = ApiError)
    ),
    tag = "settings"
)]
pub async fn set_selected_services(
    State(state): State<AppState>,
    payload: Result<Json<ServicesRequest>, JsonRejection>,
) -> Result<Json<FilterStateResponse>, ApiError> {
    let Json(request) = payload?;
    state.monitor.set_selected_services(request.service_ids).await;
    Ok(Json(state.monitor.filters().await.into()))
}

/// Toggle filtering by assigned user
#[utoipa::path(
    put,
    path = "/settings/filter-by-user",
    request_body = FilterByUserRequest,
    responses(
        (status = 200, description = "Updated filters", body = FilterStateResponse),
        (status = 400, description = "Malformed request", body = ApiError)
    ),
    tag = "settings"
)]
pub async fn set_filter_by_user(
    State(state): State<AppState>,
    payload: Result<Json<FilterByUserRequest>, JsonRejection>,
) -> Result<Json<FilterStateResponse>, ApiError> {
    let Json(request) = payload?;
    state.monitor.set_filter_by_user(request.enabled).await;
    Ok(Json(state.monitor.filters().await.into()))
}

/// Start background polling
#[utoipa::path(
    post,
    path = "/polling/start",
    responses(
        (status = 200, description = "Polling state", body = PollingStatusResponse)
    ),
    tag = "polling"
)]
pub async fn start_polling(State(state): State<AppState>) -> Json<PollingStatusResponse> {
    state.monitor.start_polling().await;
    Json(PollingStatusResponse {
        running: state.monitor.is_polling().await,
    })
}

/// Stop background polling
#[utoipa::path(
    post,
    path = "/polling/stop",
    responses(
        (status = 200, description = "Polling state", body = PollingStatusResponse)
    ),
    tag = "polling"
)]
pub async fn stop_polling(State(state): State<AppState>) -> Json<PollingStatusResponse> {
    state.monitor.stop_polling().await;
    Json(PollingStatusResponse {
        running: state.monitor.is_polling().await,
    })
}
