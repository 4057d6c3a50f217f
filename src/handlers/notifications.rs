//! # Notification Handlers
//!
//! Notification preferences, sound snooze and the manual sound test.

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::notifications::NotificationSettings;
use crate::server::AppState;

/// Partial update; omitted fields keep their value
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct NotificationSettingsUpdate {
    pub enabled: Option<bool>,
    /// `default` speaks the service name; anything else names a sound asset
    #[schema(example = "default")]
    pub sound: Option<String>,
    pub browser_redirect: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SnoozeRequest {
    #[schema(example = 30, minimum = 1, maximum = 1440)]
    pub minutes: u32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SnoozeResponse {
    #[schema(value_type = String, example = "2025-01-01T12:30:00Z")]
    pub snooze_until: DateTime<Utc>,
}

/// Current notification settings
#[utoipa::path(
    get,
    path = "/settings/notifications",
    responses(
        (status = 200, description = "Notification settings", body = NotificationSettings)
    ),
    tag = "notifications"
)]
pub async fn get_notification_settings(
    State(state): State<AppState>,
) -> Json<NotificationSettings> {
    Json(state.monitor.notification_settings().await)
}

/// Update notification settings
#[utoipa::path(
    put,
    path = "/settings/notifications",
    request_body = NotificationSettingsUpdate,
    responses(
        (status = 200, description = "Updated settings", body = NotificationSettings),
        (status = 400, description = "Invalid settings", body = ApiError)
    ),
    tag = "notifications"
)]
pub async fn update_notification_settings(
    State(state): State<AppState>,
    payload: Result<Json<NotificationSettingsUpdate>, JsonRejection>,
) -> Result<Json<NotificationSettings>, ApiError> {
    let Json(update) = payload?;

    if let Some(sound) = update.sound.as_deref() {
        state.monitor.set_notification_sound(sound).await?;
    }
    if let Some(enabled) = update.enabled {
        state.monitor.set_notifications_enabled(enabled).await;
    }
    if let Some(redirect) = update.browser_redirect {
        state.monitor.set_browser_redirect(redirect).await;
    }

    Ok(Json(state.monitor.notification_settings().await))
}

/// Snooze notification sounds
#[utoipa::path(
    post,
    path = "/notifications/snooze",
    request_body = SnoozeRequest,
    responses(
        (status = 200, description = "Snooze deadline", body = SnoozeResponse),
        (status = 400, description = "Minutes out of range", body = ApiError)
    ),
    tag = "notifications"
)]
pub async fn snooze(
    State(state): State<AppState>,
    payload: Result<Json<SnoozeRequest>, JsonRejection>,
) -> Result<Json<SnoozeResponse>, ApiError> {
    let Json(request) = payload?;
    let snooze_until = state.monitor.snooze(request.minutes).await?;
    Ok(Json(SnoozeResponse { snooze_until }))
}

/// Cancel the sound snooze
#[utoipa::path(
    delete,
    path = "/notifications/snooze",
    responses(
        (status = 204, description = "Snooze cleared")
    ),
    tag = "notifications"
)]
pub async fn unsnooze(State(state): State<AppState>) -> StatusCode {
    state.monitor.unsnooze().await;
    StatusCode::NO_CONTENT
}

/// Play the configured sound once
///
/// Waits for playback to finish, up to the configured timeout.
#[utoipa::path(
    post,
    path = "/notifications/test-sound",
    responses(
        (status = 204, description = "Sound played"),
        (status = 500, description = "Playback failed", body = ApiError),
        (status = 503, description = "Sound queue full or worker stopped", body = ApiError),
        (status = 504, description = "Playback timed out", body = ApiError)
    ),
    tag = "notifications"
)]
pub async fn test_sound(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.monitor.test_sound().await?;
    Ok(StatusCode::NO_CONTENT)
}
