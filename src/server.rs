//! # Server Configuration
//!
//! Local control API: the same queries and commands as the Rust facade, plus an
//! SSE stream of change events for a UI running in another process.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::monitor::IncidentMonitor;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub monitor: Arc<IncidentMonitor>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/incidents/open", get(handlers::incidents::open_incidents))
        .route(
            "/incidents/resolved",
            get(handlers::incidents::resolved_incidents),
        )
        .route(
            "/incidents/{id}/sidebar",
            get(handlers::incidents::incident_sidebar),
        )
        .route(
            "/settings/credential",
            put(handlers::settings::configure_credential),
        )
        .route(
            "/settings/services",
            put(handlers::settings::set_selected_services),
        )
        .route(
            "/settings/filter-by-user",
            put(handlers::settings::set_filter_by_user),
        )
        .route(
            "/settings/notifications",
            get(handlers::notifications::get_notification_settings)
                .put(handlers::notifications::update_notification_settings),
        )
        .route(
            "/notifications/snooze",
            post(handlers::notifications::snooze).delete(handlers::notifications::unsnooze),
        )
        .route(
            "/notifications/test-sound",
            post(handlers::notifications::test_sound),
        )
        .route("/polling/start", post(handlers::settings::start_polling))
        .route("/polling/stop", post(handlers::settings::stop_polling))
        .route("/events", get(handlers::events::event_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Serve the control API until `shutdown` fires.
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = state
        .config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Control API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    tracing::info!("Control API stopped");
    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::incidents::open_incidents,
        crate::handlers::incidents::resolved_incidents,
        crate::handlers::incidents::incident_sidebar,
        crate::handlers::settings::configure_credential,
        crate::handlers::settings::set_selected_services,
        crate::handlers::settings::set_filter_by_user,
        crate::handlers::settings::start_polling,
        crate::handlers::settings::stop_polling,
        crate::handlers::notifications::get_notification_settings,
        crate::handlers::notifications::update_notification_settings,
        crate::handlers::notifications::snooze,
        crate::handlers::notifications::unsnooze,
        crate::handlers::notifications::test_sound,
        crate::handlers::events::event_stream,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::IncidentResponse,
            crate::models::IncidentStatus,
            crate::models::Urgency,
            crate::models::SidebarAlert,
            crate::models::SidebarNote,
            crate::models::SidebarMetadata,
            crate::sidebar::SidebarData,
            crate::notifications::NotificationSettings,
            crate::events::MonitorEvent,
            crate::events::IncidentScope,
            crate::handlers::HealthResponse,
            crate::handlers::incidents::IncidentListResponse,
            crate::handlers::settings::CredentialRequest,
            crate::handlers::settings::ServicesRequest,
            crate::handlers::settings::FilterByUserRequest,
            crate::handlers::settings::FilterStateResponse,
            crate::handlers::settings::PollingStatusResponse,
            crate::handlers::notifications::NotificationSettingsUpdate,
            crate::handlers::notifications::SnoozeRequest,
            crate::handlers::notifications::SnoozeResponse,
            crate::error::ApiError,
        )
    ),
    info(
        title = "Incident Monitor Control API",
        description = "Local control surface for the incident monitor",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
