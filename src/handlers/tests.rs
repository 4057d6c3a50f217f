//! # Tests for Handlers
//!
//! Router-level tests driven through `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
    response::Json,
};
use chrono::Utc;
use migration::{Migrator, MigratorTrait};
use sea_orm::Database;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::config::AppConfig;
use crate::handlers::root;
use crate::models::{Incident, IncidentStatus, ServiceInfo, SidebarAlert, SidebarNote, Urgency};
use crate::monitor::IncidentMonitor;
use crate::notifications::{AlertSink, NotificationError};
use crate::remote::{FetchOptions, IncidentSource, SyncError};
use crate::repositories::CacheStore;
use crate::secrets::{InMemorySecretStore, SecretStore};
use crate::server::{AppState, create_app};

struct StaticSource {
    open: Vec<Incident>,
}

#[async_trait]
impl IncidentSource for StaticSource {
    async fn current_user_id(&self) -> Result<String, SyncError> {
        Ok("PUSER1".to_string())
    }

    async fn fetch_open_incidents(
        &self,
        _service_ids: &[String],
        _user_id: Option<&str>,
    ) -> Result<Vec<Incident>, SyncError> {
        Ok(self.open.clone())
    }

    async fn fetch_resolved_incidents(
        &self,
        _service_ids: &[String],
    ) -> Result<Vec<Incident>, SyncError> {
        Ok(Vec::new())
    }

    async fn fetch_incidents_with_options(
        &self,
        _options: FetchOptions,
    ) -> Result<Vec<Incident>, SyncError> {
        Ok(Vec::new())
    }

    async fn fetch_incident_alerts(
        &self,
        _incident_id: &str,
    ) -> Result<Vec<SidebarAlert>, SyncError> {
        Ok(Vec::new())
    }

    async fn fetch_incident_notes(
        &self,
        _incident_id: &str,
    ) -> Result<Vec<SidebarNote>, SyncError> {
        Err(SyncError::transient("notes unavailable"))
    }
}

struct SilentSink;

#[async_trait]
impl AlertSink for SilentSink {
    async fn speak(&self, _text: &str) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn play_sound(&self, _name: &str) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn show_banner(&self, _title: &str, _body: &str) -> Result<(), NotificationError> {
        Ok(())
    }

    async fn open_url(&self, _url: &str) -> Result<(), NotificationError> {
        Ok(())
    }
}

fn incident(id: &str, status: IncidentStatus, minutes_ago: i64) -> Incident {
    let at = (Utc::now() - chrono::Duration::minutes(minutes_ago)).fixed_offset();
    Incident {
        incident_id: id.to_string(),
        incident_number: 100,
        title: format!("Incident {}", id),
        service_id: "S1".to_string(),
        service_summary: "Checkout".to_string(),
        status,
        html_url: String::new(),
        urgency: Urgency::High,
        alert_count: 1,
        created_at: at,
        updated_at: at,
    }
}

async fn test_state(open: Vec<Incident>) -> (AppState, Arc<InMemorySecretStore>) {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect sqlite");
    Migrator::up(&db, None).await.expect("migrate");

    let config = AppConfig::default();
    let secrets = Arc::new(InMemorySecretStore::new());
    let (monitor, _queues) = IncidentMonitor::new(
        &config,
        CacheStore::new(db.clone()),
        Arc::new(StaticSource { open }),
        Arc::new(SilentSink),
        secrets.clone(),
    );

    let state = AppState {
        config: Arc::new(config),
        db,
        monitor: Arc::new(monitor),
    };
    (state, secrets)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn test_root_handler_returns_expected_service_info() {
    let Json(service_info) = root().await;

    assert_eq!(service_info.service, "incident-monitor");
    assert_eq!(service_info.version, env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_service_info_serializes_fields() {
    let json_value = serde_json::to_value(ServiceInfo::default()).expect("serialize");

    assert!(json_value.get("service").is_some());
    assert!(json_value.get("version").is_some());
}

#[tokio::test]
async fn test_healthz_reports_polling_state() {
    let (state, _) = test_state(Vec::new()).await;
    let app = create_app(state);

    let response = app
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["polling"], false);
}

#[tokio::test]
async fn test_open_incidents_reconciles_when_stopped() {
    let (state, _) = test_state(vec![
        incident("INC2", IncidentStatus::Acknowledged, 1),
        incident("INC1", IncidentStatus::Triggered, 5),
    ])
    .await;
    let app = create_app(state);

    let response = app
        .oneshot(Request::get("/incidents/open").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let ids: Vec<&str> = body["incidents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["incident_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["INC1", "INC2"]);
}

#[tokio::test]
async fn test_empty_credential_is_rejected() {
    let (state, secrets) = test_state(Vec::new()).await;
    let app = create_app(state);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/settings/credential",
            json!({"api_key": "   "}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/problem+json"
    );
    let body = body_json(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
    assert_eq!(body["details"]["field"], "api_key");
    assert!(secrets.get("api_key").await.unwrap().is_none());
}

#[tokio::test]
async fn test_credential_is_stored_and_announced() {
    let (state, secrets) = test_state(Vec::new()).await;
    let mut events = state.monitor.subscribe();
    let app = create_app(state);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/settings/credential",
            json!({"api_key": "u+secret"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        secrets.get("api_key").await.unwrap().as_deref(),
        Some("u+secret")
    );
    assert_eq!(
        events.recv().await.unwrap(),
        crate::events::MonitorEvent::ApiKeyConfigured
    );
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let (state, _) = test_state(Vec::new()).await;
    let app = create_app(state);

    let request = Request::builder()
        .method("PUT")
        .uri("/settings/services")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_service_selection_is_normalized() {
    let (state, _) = test_state(Vec::new()).await;
    let app = create_app(state);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/settings/services",
            json!({"service_ids": ["S2", " S1 ", "", "S2"]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["selected_services"], json!(["S1", "S2"]));
    assert_eq!(body["filter_by_user"], false);
}

#[tokio::test]
async fn test_snooze_round_trip() {
    let (state, _) = test_state(Vec::new()).await;
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/notifications/snooze",
            json!({"minutes": 30}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["snooze_until"].is_string());

    let response = app
        .clone()
        .oneshot(
            Request::get("/settings/notifications")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["snoozed"], true);

    let response = app
        .clone()
        .oneshot(
            Request::delete("/notifications/snooze")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::get("/settings/notifications")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["snoozed"], false);
}

#[tokio::test]
async fn test_zero_minute_snooze_is_rejected() {
    let (state, _) = test_state(Vec::new()).await;
    let app = create_app(state);

    let response = app
        .oneshot(json_request(
            "POST",
            "/notifications/snooze",
            json!({"minutes": 0}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_sidebar_for_unknown_incident_is_404() {
    let (state, _) = test_state(Vec::new()).await;
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::get("/incidents/PNOPE/sidebar")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sidebar_fetch_failure_without_cache_is_bad_gateway() {
    let (state, _) = test_state(vec![incident("INC1", IncidentStatus::Triggered, 1)]).await;
    state.monitor.refresh().await.unwrap();
    let app = create_app(state);

    let response = app
        .oneshot(
            Request::get("/incidents/INC1/sidebar")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_update_notification_settings_is_partial() {
    let (state, _) = test_state(Vec::new()).await;
    let app = create_app(state);

    let response = app
        .oneshot(json_request(
            "PUT",
            "/settings/notifications",
            json!({"browser_redirect": true}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["browser_redirect"], true);
    assert_eq!(body["enabled"], true);
    assert_eq!(body["sound"], "default");
}

#[tokio::test]
async fn test_openapi_document_lists_control_routes() {
    let (state, _) = test_state(Vec::new()).await;
    let app = create_app(state);

    let response = app
        .oneshot(Request::get("/openapi.json").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["paths"]["/incidents/open"].is_object());
    assert!(body["paths"]["/notifications/snooze"]["delete"].is_object());
}
