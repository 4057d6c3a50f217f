//! PagerDuty REST v2 client
//!
//! Reads incidents, alerts and notes with offset pagination. The API key is
//! looked up in the secret store on every request so a reconfigured credential
//! takes effect on the next call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use super::{FetchOptions, IncidentSource, SourceError, SyncError, dedupe_by_id};
use crate::config::AppConfig;
use crate::models::{Incident, IncidentStatus, SidebarAlert, SidebarNote};
use crate::normalization::{
    RemoteAlert, RemoteIncident, RemoteNote, normalize_alert, normalize_incident, normalize_note,
};
use crate::secrets::{API_KEY_SECRET, SecretStore};

pub const PAGE_LIMIT: usize = 100;
const MAX_PAGES: usize = 100;
const ACCEPT_HEADER: &str = "application/vnd.pagerduty+json;version=2";

#[derive(Debug, Deserialize)]
struct IncidentsPage {
    #[serde(default)]
    incidents: Vec<RemoteIncident>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct AlertsPage {
    #[serde(default)]
    alerts: Vec<RemoteAlert>,
    #[serde(default)]
    more: bool,
}

#[derive(Debug, Deserialize)]
struct NotesEnvelope {
    #[serde(default)]
    notes: Vec<RemoteNote>,
}

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    user: CurrentUser,
}

#[derive(Debug, Deserialize)]
struct CurrentUser {
    id: String,
}

#[derive(Clone)]
pub struct PagerDutyClient {
    http: reqwest::Client,
    base_url: Url,
    secrets: Arc<dyn SecretStore>,
    resolved_window: chrono::Duration,
}

impl PagerDutyClient {
    pub fn new(
        api_base: &str,
        secrets: Arc<dyn SecretStore>,
        timeout: Duration,
        resolved_window: chrono::Duration,
    ) -> Result<Self, SourceError> {
        let base_url = Url::parse(api_base).map_err(|e| SourceError::ConfigurationError {
            details: format!("invalid api base {}: {}", api_base, e),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SourceError::ConfigurationError {
                details: format!("api base cannot hold a path: {}", api_base),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("incident-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::ConfigurationError {
                details: e.to_string(),
            })?;

        Ok(Self {
            http,
            base_url,
            secrets,
            resolved_window,
        })
    }

    pub fn from_config(
        config: &AppConfig,
        secrets: Arc<dyn SecretStore>,
    ) -> Result<Self, SourceError> {
        Self::new(
            &config.api_base,
            secrets,
            config.http_timeout(),
            config.scheduler.resolved_window(),
        )
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::ConfigurationError {
                details: format!("api base cannot hold a path: {}", self.base_url),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn api_key(&self) -> Result<String, SourceError> {
        match self.secrets.get(API_KEY_SECRET).await {
            Ok(Some(key)) if !key.trim().is_empty() => Ok(key),
            Ok(_) => Err(SourceError::AuthenticationError {
                details: "no API key configured".to_string(),
            }),
            Err(e) => Err(SourceError::ConfigurationError {
                details: format!("secret store: {}", e),
            }),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<T, SourceError> {
        let api_key = self.api_key().await?;
        let mut url = self.endpoint(segments)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }

        debug!(path = url.path(), "Requesting remote incident API");

        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Token token={}", api_key))
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await
            .map_err(|e| SourceError::NetworkError {
                details: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            warn!(?retry_after, "Rate limited by remote incident API");
            return Err(SourceError::RateLimitError { retry_after });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::AuthenticationError {
                details: format!("remote rejected credential ({})", status.as_u16()),
            });
        }
        if !status.is_success() {
            let body = response.text().await.ok().filter(|b| !b.is_empty());
            return Err(SourceError::HttpError {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::NetworkError {
                details: e.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|e| SourceError::MalformedResponse {
            details: e.to_string(),
        })
    }

    /// Page through `/incidents` until the remote reports no more results.
    async fn fetch_paginated(&self, options: &FetchOptions) -> Result<Vec<Incident>, SourceError> {
        let mut base_query: Vec<(&str, String)> = Vec::new();
        for status in &options.statuses {
            base_query.push(("statuses[]", status.as_str().to_string()));
        }
        for service_id in &options.service_ids {
            base_query.push(("service_ids[]", service_id.clone()));
        }
        for user_id in &options.user_ids {
            base_query.push(("user_ids[]", user_id.clone()));
        }
        if let Some(since) = options.since {
            base_query.push(("since", since.to_rfc3339()));
        }
        if let Some(until) = options.until {
            base_query.push(("until", until.to_rfc3339()));
        }
        base_query.push(("limit", PAGE_LIMIT.to_string()));

        let mut incidents = Vec::new();
        let mut offset = 0usize;

        for _ in 0..MAX_PAGES {
            let mut query = base_query.clone();
            query.push(("offset", offset.to_string()));

            let page: IncidentsPage = self.get_json(&["incidents"], &query).await?;
            let page_len = page.incidents.len();

            for remote in page.incidents {
                let remote_id = remote.id.clone();
                match normalize_incident(remote) {
                    Ok(incident) => incidents.push(incident),
                    Err(e) => warn!(incident_id = %remote_id, error = %e, "Skipping unmappable incident"),
                }
            }

            if !page.more || page_len == 0 {
                return Ok(incidents);
            }
            offset += page_len;
        }

        warn!(
            pages = MAX_PAGES,
            fetched = incidents.len(),
            "Stopped paginating incidents at page cap"
        );
        Ok(incidents)
    }
}

#[async_trait]
impl IncidentSource for PagerDutyClient {
    async fn current_user_id(&self) -> Result<String, SyncError> {
        let envelope: UserEnvelope = self.get_json(&["users", "me"], &[]).await?;
        Ok(envelope.user.id)
    }

    async fn fetch_open_incidents(
        &self,
        service_ids: &[String],
        user_id: Option<&str>,
    ) -> Result<Vec<Incident>, SyncError> {
        let user_id = user_id.filter(|id| !id.is_empty());

        if service_ids.is_empty() && user_id.is_none() {
            return Ok(self.fetch_paginated(&FetchOptions::open()).await?);
        }

        let by_service = async {
            if service_ids.is_empty() {
                Ok(Vec::new())
            } else {
                self.fetch_paginated(&FetchOptions::open().with_services(service_ids))
                    .await
            }
        };
        let by_user = async {
            match user_id {
                Some(user_id) => {
                    self.fetch_paginated(&FetchOptions::open().with_user(user_id))
                        .await
                }
                None => Ok(Vec::new()),
            }
        };

        let (mut incidents, assigned) = tokio::try_join!(by_service, by_user)?;
        incidents.extend(assigned);
        Ok(dedupe_by_id(incidents))
    }

    async fn fetch_resolved_incidents(
        &self,
        service_ids: &[String],
    ) -> Result<Vec<Incident>, SyncError> {
        let now = Utc::now();
        let options = FetchOptions {
            statuses: vec![IncidentStatus::Resolved],
            service_ids: service_ids.to_vec(),
            user_ids: Vec::new(),
            since: Some(now - self.resolved_window),
            until: Some(now),
        };
        Ok(dedupe_by_id(self.fetch_paginated(&options).await?))
    }

    async fn fetch_incidents_with_options(
        &self,
        options: FetchOptions,
    ) -> Result<Vec<Incident>, SyncError> {
        Ok(dedupe_by_id(self.fetch_paginated(&options).await?))
    }

    async fn fetch_incident_alerts(
        &self,
        incident_id: &str,
    ) -> Result<Vec<SidebarAlert>, SyncError> {
        let mut alerts = Vec::new();
        let mut offset = 0usize;

        for _ in 0..MAX_PAGES {
            let query = [
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ];
            let page: AlertsPage = self
                .get_json(&["incidents", incident_id, "alerts"], &query)
                .await?;
            let page_len = page.alerts.len();
            alerts.extend(page.alerts.into_iter().map(normalize_alert));

            if !page.more || page_len == 0 {
                break;
            }
            offset += page_len;
        }

        Ok(alerts)
    }

    async fn fetch_incident_notes(&self, incident_id: &str) -> Result<Vec<SidebarNote>, SyncError> {
        let envelope: NotesEnvelope = self
            .get_json(&["incidents", incident_id, "notes"], &[])
            .await?;
        Ok(envelope.notes.into_iter().map(normalize_note).collect())
    }
}
