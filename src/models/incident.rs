//! Incident entity model
//!
//! This module contains the SeaORM entity model for the incidents table,
//! the local mirror of remote incident state.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Incident entity keyed by the remote incident identifier
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "incidents")]
pub struct Model {
    /// Remote incident identifier (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub incident_id: String,

    /// Human-facing incident number
    pub incident_number: i64,

    pub title: String,

    /// Identifier of the service the incident was raised against
    pub service_id: String,

    /// Display name of the service
    pub service_summary: String,

    pub status: IncidentStatus,

    /// Link to the incident in the remote web UI (may be empty)
    pub html_url: String,

    pub urgency: Urgency,

    /// Number of alerts grouped under the incident
    pub alert_count: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

/// Lifecycle status reported by the remote system
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum IncidentStatus {
    #[sea_orm(string_value = "triggered")]
    #[serde(rename = "triggered")]
    Triggered,

    #[sea_orm(string_value = "acknowledged")]
    #[serde(rename = "acknowledged")]
    Acknowledged,

    #[sea_orm(string_value = "resolved")]
    #[serde(rename = "resolved")]
    Resolved,
}

impl IncidentStatus {
    /// Statuses that count as "open" for list queries and stale sweeps.
    pub const OPEN: [IncidentStatus; 2] = [IncidentStatus::Triggered, IncidentStatus::Acknowledged];

    pub fn is_open(self) -> bool {
        !matches!(self, IncidentStatus::Resolved)
    }

    /// Sort key for open lists: triggered incidents first.
    pub fn priority(self) -> u8 {
        match self {
            IncidentStatus::Triggered => 0,
            IncidentStatus::Acknowledged => 1,
            IncidentStatus::Resolved => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IncidentStatus::Triggered => "triggered",
            IncidentStatus::Acknowledged => "acknowledged",
            IncidentStatus::Resolved => "resolved",
        }
    }

    /// Parse the status string used by the remote API.
    pub fn from_remote(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "triggered" => Some(IncidentStatus::Triggered),
            "acknowledged" => Some(IncidentStatus::Acknowledged),
            "resolved" => Some(IncidentStatus::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    Default,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Urgency {
    #[sea_orm(string_value = "high")]
    #[serde(rename = "high")]
    #[default]
    High,

    #[sea_orm(string_value = "low")]
    #[serde(rename = "low")]
    Low,
}

impl Urgency {
    pub fn from_remote(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(Urgency::High),
            "low" => Some(Urgency::Low),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Public representation of an incident for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IncidentResponse {
    pub incident_id: String,
    pub incident_number: i64,
    pub title: String,
    pub service_id: String,
    pub service_summary: String,
    pub status: IncidentStatus,
    pub html_url: String,
    pub urgency: Urgency,
    pub alert_count: i32,
    #[schema(value_type = String, example = "2025-01-01T12:00:00Z")]
    pub created_at: DateTimeWithTimeZone,
    #[schema(value_type = String, example = "2025-01-01T12:05:00Z")]
    pub updated_at: DateTimeWithTimeZone,
}

impl From<Model> for IncidentResponse {
    fn from(model: Model) -> Self {
        Self {
            incident_id: model.incident_id,
            incident_number: model.incident_number,
            title: model.title,
            service_id: model.service_id,
            service_summary: model.service_summary,
            status: model.status,
            html_url: model.html_url,
            urgency: model.urgency,
            alert_count: model.alert_count,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}
