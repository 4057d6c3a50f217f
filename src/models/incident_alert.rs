//! Incident alert entity model
//!
//! Cached alerts shown in an incident's detail sidebar.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "incident_alerts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Owning incident
    pub incident_id: String,

    /// Remote alert identifier
    pub alert_id: String,

    pub summary: String,

    pub status: String,

    pub severity: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    /// Free-form alert body as returned by the remote API
    #[sea_orm(column_type = "JsonBinary")]
    pub body: JsonValue,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Alert as fetched from the remote API, before it is attached to a cache row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SidebarAlert {
    pub alert_id: String,
    pub summary: String,
    pub status: String,
    pub severity: Option<String>,
    #[schema(value_type = String, example = "2025-01-01T12:00:00Z")]
    pub created_at: DateTimeWithTimeZone,
    pub body: JsonValue,
}

impl From<Model> for SidebarAlert {
    fn from(model: Model) -> Self {
        Self {
            alert_id: model.alert_id,
            summary: model.summary,
            status: model.status,
            severity: model.severity,
            created_at: model.created_at,
            body: model.body,
        }
    }
}
