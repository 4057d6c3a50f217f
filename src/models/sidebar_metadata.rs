//! Sidebar metadata entity model
//!
//! Snapshot of the incident fields that were current when the sidebar was
//! last fetched. A mismatch against the live incident means the sidebar is stale.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "incident_sidebar_metadata")]
#[schema(as = SidebarMetadata)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub incident_id: String,

    #[schema(value_type = Option<String>)]
    pub alerts_fetched_at: Option<DateTimeWithTimeZone>,

    #[schema(value_type = Option<String>)]
    pub notes_fetched_at: Option<DateTimeWithTimeZone>,

    /// `alert_count` of the incident at fetch time
    pub last_alert_count: i32,

    /// `updated_at` of the incident at fetch time
    #[schema(value_type = String)]
    pub last_updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// True when the cached sidebar no longer matches the incident it was fetched for.
    pub fn is_stale_for(&self, incident: &super::incident::Model) -> bool {
        self.last_alert_count != incident.alert_count
            || self.last_updated_at != incident.updated_at
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
