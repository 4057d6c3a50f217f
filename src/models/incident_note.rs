//! Incident note entity model
//!
//! Cached responder notes shown in an incident's detail sidebar.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "incident_notes")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub incident_id: String,

    pub note_id: String,

    pub content: String,

    /// Display name of the note author, if the remote reported one
    pub author: Option<String>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SidebarNote {
    pub note_id: String,
    pub content: String,
    pub author: Option<String>,
    #[schema(value_type = String, example = "2025-01-01T12:00:00Z")]
    pub created_at: DateTimeWithTimeZone,
}

impl From<Model> for SidebarNote {
    fn from(model: Model) -> Self {
        Self {
            note_id: model.note_id,
            content: model.content,
            author: model.author,
            created_at: model.created_at,
        }
    }
}
