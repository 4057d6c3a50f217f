//! # Data Models
//!
//! SeaORM entities for the local incident cache plus small API-facing types.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod incident;
pub mod incident_alert;
pub mod incident_note;
pub mod sidebar_metadata;

pub use incident::{
    Entity as IncidentEntity, IncidentResponse, IncidentStatus, Model as Incident, Urgency,
};
pub use incident_alert::SidebarAlert;
pub use incident_note::SidebarNote;
pub use sidebar_metadata::Model as SidebarMetadata;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "incident-monitor".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
