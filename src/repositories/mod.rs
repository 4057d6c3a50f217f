//! # Repository Layer
//!
//! The local incident cache. Both repositories share one read/write gate:
//! queries hold it shared, writes hold it exclusively, and every multi-statement
//! write runs in a single transaction.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tokio::sync::RwLock;

pub mod incident;
pub mod sidebar;

pub use incident::IncidentRepository;
pub use sidebar::{SidebarRepository, SidebarSnapshot};

/// Shared handle to the incident cache tables.
#[derive(Clone)]
pub struct CacheStore {
    pub incidents: IncidentRepository,
    pub sidebar: SidebarRepository,
}

impl CacheStore {
    pub fn new(db: DatabaseConnection) -> Self {
        let gate = Arc::new(RwLock::new(()));
        Self {
            incidents: IncidentRepository::new(db.clone(), gate.clone()),
            sidebar: SidebarRepository::new(db, gate),
        }
    }
}
