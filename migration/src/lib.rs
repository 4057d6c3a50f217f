//! Database migrations for the incident cache.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_11_10_090000_create_incidents;
mod m2025_11_10_090100_create_incident_sidebar;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_11_10_090000_create_incidents::Migration),
            Box::new(m2025_11_10_090100_create_incident_sidebar::Migration),
        ]
    }
}
