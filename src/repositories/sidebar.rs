//! # Sidebar Repository
//!
//! Per-incident alert/note cache with the metadata snapshot that decides
//! when it must be refetched.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::error::RepositoryError;
use crate::models::{
    SidebarAlert, SidebarMetadata, SidebarNote, incident, incident_alert, incident_note,
    sidebar_metadata,
};

const ID_CHUNK_SIZE: usize = 500;

fn map_db_err(context: &'static str) -> impl Fn(sea_orm::DbErr) -> RepositoryError {
    move |err| {
        error!(error = %err, context, "Sidebar cache operation failed");
        RepositoryError::database_error(err)
    }
}

/// Cached sidebar content for one incident
#[derive(Debug, Clone, PartialEq)]
pub struct SidebarSnapshot {
    pub alerts: Vec<SidebarAlert>,
    pub notes: Vec<SidebarNote>,
    pub metadata: Option<SidebarMetadata>,
}

async fn replace_alerts<C: ConnectionTrait>(
    conn: &C,
    incident_id: &str,
    alerts: Vec<SidebarAlert>,
) -> Result<(), RepositoryError> {
    incident_alert::Entity::delete_many()
        .filter(incident_alert::Column::IncidentId.eq(incident_id))
        .exec(conn)
        .await
        .map_err(map_db_err("delete incident alerts"))?;

    if alerts.is_empty() {
        return Ok(());
    }

    let rows = alerts.into_iter().map(|alert| incident_alert::ActiveModel {
        id: NotSet,
        incident_id: Set(incident_id.to_string()),
        alert_id: Set(alert.alert_id),
        summary: Set(alert.summary),
        status: Set(alert.status),
        severity: Set(alert.severity),
        created_at: Set(alert.created_at),
        body: Set(alert.body),
    });

    incident_alert::Entity::insert_many(rows)
        .exec_without_returning(conn)
        .await
        .map_err(map_db_err("insert incident alerts"))?;

    Ok(())
}

async fn replace_notes<C: ConnectionTrait>(
    conn: &C,
    incident_id: &str,
    notes: Vec<SidebarNote>,
) -> Result<(), RepositoryError> {
    incident_note::Entity::delete_many()
        .filter(incident_note::Column::IncidentId.eq(incident_id))
        .exec(conn)
        .await
        .map_err(map_db_err("delete incident notes"))?;

    if notes.is_empty() {
        return Ok(());
    }

    let rows = notes.into_iter().map(|note| incident_note::ActiveModel {
        id: NotSet,
        incident_id: Set(incident_id.to_string()),
        note_id: Set(note.note_id),
        content: Set(note.content),
        author: Set(note.author),
        created_at: Set(note.created_at),
    });

    incident_note::Entity::insert_many(rows)
        .exec_without_returning(conn)
        .await
        .map_err(map_db_err("insert incident notes"))?;

    Ok(())
}

async fn upsert_metadata<C: ConnectionTrait>(
    conn: &C,
    metadata: SidebarMetadata,
) -> Result<(), RepositoryError> {
    let row = sidebar_metadata::ActiveModel {
        incident_id: Set(metadata.incident_id),
        alerts_fetched_at: Set(metadata.alerts_fetched_at),
        notes_fetched_at: Set(metadata.notes_fetched_at),
        last_alert_count: Set(metadata.last_alert_count),
        last_updated_at: Set(metadata.last_updated_at),
    };

    sidebar_metadata::Entity::insert(row)
        .on_conflict(
            OnConflict::column(sidebar_metadata::Column::IncidentId)
                .update_columns([
                    sidebar_metadata::Column::AlertsFetchedAt,
                    sidebar_metadata::Column::NotesFetchedAt,
                    sidebar_metadata::Column::LastAlertCount,
                    sidebar_metadata::Column::LastUpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await
        .map_err(map_db_err("upsert sidebar metadata"))?;

    Ok(())
}

/// Repository for the sidebar tables
#[derive(Clone)]
pub struct SidebarRepository {
    db: DatabaseConnection,
    gate: Arc<RwLock<()>>,
}

impl SidebarRepository {
    pub fn new(db: DatabaseConnection, gate: Arc<RwLock<()>>) -> Self {
        Self { db, gate }
    }

    /// `None` means the sidebar was never fetched for this incident.
    pub async fn get_sidebar_metadata(
        &self,
        incident_id: &str,
    ) -> Result<Option<SidebarMetadata>, RepositoryError> {
        let _guard = self.gate.read().await;

        sidebar_metadata::Entity::find_by_id(incident_id.to_string())
            .one(&self.db)
            .await
            .map_err(map_db_err("load sidebar metadata"))
    }

    pub async fn update_sidebar_metadata(
        &self,
        metadata: SidebarMetadata,
    ) -> Result<(), RepositoryError> {
        let _guard = self.gate.write().await;
        upsert_metadata(&self.db, metadata).await
    }

    /// Replace every cached alert of `incident_id` with `alerts`.
    pub async fn store_incident_alerts(
        &self,
        incident_id: &str,
        alerts: Vec<SidebarAlert>,
    ) -> Result<(), RepositoryError> {
        let _guard = self.gate.write().await;
        let txn = self
            .db
            .begin()
            .await
            .map_err(map_db_err("begin alert replace"))?;

        replace_alerts(&txn, incident_id, alerts).await?;

        txn.commit()
            .await
            .map_err(map_db_err("commit alert replace"))
    }

    /// Replace every cached note of `incident_id` with `notes`.
    pub async fn store_incident_notes(
        &self,
        incident_id: &str,
        notes: Vec<SidebarNote>,
    ) -> Result<(), RepositoryError> {
        let _guard = self.gate.write().await;
        let txn = self
            .db
            .begin()
            .await
            .map_err(map_db_err("begin note replace"))?;

        replace_notes(&txn, incident_id, notes).await?;

        txn.commit()
            .await
            .map_err(map_db_err("commit note replace"))
    }

    /// Replace alerts, notes and metadata of one incident in a single transaction.
    pub async fn replace_sidebar(
        &self,
        incident_id: &str,
        alerts: Vec<SidebarAlert>,
        notes: Vec<SidebarNote>,
        metadata: SidebarMetadata,
    ) -> Result<(), RepositoryError> {
        let _guard = self.gate.write().await;
        let txn = self
            .db
            .begin()
            .await
            .map_err(map_db_err("begin sidebar replace"))?;

        replace_alerts(&txn, incident_id, alerts).await?;
        replace_notes(&txn, incident_id, notes).await?;
        upsert_metadata(&txn, metadata).await?;

        txn.commit()
            .await
            .map_err(map_db_err("commit sidebar replace"))
    }

    pub async fn get_incident_alerts(
        &self,
        incident_id: &str,
    ) -> Result<Vec<SidebarAlert>, RepositoryError> {
        let _guard = self.gate.read().await;
        self.alerts_for(incident_id).await
    }

    pub async fn get_incident_notes(
        &self,
        incident_id: &str,
    ) -> Result<Vec<SidebarNote>, RepositoryError> {
        let _guard = self.gate.read().await;
        self.notes_for(incident_id).await
    }

    /// Alerts, notes and metadata read under one shared guard.
    pub async fn get_sidebar(&self, incident_id: &str) -> Result<SidebarSnapshot, RepositoryError> {
        let _guard = self.gate.read().await;

        let metadata = sidebar_metadata::Entity::find_by_id(incident_id.to_string())
            .one(&self.db)
            .await
            .map_err(map_db_err("load sidebar metadata"))?;

        Ok(SidebarSnapshot {
            alerts: self.alerts_for(incident_id).await?,
            notes: self.notes_for(incident_id).await?,
            metadata,
        })
    }

    async fn alerts_for(&self, incident_id: &str) -> Result<Vec<SidebarAlert>, RepositoryError> {
        let rows = incident_alert::Entity::find()
            .filter(incident_alert::Column::IncidentId.eq(incident_id))
            .order_by_desc(incident_alert::Column::CreatedAt)
            .order_by_asc(incident_alert::Column::Id)
            .all(&self.db)
            .await
            .map_err(map_db_err("load incident alerts"))?;

        Ok(rows.into_iter().map(SidebarAlert::from).collect())
    }

    async fn notes_for(&self, incident_id: &str) -> Result<Vec<SidebarNote>, RepositoryError> {
        let rows = incident_note::Entity::find()
            .filter(incident_note::Column::IncidentId.eq(incident_id))
            .order_by_desc(incident_note::Column::CreatedAt)
            .order_by_asc(incident_note::Column::Id)
            .all(&self.db)
            .await
            .map_err(map_db_err("load incident notes"))?;

        Ok(rows.into_iter().map(SidebarNote::from).collect())
    }

    /// Drop sidebar data whose incident was last updated before `cutoff` or is
    /// no longer cached. Returns the number of incidents purged.
    pub async fn purge_stale_sidebar_data(
        &self,
        cutoff: DateTimeWithTimeZone,
    ) -> Result<usize, RepositoryError> {
        let _guard = self.gate.write().await;
        let txn = self
            .db
            .begin()
            .await
            .map_err(map_db_err("begin sidebar purge"))?;

        let mut owners: BTreeSet<String> = BTreeSet::new();

        let metadata_ids: Vec<String> = sidebar_metadata::Entity::find()
            .select_only()
            .column(sidebar_metadata::Column::IncidentId)
            .into_tuple()
            .all(&txn)
            .await
            .map_err(map_db_err("list sidebar metadata"))?;
        owners.extend(metadata_ids);

        let alert_ids: Vec<String> = incident_alert::Entity::find()
            .select_only()
            .column(incident_alert::Column::IncidentId)
            .distinct()
            .into_tuple()
            .all(&txn)
            .await
            .map_err(map_db_err("list alert owners"))?;
        owners.extend(alert_ids);

        let note_ids: Vec<String> = incident_note::Entity::find()
            .select_only()
            .column(incident_note::Column::IncidentId)
            .distinct()
            .into_tuple()
            .all(&txn)
            .await
            .map_err(map_db_err("list note owners"))?;
        owners.extend(note_ids);

        let owners: Vec<String> = owners.into_iter().collect();
        let mut last_updated: HashMap<String, DateTimeWithTimeZone> = HashMap::new();
        for chunk in owners.chunks(ID_CHUNK_SIZE) {
            let rows: Vec<(String, DateTimeWithTimeZone)> = incident::Entity::find()
                .select_only()
                .column(incident::Column::IncidentId)
                .column(incident::Column::UpdatedAt)
                .filter(incident::Column::IncidentId.is_in(chunk.iter().cloned()))
                .into_tuple()
                .all(&txn)
                .await
                .map_err(map_db_err("load incident freshness"))?;
            last_updated.extend(rows);
        }

        let stale: Vec<String> = owners
            .into_iter()
            .filter(|id| match last_updated.get(id) {
                Some(updated_at) => *updated_at < cutoff,
                None => true,
            })
            .collect();

        for chunk in stale.chunks(ID_CHUNK_SIZE) {
            incident_alert::Entity::delete_many()
                .filter(incident_alert::Column::IncidentId.is_in(chunk.iter().cloned()))
                .exec(&txn)
                .await
                .map_err(map_db_err("purge incident alerts"))?;
            incident_note::Entity::delete_many()
                .filter(incident_note::Column::IncidentId.is_in(chunk.iter().cloned()))
                .exec(&txn)
                .await
                .map_err(map_db_err("purge incident notes"))?;
            sidebar_metadata::Entity::delete_many()
                .filter(sidebar_metadata::Column::IncidentId.is_in(chunk.iter().cloned()))
                .exec(&txn)
                .await
                .map_err(map_db_err("purge sidebar metadata"))?;
        }

        txn.commit()
            .await
            .map_err(map_db_err("commit sidebar purge"))?;

        if !stale.is_empty() {
            debug!(count = stale.len(), "Purged stale sidebar data");
        }
        Ok(stale.len())
    }
}
