//! # Incident Repository
//!
//! Upserts and status/service-filtered queries over the `incidents` table.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::error::RepositoryError;
use crate::models::incident::{ActiveModel, Column, Entity as IncidentEntity};
use crate::models::{Incident, IncidentStatus};

/// Upper bound on resolved-incident query results.
pub const RESOLVED_QUERY_LIMIT: u64 = 100;

const UPSERT_CHUNK_SIZE: usize = 50;
const ID_CHUNK_SIZE: usize = 500;

fn map_db_err(context: &'static str) -> impl Fn(sea_orm::DbErr) -> RepositoryError {
    move |err| {
        error!(error = %err, context, "Incident cache operation failed");
        RepositoryError::database_error(err)
    }
}

fn to_active_model(incident: Incident) -> ActiveModel {
    ActiveModel {
        incident_id: Set(incident.incident_id),
        incident_number: Set(incident.incident_number),
        title: Set(incident.title),
        service_id: Set(incident.service_id),
        service_summary: Set(incident.service_summary),
        status: Set(incident.status),
        html_url: Set(incident.html_url),
        urgency: Set(incident.urgency),
        alert_count: Set(incident.alert_count),
        created_at: Set(incident.created_at),
        updated_at: Set(incident.updated_at),
    }
}

fn upsert_conflict() -> OnConflict {
    OnConflict::column(Column::IncidentId)
        .update_columns([
            Column::IncidentNumber,
            Column::Title,
            Column::ServiceId,
            Column::ServiceSummary,
            Column::Status,
            Column::HtmlUrl,
            Column::Urgency,
            Column::AlertCount,
            Column::CreatedAt,
            Column::UpdatedAt,
        ])
        .to_owned()
}

async fn upsert_chunk<C: ConnectionTrait>(
    conn: &C,
    incidents: Vec<Incident>,
) -> Result<(), RepositoryError> {
    if incidents.is_empty() {
        return Ok(());
    }

    IncidentEntity::insert_many(incidents.into_iter().map(to_active_model))
        .on_conflict(upsert_conflict())
        .exec_without_returning(conn)
        .await
        .map_err(map_db_err("upsert incidents"))?;

    Ok(())
}

/// Collapse repeated ids so the last occurrence wins, keeping first-seen order.
fn last_write_wins(incidents: Vec<Incident>) -> Vec<Incident> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(incidents.len());
    let mut unique: Vec<Incident> = Vec::with_capacity(incidents.len());

    for incident in incidents {
        match positions.get(&incident.incident_id) {
            Some(&index) => unique[index] = incident,
            None => {
                positions.insert(incident.incident_id.clone(), unique.len());
                unique.push(incident);
            }
        }
    }

    unique
}

fn sort_open(incidents: &mut [Incident]) {
    incidents.sort_by(|a, b| {
        a.status
            .priority()
            .cmp(&b.status.priority())
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

/// Repository for the cached incident rows
#[derive(Clone)]
pub struct IncidentRepository {
    db: DatabaseConnection,
    gate: Arc<RwLock<()>>,
}

impl IncidentRepository {
    pub fn new(db: DatabaseConnection, gate: Arc<RwLock<()>>) -> Self {
        Self { db, gate }
    }

    /// Insert or replace a single incident keyed by `incident_id`.
    pub async fn upsert_incident(&self, incident: Incident) -> Result<(), RepositoryError> {
        let _guard = self.gate.write().await;
        upsert_chunk(&self.db, vec![incident]).await
    }

    /// Insert or replace a set of incidents as one transaction.
    ///
    /// Returns the number of distinct incidents written.
    pub async fn batch_upsert_incidents(
        &self,
        incidents: Vec<Incident>,
    ) -> Result<usize, RepositoryError> {
        let incidents = last_write_wins(incidents);
        if incidents.is_empty() {
            return Ok(0);
        }
        let written = incidents.len();

        let _guard = self.gate.write().await;
        let txn = self
            .db
            .begin()
            .await
            .map_err(map_db_err("begin batch upsert"))?;

        for chunk in incidents.chunks(UPSERT_CHUNK_SIZE) {
            upsert_chunk(&txn, chunk.to_vec()).await?;
        }

        txn.commit()
            .await
            .map_err(map_db_err("commit batch upsert"))?;

        debug!(count = written, "Batch upserted incidents");
        Ok(written)
    }

    /// Open incidents, triggered before acknowledged, newest first within a status.
    pub async fn get_open_incidents(&self) -> Result<Vec<Incident>, RepositoryError> {
        self.open_incidents(None).await
    }

    /// Open incidents restricted to the given services.
    pub async fn get_open_incidents_by_services(
        &self,
        service_ids: &[String],
    ) -> Result<Vec<Incident>, RepositoryError> {
        if service_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.open_incidents(Some(service_ids)).await
    }

    async fn open_incidents(
        &self,
        service_ids: Option<&[String]>,
    ) -> Result<Vec<Incident>, RepositoryError> {
        let _guard = self.gate.read().await;

        let mut query = IncidentEntity::find().filter(Column::Status.is_in(IncidentStatus::OPEN));
        if let Some(ids) = service_ids {
            query = query.filter(Column::ServiceId.is_in(ids.iter().cloned()));
        }

        let mut incidents = query
            .order_by_desc(Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(map_db_err("query open incidents"))?;

        sort_open(&mut incidents);
        Ok(incidents)
    }

    /// Most recently updated resolved incidents, capped at [`RESOLVED_QUERY_LIMIT`].
    pub async fn get_resolved_incidents(&self) -> Result<Vec<Incident>, RepositoryError> {
        self.resolved_incidents(None).await
    }

    /// Resolved incidents for the given services; an empty service list matches nothing.
    pub async fn get_resolved_incidents_by_services(
        &self,
        service_ids: &[String],
    ) -> Result<Vec<Incident>, RepositoryError> {
        if service_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.resolved_incidents(Some(service_ids)).await
    }

    async fn resolved_incidents(
        &self,
        service_ids: Option<&[String]>,
    ) -> Result<Vec<Incident>, RepositoryError> {
        let _guard = self.gate.read().await;

        let mut query =
            IncidentEntity::find().filter(Column::Status.eq(IncidentStatus::Resolved));
        if let Some(ids) = service_ids {
            query = query.filter(Column::ServiceId.is_in(ids.iter().cloned()));
        }

        query
            .order_by_desc(Column::UpdatedAt)
            .order_by_desc(Column::IncidentId)
            .limit(RESOLVED_QUERY_LIMIT)
            .all(&self.db)
            .await
            .map_err(map_db_err("query resolved incidents"))
    }

    pub async fn get_incident(&self, incident_id: &str) -> Result<Option<Incident>, RepositoryError> {
        let _guard = self.gate.read().await;

        IncidentEntity::find_by_id(incident_id.to_string())
            .one(&self.db)
            .await
            .map_err(map_db_err("load incident"))
    }

    /// Current cached status for each of `incident_ids` that is present.
    pub async fn get_statuses(
        &self,
        incident_ids: &[String],
    ) -> Result<HashMap<String, IncidentStatus>, RepositoryError> {
        let _guard = self.gate.read().await;
        let mut statuses = HashMap::with_capacity(incident_ids.len());

        for chunk in incident_ids.chunks(ID_CHUNK_SIZE) {
            let rows: Vec<(String, IncidentStatus)> = IncidentEntity::find()
                .select_only()
                .column(Column::IncidentId)
                .column(Column::Status)
                .filter(Column::IncidentId.is_in(chunk.iter().cloned()))
                .into_tuple()
                .all(&self.db)
                .await
                .map_err(map_db_err("load incident statuses"))?;
            statuses.extend(rows);
        }

        Ok(statuses)
    }

    /// Mark as resolved every open row missing from `current_ids`.
    ///
    /// When `service_ids` is non-empty only rows of those services are
    /// considered. Returns the ids that were flipped.
    pub async fn remove_stale_open_incidents(
        &self,
        current_ids: &[String],
        service_ids: &[String],
    ) -> Result<Vec<String>, RepositoryError> {
        let _guard = self.gate.write().await;
        let txn = self
            .db
            .begin()
            .await
            .map_err(map_db_err("begin stale sweep"))?;

        let mut query: sea_orm::Select<IncidentEntity> =
            IncidentEntity::find().filter(Column::Status.is_in(IncidentStatus::OPEN));
        if !service_ids.is_empty() {
            query = query.filter(Column::ServiceId.is_in(service_ids.iter().cloned()));
        }

        let cached_open: Vec<String> = query
            .select_only()
            .column(Column::IncidentId)
            .into_tuple()
            .all(&txn)
            .await
            .map_err(map_db_err("load open incident ids"))?;

        let current: HashSet<&str> = current_ids.iter().map(String::as_str).collect();
        let stale: Vec<String> = cached_open
            .into_iter()
            .filter(|id| !current.contains(id.as_str()))
            .collect();

        if !stale.is_empty() {
            let now = Utc::now().fixed_offset();
            for chunk in stale.chunks(ID_CHUNK_SIZE) {
                IncidentEntity::update_many()
                    .col_expr(Column::Status, Expr::value(IncidentStatus::Resolved.as_str()))
                    .col_expr(Column::UpdatedAt, Expr::value(now))
                    .filter(Column::IncidentId.is_in(chunk.iter().cloned()))
                    .exec(&txn)
                    .await
                    .map_err(map_db_err("resolve stale incidents"))?;
            }
        }

        txn.commit()
            .await
            .map_err(map_db_err("commit stale sweep"))?;

        if !stale.is_empty() {
            debug!(count = stale.len(), "Resolved incidents missing from open fetch");
        }
        Ok(stale)
    }

    /// Delete every cached incident. Returns the number of rows removed.
    pub async fn clear_incidents(&self) -> Result<u64, RepositoryError> {
        let _guard = self.gate.write().await;

        let result = IncidentEntity::delete_many()
            .exec(&self.db)
            .await
            .map_err(map_db_err("clear incidents"))?;

        Ok(result.rows_affected)
    }
}
