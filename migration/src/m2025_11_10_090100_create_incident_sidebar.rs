//! Migration to create the per-incident sidebar cache.
//!
//! Alerts and notes are replaced wholesale per incident; the metadata table
//! holds the snapshot used to decide when they must be refetched.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IncidentAlerts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IncidentAlerts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IncidentAlerts::IncidentId).text().not_null())
                    .col(ColumnDef::new(IncidentAlerts::AlertId).text().not_null())
                    .col(ColumnDef::new(IncidentAlerts::Summary).text().not_null())
                    .col(ColumnDef::new(IncidentAlerts::Status).text().not_null())
                    .col(ColumnDef::new(IncidentAlerts::Severity).text().null())
                    .col(
                        ColumnDef::new(IncidentAlerts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(IncidentAlerts::Body).json_binary().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incident_alerts_incident")
                    .table(IncidentAlerts::Table)
                    .col(IncidentAlerts::IncidentId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IncidentNotes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IncidentNotes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(IncidentNotes::IncidentId).text().not_null())
                    .col(ColumnDef::new(IncidentNotes::NoteId).text().not_null())
                    .col(ColumnDef::new(IncidentNotes::Content).text().not_null())
                    .col(ColumnDef::new(IncidentNotes::Author).text().null())
                    .col(
                        ColumnDef::new(IncidentNotes::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incident_notes_incident")
                    .table(IncidentNotes::Table)
                    .col(IncidentNotes::IncidentId)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(IncidentSidebarMetadata::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IncidentSidebarMetadata::IncidentId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IncidentSidebarMetadata::AlertsFetchedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IncidentSidebarMetadata::NotesFetchedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(IncidentSidebarMetadata::LastAlertCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(IncidentSidebarMetadata::LastUpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(IncidentSidebarMetadata::Table)
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(IncidentNotes::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(IncidentAlerts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum IncidentAlerts {
    Table,
    Id,
    IncidentId,
    AlertId,
    Summary,
    Status,
    Severity,
    CreatedAt,
    Body,
}

#[derive(DeriveIden)]
enum IncidentNotes {
    Table,
    Id,
    IncidentId,
    NoteId,
    Content,
    Author,
    CreatedAt,
}

#[derive(DeriveIden)]
enum IncidentSidebarMetadata {
    Table,
    IncidentId,
    AlertsFetchedAt,
    NotesFetchedAt,
    LastAlertCount,
    LastUpdatedAt,
}
