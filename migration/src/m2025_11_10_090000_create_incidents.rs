//! Migration to create the incidents table.
//!
//! One row per remote incident, keyed by the remote identifier and queried by
//! status, service and timestamps.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Incidents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Incidents::IncidentId)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Incidents::IncidentNumber)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Incidents::Title).text().not_null())
                    .col(ColumnDef::new(Incidents::ServiceId).text().not_null())
                    .col(ColumnDef::new(Incidents::ServiceSummary).text().not_null())
                    .col(ColumnDef::new(Incidents::Status).text().not_null())
                    .col(ColumnDef::new(Incidents::HtmlUrl).text().not_null())
                    .col(ColumnDef::new(Incidents::Urgency).text().not_null())
                    .col(
                        ColumnDef::new(Incidents::AlertCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Incidents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Incidents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_status_created")
                    .table(Incidents::Table)
                    .col(Incidents::Status)
                    .col(Incidents::CreatedAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_service_status")
                    .table(Incidents::Table)
                    .col(Incidents::ServiceId)
                    .col(Incidents::Status)
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_incidents_service_status").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_incidents_status_created").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Incidents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Incidents {
    Table,
    IncidentId,
    IncidentNumber,
    Title,
    ServiceId,
    ServiceSummary,
    Status,
    HtmlUrl,
    Urgency,
    AlertCount,
    CreatedAt,
    UpdatedAt,
}
