//! Migration to create the sync_jobs table.
//!
//! Each row is one per-user sync run enqueued by the periodic or manual trigger
//! and drained by the worker pool.

use sea_orm_migration::prelude::*;

use crate::m2026_09_01_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncJobs::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(SyncJobs::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(SyncJobs::UserId).uuid().not_null())
                    .col(ColumnDef::new(SyncJobs::TriggerKind).string().not_null())
                    .col(
                        ColumnDef::new(SyncJobs::Status)
                            .string()
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::FailedProviders)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(SyncJobs::Error).json_binary().null())
                    .col(
                        ColumnDef::new(SyncJobs::ActivitiesIngested)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::SuggestionsCreated)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SyncJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_sync_jobs_user_id")
                            .from(SyncJobs::Table, SyncJobs::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Picking the next ready job
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_status_scheduled")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::Status)
                    .col(SyncJobs::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        // Per-user job history
        manager
            .create_index(
                Index::create()
                    .name("idx_sync_jobs_user_created")
                    .table(SyncJobs::Table)
                    .col(SyncJobs::UserId)
                    .col(SyncJobs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_sync_jobs_user_created").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_sync_jobs_status_scheduled")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(SyncJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SyncJobs {
    Table,
    Id,
    UserId,
    TriggerKind,
    Status,
    FailedProviders,
    Error,
    ActivitiesIngested,
    SuggestionsCreated,
    ScheduledAt,
    StartedAt,
    FinishedAt,
    CreatedAt,
    UpdatedAt,
}
