//! Migration to create the raw_activities table.
//!
//! The unique `(user_id, source_id)` index is the ingestion dedup key: every
//! connector poll upserts against it, so overlapping windows never produce a
//! second row for the same external event.

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
                    .table(RawActivities::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RawActivities::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RawActivities::UserId).uuid().not_null())
                    .col(ColumnDef::new(RawActivities::Provider).string().not_null())
                    .col(
                        ColumnDef::new(RawActivities::ActivityType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawActivities::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawActivities::DurationMinutes)
                            .integer()
                            .null(),
                    )
                    .col(ColumnDef::new(RawActivities::Subject).text().null())
                    .col(ColumnDef::new(RawActivities::Description).text().null())
                    .col(ColumnDef::new(RawActivities::SourceId).string().not_null())
                    .col(
                        ColumnDef::new(RawActivities::Metadata)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RawActivities::IsProcessed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RawActivities::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_raw_activities_user_id")
                            .from(RawActivities::Table, RawActivities::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_raw_activities_user_source")
                    .table(RawActivities::Table)
                    .col(RawActivities::UserId)
                    .col(RawActivities::SourceId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Working-set scan for the suggestion engine
        manager
            .create_index(
                Index::create()
                    .name("idx_raw_activities_user_processed_occurred")
                    .table(RawActivities::Table)
                    .col(RawActivities::UserId)
                    .col(RawActivities::IsProcessed)
                    .col(RawActivities::OccurredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_raw_activities_user_processed_occurred")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("uq_raw_activities_user_source")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(RawActivities::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub(crate) enum RawActivities {
    Table,
    Id,
    UserId,
    Provider,
    ActivityType,
    OccurredAt,
    DurationMinutes,
    Subject,
    Description,
    SourceId,
    Metadata,
    IsProcessed,
    CreatedAt,
}
