//! Migration to create the suggested_entries table.
//!
//! `source_activity_id` is unique: a raw activity yields at most one suggested
//! entry even if two engine runs race on the same working set.

use sea_orm_migration::prelude::*;

use crate::m2026_09_01_000001_create_users::Users;
use crate::m2026_09_01_000004_create_clients_and_engagements::Engagements;
use crate::m2026_09_01_000005_create_raw_activities::RawActivities;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SuggestedEntries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SuggestedEntries::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SuggestedEntries::UserId).uuid().not_null())
                    .col(
                        ColumnDef::new(SuggestedEntries::SourceActivityId)
                            .uuid()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SuggestedEntries::EngagementId).uuid().null())
                    .col(ColumnDef::new(SuggestedEntries::EntryDate).date().not_null())
                    .col(
                        ColumnDef::new(SuggestedEntries::ActivityAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::DurationMinutes)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::Description)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::TaskCategory)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::Status)
                            .string()
                            .not_null()
                            .default("suggested"),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::HourlyRateCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::AmountCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::MatchScore)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(SuggestedEntries::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_suggested_entries_user_id")
                            .from(SuggestedEntries::Table, SuggestedEntries::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_suggested_entries_source_activity_id")
                            .from(SuggestedEntries::Table, SuggestedEntries::SourceActivityId)
                            .to(RawActivities::Table, RawActivities::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_suggested_entries_engagement_id")
                            .from(SuggestedEntries::Table, SuggestedEntries::EngagementId)
                            .to(Engagements::Table, Engagements::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_suggested_entries_source_activity")
                    .table(SuggestedEntries::Table)
                    .col(SuggestedEntries::SourceActivityId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_suggested_entries_user_status_date")
                    .table(SuggestedEntries::Table)
                    .col(SuggestedEntries::UserId)
                    .col(SuggestedEntries::Status)
                    .col(SuggestedEntries::EntryDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_suggested_entries_user_status_date")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("uq_suggested_entries_source_activity")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(SuggestedEntries::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum SuggestedEntries {
    Table,
    Id,
    UserId,
    SourceActivityId,
    EngagementId,
    EntryDate,
    ActivityAt,
    DurationMinutes,
    Description,
    TaskCategory,
    Status,
    HourlyRateCents,
    AmountCents,
    MatchScore,
    CreatedAt,
    UpdatedAt,
}
