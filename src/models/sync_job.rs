//! SyncJob entity model
//!
//! This module contains the SeaORM entity model for the sync_jobs table,
//! which records each per-user sync run from enqueue to completion.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

/// Which trigger enqueued the job
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Hourly fan-out over all active users
    #[sea_orm(string_value = "periodic")]
    Periodic,
    /// User-initiated "sync now"
    #[sea_orm(string_value = "manual")]
    Manual,
}

/// Run state of a sync job.
///
/// `Queued -> Running -> Succeeded | PartiallyFailed`. A run that exceeds the
/// wall-clock budget is marked `Abandoned`; the next periodic cycle enqueues
/// the user again.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    #[sea_orm(string_value = "queued")]
    Queued,
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "partially_failed")]
    PartiallyFailed,
    #[sea_orm(string_value = "abandoned")]
    Abandoned,
}

impl SyncJobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncJobStatus::Queued => "queued",
            SyncJobStatus::Running => "running",
            SyncJobStatus::Succeeded => "succeeded",
            SyncJobStatus::PartiallyFailed => "partially_failed",
            SyncJobStatus::Abandoned => "abandoned",
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub trigger_kind: SyncTrigger,

    pub status: SyncJobStatus,

    /// Provider slugs whose connector errored during the run
    #[sea_orm(column_type = "JsonBinary")]
    pub failed_providers: Option<JsonValue>,

    /// Per-provider error kinds and messages, keyed by provider slug
    #[sea_orm(column_type = "JsonBinary")]
    pub error: Option<JsonValue>,

    /// New raw activity rows written by this run
    pub activities_ingested: i32,

    /// Suggested entries created by the engine step of this run
    pub suggestions_created: i32,

    pub scheduled_at: DateTimeWithTimeZone,

    pub started_at: Option<DateTimeWithTimeZone>,

    pub finished_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
