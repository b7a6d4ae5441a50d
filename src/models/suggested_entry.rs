//! SuggestedEntry entity model
//!
//! A draft billable time entry proposed from exactly one raw activity, plus the
//! approval state machine downstream billing drives it through.

use std::fmt;

use chrono::NaiveDate;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Approval state of a suggested entry.
///
/// `Suggested` is the only initial state. Allowed moves are
/// `Suggested -> Approved | Rejected` and `Approved -> Billed`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[sea_orm(string_value = "suggested")]
    Suggested,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "billed")]
    Billed,
}

impl EntryStatus {
    pub fn can_transition_to(self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (EntryStatus::Suggested, EntryStatus::Approved)
                | (EntryStatus::Suggested, EntryStatus::Rejected)
                | (EntryStatus::Approved, EntryStatus::Billed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntryStatus::Suggested => "suggested",
            EntryStatus::Approved => "approved",
            EntryStatus::Rejected => "rejected",
            EntryStatus::Billed => "billed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred kind of legal work
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
pub enum TaskCategory {
    #[sea_orm(string_value = "Research")]
    Research,
    #[sea_orm(string_value = "Communication")]
    Communication,
    #[sea_orm(string_value = "Drafting")]
    Drafting,
    #[sea_orm(string_value = "Court")]
    Court,
    #[sea_orm(string_value = "Client Conference")]
    #[serde(rename = "Client Conference")]
    ClientConference,
    #[sea_orm(string_value = "Administrative")]
    Administrative,
    #[sea_orm(string_value = "General")]
    General,
}

impl TaskCategory {
    pub fn label(self) -> &'static str {
        match self {
            TaskCategory::Research => "Research",
            TaskCategory::Communication => "Communication",
            TaskCategory::Drafting => "Drafting",
            TaskCategory::Court => "Court",
            TaskCategory::ClientConference => "Client Conference",
            TaskCategory::Administrative => "Administrative",
            TaskCategory::General => "General",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "suggested_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    /// Raw activity this entry was derived from (unique)
    #[sea_orm(unique)]
    pub source_activity_id: Uuid,

    /// Matched engagement; `None` when no engagement scored at least 2
    pub engagement_id: Option<Uuid>,

    /// Calendar day the work is attributed to
    pub entry_date: NaiveDate,

    /// Exact activity time, used to order entries within a day
    pub activity_at: DateTimeWithTimeZone,

    /// Normalized duration, always positive
    pub duration_minutes: i32,

    #[sea_orm(column_type = "Text")]
    pub description: String,

    pub task_category: TaskCategory,

    pub status: EntryStatus,

    /// Rate copied from the matched engagement at suggestion time, 0 when unmatched
    pub hourly_rate_cents: i64,

    /// `duration / 60 * rate` rounded to the nearest cent, 0 when unmatched
    pub amount_cents: i64,

    /// Winning engagement score, kept for review UIs
    pub match_score: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::raw_activity::Entity",
        from = "Column::SourceActivityId",
        to = "super::raw_activity::Column::Id"
    )]
    RawActivity,
    #[sea_orm(
        belongs_to = "super::engagement::Entity",
        from = "Column::EngagementId",
        to = "super::engagement::Column::Id"
    )]
    Engagement,
}

impl Related<super::raw_activity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawActivity.def()
    }
}

impl Related<super::engagement::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Engagement.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
