//! RawActivity entity model
//!
//! A normalized record of one external event (email sent, meeting held,
//! document edited). Rows are unique per `(user_id, source_id)` and are never
//! deleted by the pipeline; `is_processed` only ever flips from false to true.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

use super::provider::Provider;

/// Kind of captured activity; drives duration normalization
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
pub enum ActivityType {
    #[sea_orm(string_value = "email")]
    Email,
    #[sea_orm(string_value = "meeting")]
    Meeting,
    #[sea_orm(string_value = "document")]
    Document,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "raw_activities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    /// Connector that produced the activity
    pub provider: Provider,

    pub activity_type: ActivityType,

    /// Native sent / occurred / modified time
    pub occurred_at: DateTimeWithTimeZone,

    /// Raw duration before normalization; `None` when the provider has no such concept
    pub duration_minutes: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub subject: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Provider-defined identifier; dedup key together with `user_id`
    pub source_id: String,

    /// Opaque provider details (recipients, links, mime types)
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: JsonValue,

    pub is_processed: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(has_one = "super::suggested_entry::Entity")]
    SuggestedEntry,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::suggested_entry::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SuggestedEntry.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
