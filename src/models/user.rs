//! User entity model
//!
//! Users are provisioned by the authentication collaborator. The pipeline only
//! reads them: the periodic sync trigger fans out over `is_active` users.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(unique)]
    pub email: String,

    pub display_name: Option<String>,

    /// Inactive users are skipped by the periodic trigger
    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::credential::Entity")]
    Credential,
    #[sea_orm(has_many = "super::raw_activity::Entity")]
    RawActivity,
}

impl Related<super::credential::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Credential.def()
    }
}

impl Related<super::raw_activity::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RawActivity.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
