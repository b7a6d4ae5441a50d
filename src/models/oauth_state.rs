//! # OAuth State Model
//!
//! CSRF state tokens issued with provider authorization URLs.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use super::provider::Provider;

/// OAuth state issued for one user's consent flow with one provider
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// User that requested the authorization URL
    pub user_id: Uuid,

    pub provider: Provider,

    /// Opaque random state echoed back by the provider
    #[sea_orm(unique)]
    pub state: String,

    pub expires_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
