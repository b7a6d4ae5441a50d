//! Credential entity model
//!
//! Encrypted OAuth token pair for one `(user_id, provider)`. Only the token
//! vault reads or writes these columns; the ciphertext layout is described in
//! [`crate::crypto`].

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use super::provider::Provider;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "credentials")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub user_id: Uuid,

    pub provider: Provider,

    /// AES-GCM ciphertext of the access token
    pub access_token_ciphertext: Vec<u8>,

    /// AES-GCM ciphertext of the refresh token, when the provider issued one
    pub refresh_token_ciphertext: Option<Vec<u8>>,

    /// Access token expiry reported by the provider
    pub expires_at: Option<DateTimeWithTimeZone>,

    /// Granted scopes as a JSON array of strings
    #[sea_orm(column_type = "JsonBinary")]
    pub scopes: Option<JsonValue>,

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
