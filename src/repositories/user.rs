//! # User Repository
//!
//! Read access to the user directory owned by the authentication collaborator.

use std::sync::Arc;

use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use uuid::Uuid;

use crate::models::user::{Column, Entity, Model};

#[derive(Clone)]
pub struct UserRepository {
    db: Arc<DatabaseConnection>,
}

impl UserRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Ids of users the periodic sync fans out over
    pub async fn list_active_ids(&self) -> Result<Vec<Uuid>, DbErr> {
        Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::IsActive.eq(true))
            .order_by_asc(Column::Id)
            .into_tuple()
            .all(&*self.db)
            .await
    }

    pub async fn find(&self, user_id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(user_id).one(&*self.db).await
    }
}
