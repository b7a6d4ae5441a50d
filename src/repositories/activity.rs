//! # Activity Repository
//!
//! Idempotent storage for raw provider activity keyed by `(user_id, source_id)`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::connectors::RawEvent;
use crate::models::raw_activity::{ActiveModel, Column, Entity, Model};

#[derive(Clone)]
pub struct ActivityRepository {
    db: Arc<DatabaseConnection>,
}

impl ActivityRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts the event unless `(user_id, source_id)` already exists.
    ///
    /// Returns `true` when a row was written.
    pub async fn upsert(&self, event: &RawEvent) -> Result<bool, DbErr> {
        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(event.user_id),
            provider: Set(event.provider),
            activity_type: Set(event.activity_type),
            occurred_at: Set(event.occurred_at.into()),
            duration_minutes: Set(event.duration_minutes),
            subject: Set(event.subject.clone()),
            description: Set(event.description.clone()),
            source_id: Set(event.source_id.clone()),
            metadata: Set(event.metadata.clone()),
            is_processed: Set(false),
            created_at: Set(Utc::now().into()),
        };

        let inserted = Entity::insert(row)
            .on_conflict(
                OnConflict::columns([Column::UserId, Column::SourceId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        Ok(inserted > 0)
    }

    /// Upserts in the given order; returns how many rows were new
    pub async fn upsert_all(&self, events: &[RawEvent]) -> Result<u64, DbErr> {
        let mut written = 0;
        for event in events {
            if self.upsert(event).await? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Subset of `source_ids` already stored for the user
    pub async fn existing_source_ids(
        &self,
        user_id: Uuid,
        source_ids: &[String],
    ) -> Result<HashSet<String>, DbErr> {
        if source_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let found: Vec<String> = Entity::find()
            .select_only()
            .column(Column::SourceId)
            .filter(Column::UserId.eq(user_id))
            .filter(Column::SourceId.is_in(source_ids.iter().cloned()))
            .into_tuple()
            .all(&*self.db)
            .await?;

        Ok(found.into_iter().collect())
    }

    /// Unprocessed activity for the user, newest first
    pub async fn list_unprocessed(&self, user_id: Uuid) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::IsProcessed.eq(false))
            .order_by_desc(Column::OccurredAt)
            .order_by_desc(Column::Id)
            .all(&*self.db)
            .await
    }

    /// Flips `is_processed` to true. Never resets it; returns whether this call flipped it.
    pub async fn mark_processed(&self, id: Uuid) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::IsProcessed, Expr::value(true))
            .filter(Column::Id.eq(id))
            .filter(Column::IsProcessed.eq(false))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(&*self.db).await
    }

    pub async fn count_for_user(&self, user_id: Uuid) -> Result<u64, DbErr> {
        use sea_orm::PaginatorTrait;

        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .count(&*self.db)
            .await
    }
}
