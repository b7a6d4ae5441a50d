//! # Suggestion Repository
//!
//! Persistence for suggested time entries and their approval lifecycle.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use thiserror::Error;
use uuid::Uuid;

use crate::db::is_unique_violation;
use crate::models::raw_activity::{Column as ActivityColumn, Entity as RawActivity};
use crate::models::suggested_entry::{ActiveModel, Column, Entity, Model};
use crate::models::{EntryStatus, TaskCategory};

/// Default page for suggestion listings
pub const DEFAULT_LIST_LIMIT: u64 = 200;

/// Values computed by the engine for one activity
#[derive(Debug, Clone, PartialEq)]
pub struct NewSuggestion {
    pub user_id: Uuid,
    pub source_activity_id: Uuid,
    pub engagement_id: Option<Uuid>,
    pub entry_date: NaiveDate,
    pub activity_at: DateTime<Utc>,
    pub duration_minutes: i32,
    pub description: String,
    pub task_category: TaskCategory,
    pub hourly_rate_cents: i64,
    pub amount_cents: i64,
    pub match_score: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(Model),
    /// An entry for the activity already existed; the activity is marked processed
    AlreadyExists,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("suggested entry {0} not found")]
    NotFound(Uuid),

    #[error("cannot move entry from {from} to {to}")]
    InvalidTransition { from: EntryStatus, to: EntryStatus },

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

impl LifecycleError {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::NotFound(_) => "not_found",
            LifecycleError::InvalidTransition { .. } => "validation_failure",
            LifecycleError::Database(_) => "database",
        }
    }
}

#[derive(Clone)]
pub struct SuggestionRepository {
    db: Arc<DatabaseConnection>,
}

impl SuggestionRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Writes the entry and flips the source activity's processed flag in one
    /// transaction, after checking no entry exists for the activity yet. The
    /// unique index on `source_activity_id` catches a concurrent writer.
    pub async fn create_for_activity(&self, new: NewSuggestion) -> Result<CreateOutcome, DbErr> {
        let txn = self.db.begin().await?;

        let existing = Entity::find()
            .select_only()
            .column(Column::Id)
            .filter(Column::SourceActivityId.eq(new.source_activity_id))
            .into_tuple::<Uuid>()
            .one(&txn)
            .await?;

        if existing.is_some() {
            mark_activity_processed(&txn, new.source_activity_id).await?;
            txn.commit().await?;
            return Ok(CreateOutcome::AlreadyExists);
        }

        let now = Utc::now();
        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(new.user_id),
            source_activity_id: Set(new.source_activity_id),
            engagement_id: Set(new.engagement_id),
            entry_date: Set(new.entry_date),
            activity_at: Set(new.activity_at.into()),
            duration_minutes: Set(new.duration_minutes),
            description: Set(new.description),
            task_category: Set(new.task_category),
            status: Set(EntryStatus::Suggested),
            hourly_rate_cents: Set(new.hourly_rate_cents),
            amount_cents: Set(new.amount_cents),
            match_score: Set(new.match_score),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        let created = match row.insert(&txn).await {
            Ok(model) => model,
            Err(err) if is_unique_violation(&err) => {
                txn.rollback().await?;
                tracing::debug!(
                    activity_id = %new.source_activity_id,
                    "Suggested entry written concurrently"
                );
                return Ok(CreateOutcome::AlreadyExists);
            }
            Err(err) => return Err(err),
        };

        mark_activity_processed(&txn, new.source_activity_id).await?;
        txn.commit().await?;

        Ok(CreateOutcome::Created(created))
    }

    /// Entries in `status` ordered by date, most recent first
    pub async fn list(
        &self,
        user_id: Uuid,
        status: EntryStatus,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.eq(status))
            .order_by_desc(Column::EntryDate)
            .order_by_desc(Column::ActivityAt)
            .limit(limit)
            .all(&*self.db)
            .await
    }

    /// Moves an entry along the lifecycle.
    ///
    /// The update is conditional on the status read, so two racing callers
    /// cannot both apply a transition from the same state.
    pub async fn transition(
        &self,
        user_id: Uuid,
        id: Uuid,
        next: EntryStatus,
    ) -> Result<Model, LifecycleError> {
        let current = Entity::find_by_id(id)
            .filter(Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or(LifecycleError::NotFound(id))?;

        if !current.status.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(next))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.eq(current.status))
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            let latest = Entity::find_by_id(id)
                .one(&*self.db)
                .await?
                .ok_or(LifecycleError::NotFound(id))?;
            return Err(LifecycleError::InvalidTransition {
                from: latest.status,
                to: next,
            });
        }

        tracing::info!(%user_id, entry_id = %id, from = %current.status, to = %next, "Suggested entry transitioned");

        Entity::find_by_id(id)
            .one(&*self.db)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }
}

async fn mark_activity_processed<C: sea_orm::ConnectionTrait>(
    conn: &C,
    activity_id: Uuid,
) -> Result<(), DbErr> {
    RawActivity::update_many()
        .col_expr(ActivityColumn::IsProcessed, Expr::value(true))
        .filter(ActivityColumn::Id.eq(activity_id))
        .filter(ActivityColumn::IsProcessed.eq(false))
        .exec(conn)
        .await?;
    Ok(())
}
