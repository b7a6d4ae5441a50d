//! # SyncJob Repository
//!
//! The durable sync queue: periodic and manual triggers insert `queued` rows,
//! workers claim them one at a time and record the outcome.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::models::Provider;
use crate::models::sync_job::{ActiveModel, Column, Entity, Model, SyncJobStatus, SyncTrigger};

/// One connector failure as recorded on the job row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderFailure {
    pub kind: String,
    pub message: String,
}

/// Key in the `error` column listing providers skipped as not connected
pub const NOT_CONNECTED_KEY: &str = "not_connected";

/// Final state of a job run
#[derive(Debug, Clone, PartialEq)]
pub struct JobCompletion {
    pub status: SyncJobStatus,
    pub failed_providers: Vec<Provider>,
    pub errors: BTreeMap<Provider, ProviderFailure>,
    /// Providers without a credential; not failures
    pub skipped_providers: Vec<Provider>,
    pub activities_ingested: u64,
    pub suggestions_created: u64,
}

#[derive(Clone)]
pub struct SyncJobRepository {
    db: Arc<DatabaseConnection>,
}

impl SyncJobRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn enqueue(
        &self,
        user_id: Uuid,
        trigger: SyncTrigger,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();

        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            trigger_kind: Set(trigger),
            status: Set(SyncJobStatus::Queued),
            failed_providers: Set(None),
            error: Set(None),
            activities_ingested: Set(0),
            suggestions_created: Set(0),
            scheduled_at: Set(scheduled_at.into()),
            started_at: Set(None),
            finished_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        tracing::info!(
            user_id = %user_id,
            job_id = %job.id,
            trigger = ?trigger,
            "Sync job enqueued"
        );

        Ok(job)
    }

    /// Claims the oldest due job by flipping it from `queued` to `running`.
    ///
    /// The flip is conditional on the row still being queued, so concurrent
    /// workers never both claim a job; the loser moves on to the next one.
    pub async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Model>, DbErr> {
        let now_tz: DateTimeWithTimeZone = now.into();

        loop {
            let candidate = Entity::find()
                .select_only()
                .column(Column::Id)
                .filter(Column::Status.eq(SyncJobStatus::Queued))
                .filter(Column::ScheduledAt.lte(now_tz))
                .order_by_asc(Column::ScheduledAt)
                .order_by_asc(Column::CreatedAt)
                .into_tuple::<Uuid>()
                .one(&*self.db)
                .await?;

            let Some(job_id) = candidate else {
                return Ok(None);
            };

            let claimed = Entity::update_many()
                .col_expr(Column::Status, Expr::value(SyncJobStatus::Running))
                .col_expr(Column::StartedAt, Expr::value(now_tz))
                .col_expr(Column::UpdatedAt, Expr::value(now_tz))
                .filter(Column::Id.eq(job_id))
                .filter(Column::Status.eq(SyncJobStatus::Queued))
                .exec(&*self.db)
                .await?;

            if claimed.rows_affected == 1 {
                return Entity::find_by_id(job_id).one(&*self.db).await;
            }
        }
    }

    /// Flips a specific queued job to `running`; `None` if another worker got it first
    pub async fn start(&self, job_id: Uuid, now: DateTime<Utc>) -> Result<Option<Model>, DbErr> {
        let now_tz: DateTimeWithTimeZone = now.into();
        let claimed = Entity::update_many()
            .col_expr(Column::Status, Expr::value(SyncJobStatus::Running))
            .col_expr(Column::StartedAt, Expr::value(now_tz))
            .col_expr(Column::UpdatedAt, Expr::value(now_tz))
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(SyncJobStatus::Queued))
            .exec(&*self.db)
            .await?;

        if claimed.rows_affected == 0 {
            return Ok(None);
        }
        Entity::find_by_id(job_id).one(&*self.db).await
    }

    pub async fn finish(&self, job_id: Uuid, completion: &JobCompletion) -> Result<Model, DbErr> {
        let job = Entity::find_by_id(job_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| DbErr::RecordNotFound(format!("sync job {}", job_id)))?;
        let now: DateTimeWithTimeZone = Utc::now().into();

        let failed: Vec<&str> = completion.failed_providers.iter().map(|p| p.slug()).collect();
        let mut error = serde_json::Map::new();
        for (provider, failure) in &completion.errors {
            error.insert(provider.slug().to_string(), json!(failure));
        }
        if !completion.skipped_providers.is_empty() {
            let skipped: Vec<&str> = completion.skipped_providers.iter().map(|p| p.slug()).collect();
            error.insert(NOT_CONNECTED_KEY.to_string(), json!(skipped));
        }

        let mut active: ActiveModel = job.into();
        active.status = Set(completion.status);
        active.failed_providers = Set((!failed.is_empty()).then(|| json!(failed)));
        active.error = Set((!error.is_empty()).then(|| serde_json::Value::Object(error)));
        active.activities_ingested = Set(clamp_count(completion.activities_ingested));
        active.suggestions_created = Set(clamp_count(completion.suggestions_created));
        active.finished_at = Set(Some(now));
        active.updated_at = Set(now);
        active.update(&*self.db).await
    }

    /// Marks a job that ran past its wall-clock budget
    pub async fn mark_abandoned(&self, job_id: Uuid, reason: &str) -> Result<(), DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        Entity::update_many()
            .col_expr(Column::Status, Expr::value(SyncJobStatus::Abandoned))
            .col_expr(Column::Error, Expr::value(json!({ "reason": reason })))
            .col_expr(Column::FinishedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Id.eq(job_id))
            .filter(Column::Status.eq(SyncJobStatus::Running))
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// Abandons `running` jobs started before `cutoff`, left behind by a
    /// process that stopped mid-run. Returns how many were swept.
    pub async fn abandon_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, DbErr> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let cutoff: DateTimeWithTimeZone = cutoff.into();
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(SyncJobStatus::Abandoned))
            .col_expr(
                Column::Error,
                Expr::value(json!({ "reason": "worker stopped before completion" })),
            )
            .col_expr(Column::FinishedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .filter(Column::Status.eq(SyncJobStatus::Running))
            .filter(Column::StartedAt.lt(cutoff))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn find(&self, job_id: Uuid) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(job_id).one(&*self.db).await
    }

    /// The user's jobs, newest first
    pub async fn list_for_user(&self, user_id: Uuid, limit: u64) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .all(&*self.db)
            .await
    }
}

fn clamp_count(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}
