//! # Jobs API Handlers
//!
//! Recent sync jobs for the calling user, newest first.

use std::collections::BTreeMap;

use axum::{
    extract::{Query, State, rejection::QueryRejection},
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, UserHeader, UserId};
use crate::error::{ApiError, validation_error};
use crate::models::sync_job::Model as SyncJobModel;
use crate::models::{Provider, SyncJobStatus, SyncTrigger};
use crate::repositories::NOT_CONNECTED_KEY;
use crate::server::AppState;

const DEFAULT_LIMIT: u64 = 20;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListJobsQuery {
    /// Maximum jobs to return (default: 20, max: 100)
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobInfo {
    pub id: Uuid,
    pub trigger: SyncTrigger,
    pub status: SyncJobStatus,
    pub failed_providers: Vec<Provider>,
    /// Providers skipped because the user has not connected them
    pub skipped_providers: Vec<Provider>,
    /// Error kind and message per failed provider
    #[schema(value_type = Object)]
    pub errors: BTreeMap<String, serde_json::Value>,
    pub activities_ingested: i32,
    pub suggestions_created: i32,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<SyncJobModel> for JobInfo {
    fn from(model: SyncJobModel) -> Self {
        let failed_providers = model
            .failed_providers
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        let mut errors: BTreeMap<String, serde_json::Value> = model
            .error
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        let skipped_providers = errors
            .remove(NOT_CONNECTED_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        Self {
            id: model.id,
            trigger: model.trigger_kind,
            status: model.status,
            failed_providers,
            skipped_providers,
            errors,
            activities_ingested: model.activities_ingested,
            suggestions_created: model.suggestions_created,
            scheduled_at: model.scheduled_at.with_timezone(&Utc),
            started_at: model.started_at.map(|t| t.with_timezone(&Utc)),
            finished_at: model.finished_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobsResponse {
    pub jobs: Vec<JobInfo>,
}

/// List recent sync jobs for the calling user
#[utoipa::path(
    get,
    path = "/jobs",
    security(("bearer_auth" = [])),
    params(UserHeader, ListJobsQuery),
    responses(
        (status = 200, description = "Recent sync jobs", body = JobsResponse),
        (status = 400, description = "Invalid query or user header", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn list_jobs(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> Result<Json<JobsResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT);
    if limit == 0 || limit > MAX_LIMIT {
        return Err(validation_error("limit must be between 1 and 100"));
    }

    let jobs = state.jobs.list_for_user(user_id, limit).await?;
    Ok(Json(JobsResponse {
        jobs: jobs.into_iter().map(JobInfo::from).collect(),
    }))
}
