//! # Sync Handlers
//!
//! Manual sync trigger. The job runs on the worker pool; results show up in
//! later suggestion reads.

use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{OperatorAuth, UserHeader, UserId};
use crate::error::ApiError;
use crate::server::AppState;

/// Response returned once a sync job is queued
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SyncStartedResponse {
    #[schema(example = "sync started")]
    pub status: String,
    pub job_id: Uuid,
}

/// Queue a sync for the calling user
#[utoipa::path(
    post,
    path = "/sync",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 202, description = "Sync job queued", body = SyncStartedResponse),
        (status = 400, description = "Missing or invalid X-User-Id", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
) -> Result<(StatusCode, Json<SyncStartedResponse>), ApiError> {
    let job = state.scheduler.trigger_manual(user_id).await?;

    tracing::info!(user_id = %user_id, job_id = %job.id, "Manual sync queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SyncStartedResponse {
            status: "sync started".to_string(),
            job_id: job.id,
        }),
    ))
}
