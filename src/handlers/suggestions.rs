//! # Suggestion Handlers
//!
//! Read access to suggested entries and the approve / reject / bill
//! transitions driven by the billing collaborator.

use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    response::Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{OperatorAuth, UserHeader, UserId};
use crate::error::{ApiError, validation_error};
use crate::models::suggested_entry::Model as SuggestedEntryModel;
use crate::models::{EntryStatus, TaskCategory};
use crate::repositories::suggestion::DEFAULT_LIST_LIMIT;
use crate::server::AppState;

const MAX_LIST_LIMIT: u64 = 500;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSuggestionsQuery {
    /// Lifecycle state to list (default: suggested)
    pub status: Option<EntryStatus>,
    /// Maximum entries to return (default: 200, max: 500)
    pub limit: Option<u64>,
}

/// Suggested time entry as returned by the API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuggestionInfo {
    pub id: Uuid,
    pub source_activity_id: Uuid,
    pub engagement_id: Option<Uuid>,
    #[schema(value_type = String, example = "2026-03-04")]
    pub date: NaiveDate,
    pub activity_at: DateTime<Utc>,
    #[schema(example = 15)]
    pub duration_minutes: i32,
    #[schema(example = "Acme contract review")]
    pub description: String,
    pub task_category: TaskCategory,
    pub status: EntryStatus,
    /// Hourly rate in cents, 0 when unmatched
    #[schema(example = 30000)]
    pub hourly_rate_cents: i64,
    /// Draft amount in cents, 0 when unmatched
    #[schema(example = 7500)]
    pub amount_cents: i64,
    #[schema(example = 6)]
    pub match_score: i32,
}

impl From<SuggestedEntryModel> for SuggestionInfo {
    fn from(model: SuggestedEntryModel) -> Self {
        Self {
            id: model.id,
            source_activity_id: model.source_activity_id,
            engagement_id: model.engagement_id,
            date: model.entry_date,
            activity_at: model.activity_at.with_timezone(&Utc),
            duration_minutes: model.duration_minutes,
            description: model.description,
            task_category: model.task_category,
            status: model.status,
            hourly_rate_cents: model.hourly_rate_cents,
            amount_cents: model.amount_cents,
            match_score: model.match_score,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuggestionsResponse {
    pub suggestions: Vec<SuggestionInfo>,
}

/// List the caller's suggested entries, most recent date first
#[utoipa::path(
    get,
    path = "/suggestions",
    security(("bearer_auth" = [])),
    params(UserHeader, ListSuggestionsQuery),
    responses(
        (status = 200, description = "Suggested entries", body = SuggestionsResponse),
        (status = 400, description = "Invalid query or user header", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError)
    ),
    tag = "suggestions"
)]
pub async fn list_suggestions(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
    query: Result<Query<ListSuggestionsQuery>, QueryRejection>,
) -> Result<Json<SuggestionsResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT);
    if limit == 0 || limit > MAX_LIST_LIMIT {
        return Err(validation_error("limit must be between 1 and 500"));
    }

    let entries = state
        .suggestions
        .list(user_id, query.status.unwrap_or(EntryStatus::Suggested), limit)
        .await?;

    Ok(Json(SuggestionsResponse {
        suggestions: entries.into_iter().map(SuggestionInfo::from).collect(),
    }))
}

async fn transition(
    state: &AppState,
    user_id: Uuid,
    id: Uuid,
    next: EntryStatus,
) -> Result<Json<SuggestionInfo>, ApiError> {
    let entry = state.suggestions.transition(user_id, id, next).await?;
    Ok(Json(entry.into()))
}

/// Approve a suggested entry
#[utoipa::path(
    post,
    path = "/suggestions/{id}/approve",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Suggested entry id"), UserHeader),
    responses(
        (status = 200, description = "Entry approved", body = SuggestionInfo),
        (status = 400, description = "Entry is not in the suggested state", body = ApiError),
        (status = 404, description = "Entry not found", body = ApiError)
    ),
    tag = "suggestions"
)]
pub async fn approve_suggestion(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<SuggestionInfo>, ApiError> {
    transition(&state, user_id, id, EntryStatus::Approved).await
}

/// Reject a suggested entry
#[utoipa::path(
    post,
    path = "/suggestions/{id}/reject",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Suggested entry id"), UserHeader),
    responses(
        (status = 200, description = "Entry rejected", body = SuggestionInfo),
        (status = 400, description = "Entry is not in the suggested state", body = ApiError),
        (status = 404, description = "Entry not found", body = ApiError)
    ),
    tag = "suggestions"
)]
pub async fn reject_suggestion(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<SuggestionInfo>, ApiError> {
    transition(&state, user_id, id, EntryStatus::Rejected).await
}

/// Mark an approved entry as billed
#[utoipa::path(
    post,
    path = "/suggestions/{id}/bill",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Suggested entry id"), UserHeader),
    responses(
        (status = 200, description = "Entry billed", body = SuggestionInfo),
        (status = 400, description = "Entry is not approved", body = ApiError),
        (status = 404, description = "Entry not found", body = ApiError)
    ),
    tag = "suggestions"
)]
pub async fn bill_suggestion(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> Result<Json<SuggestionInfo>, ApiError> {
    transition(&state, user_id, id, EntryStatus::Billed).await
}
