//! # Connections API Handlers
//!
//! Lists the supported providers and the caller's provider credentials, and
//! removes credentials. Responses never carry token material.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{OperatorAuth, UserHeader, UserId};
use crate::connectors::ProviderMetadata;
use crate::error::{ApiError, not_found};
use crate::handlers::connect::parse_provider;
use crate::server::AppState;
use crate::vault::ConnectionSummary;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderMetadata>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConnectionsResponse {
    pub connections: Vec<ConnectionSummary>,
}

/// List the providers a user can connect
#[utoipa::path(
    get,
    path = "/providers",
    responses(
        (status = 200, description = "Supported providers", body = ProvidersResponse)
    ),
    tag = "connections"
)]
pub async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    let providers = state
        .registry
        .providers()
        .into_iter()
        .map(ProviderMetadata::for_provider)
        .collect();
    Json(ProvidersResponse { providers })
}

/// List connected providers for the calling user
#[utoipa::path(
    get,
    path = "/connections",
    security(("bearer_auth" = [])),
    params(UserHeader),
    responses(
        (status = 200, description = "Connected providers", body = ConnectionsResponse),
        (status = 400, description = "Missing or invalid X-User-Id", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn list_connections(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
) -> Result<Json<ConnectionsResponse>, ApiError> {
    let connections = state.vault.list_connected(user_id).await?;
    Ok(Json(ConnectionsResponse { connections }))
}

/// Disconnect a provider, deleting the stored credential
#[utoipa::path(
    delete,
    path = "/connections/{provider}",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider slug"),
        UserHeader
    ),
    responses(
        (status = 204, description = "Credential deleted"),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 404, description = "Provider unknown or not connected", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn delete_connection(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
    Path(provider): Path<String>,
) -> Result<StatusCode, ApiError> {
    let provider = parse_provider(&provider)?;

    if !state.vault.delete(user_id, provider).await? {
        return Err(not_found(&format!("{} is not connected", provider)));
    }

    tracing::info!(%user_id, provider = %provider, "Provider disconnected");
    Ok(StatusCode::NO_CONTENT)
}
