//! # Connect Handlers
//!
//! OAuth consent for a provider: issue a state-bound authorization URL, then
//! exchange the returned code and store the credential in the vault.

use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{OperatorAuth, UserHeader, UserId};
use crate::connectors::registry::RegistryError;
use crate::error::{ApiError, invalid_state, not_found, validation_error};
use crate::models::Provider;
use crate::server::AppState;

const MAX_AUTHORIZE_URL_LEN: usize = 2048;

/// Authorization URL the client redirects the user to
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthorizeUrlResponse {
    pub provider: Provider,
    /// Complete consent URL, state included
    pub authorize_url: String,
    /// When the embedded state stops being accepted
    pub expires_at: DateTime<Utc>,
}

/// Query string Google appends to the redirect
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set instead of `code` when the user declined consent
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CallbackResponse {
    pub provider: Provider,
    #[schema(example = "connected")]
    pub status: String,
}

/// Resolves a provider slug from the path, 404 when unknown
pub(crate) fn parse_provider(raw: &str) -> Result<Provider, ApiError> {
    raw.parse::<Provider>()
        .map_err(|_| not_found(&format!("provider '{}' not found", raw)))
}

/// Start OAuth consent for a provider
#[utoipa::path(
    get,
    path = "/connect/{provider}",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider slug: gmail, google_calendar or google_drive"),
        UserHeader
    ),
    responses(
        (status = 200, description = "Authorization URL generated", body = AuthorizeUrlResponse),
        (status = 400, description = "Missing or invalid X-User-Id", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 404, description = "Provider not found", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn start_oauth(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    UserId(user_id): UserId,
    Path(provider): Path<String>,
) -> Result<Json<AuthorizeUrlResponse>, ApiError> {
    let provider = parse_provider(&provider)?;
    let connector = state
        .registry
        .get(provider)
        .map_err(|RegistryError::ProviderNotFound { provider }| {
            not_found(&format!("provider '{}' not found", provider))
        })?;

    let now = Utc::now();
    if let Err(err) = state.oauth_states.cleanup_expired(now).await {
        tracing::warn!(error = %err, "Failed to purge expired OAuth states");
    }

    let oauth_state = state.oauth_states.create(user_id, provider, now).await?;

    let authorize_url = connector.auth_url(user_id, &oauth_state.state);
    validate_authorize_url(&authorize_url)?;

    tracing::info!(
        user_id = %user_id,
        provider = %provider,
        state_id = %oauth_state.id,
        "OAuth flow initiated"
    );

    Ok(Json(AuthorizeUrlResponse {
        provider,
        authorize_url: authorize_url.to_string(),
        expires_at: oauth_state.expires_at.with_timezone(&Utc),
    }))
}

/// Complete OAuth consent and store the credential.
///
/// The user is taken from the consumed state rather than a header because
/// the request arrives through the user's browser redirect.
#[utoipa::path(
    get,
    path = "/connect/{provider}/callback",
    security(("bearer_auth" = [])),
    params(
        ("provider" = String, Path, description = "Provider slug"),
        CallbackQuery
    ),
    responses(
        (status = 200, description = "Credential stored", body = CallbackResponse),
        (status = 400, description = "Missing code, declined consent or invalid state", body = ApiError),
        (status = 401, description = "Missing or invalid authorization token", body = ApiError),
        (status = 404, description = "Provider not found", body = ApiError),
        (status = 429, description = "Token endpoint rate limited", body = ApiError),
        (status = 502, description = "Token endpoint rejected the code", body = ApiError)
    ),
    tag = "connections"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(provider): Path<String>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> Result<Json<CallbackResponse>, ApiError> {
    let provider = parse_provider(&provider)?;
    let Query(query) = query?;

    let state_token = query.state.as_deref().ok_or_else(invalid_state)?;
    let consumed = state
        .oauth_states
        .consume(provider, state_token, Utc::now())
        .await?
        .ok_or_else(invalid_state)?;
    let user_id = consumed.user_id;

    if let Some(error) = query.error.as_deref() {
        tracing::info!(%user_id, provider = %provider, error, "User declined OAuth consent");
        return Err(
            ApiError::new(StatusCode::BAD_REQUEST, "CONSENT_DENIED", "Consent was not granted")
                .with_details(serde_json::json!({ "error": error })),
        );
    }

    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| validation_error("Missing authorization code"))?;

    let tokens = state.oauth.exchange_code(provider, code).await?;
    state.vault.save(user_id, provider, tokens).await?;

    tracing::info!(%user_id, provider = %provider, "Provider connected");

    Ok(Json(CallbackResponse {
        provider,
        status: "connected".to_string(),
    }))
}

fn validate_authorize_url(url: &Url) -> Result<(), ApiError> {
    // RFC 6749 section 3.1: no fragment component
    if url.fragment().is_some() || url.as_str().len() > MAX_AUTHORIZE_URL_LEN {
        tracing::error!(url_len = url.as_str().len(), "Connector produced an invalid authorization URL");
        return Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Failed to generate authorization URL",
        ));
    }
    Ok(())
}
