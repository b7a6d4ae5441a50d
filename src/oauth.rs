//! Google OAuth client
//!
//! Builds consent URLs and talks to the Google token endpoint for the
//! authorization-code and refresh-token grants. All three connectors share one
//! client because they share one Google OAuth application.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::GoogleConfig;
use crate::models::Provider;
use crate::vault::TokenSet;

/// Errors raised by the OAuth token endpoint
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth client misconfigured: {0}")]
    Configuration(String),

    #[error("token endpoint rate limited; retry after {0}s")]
    RateLimited(u64),

    #[error("token endpoint rejected the grant with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token endpoint unavailable with status {status}")]
    Unavailable { status: u16 },

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid token response: {0}")]
    InvalidResponse(String),
}

impl OAuthError {
    pub fn kind(&self) -> &'static str {
        match self {
            OAuthError::Configuration(_) => "configuration",
            OAuthError::RateLimited(_) => "rate_limited",
            OAuthError::Rejected { .. } => "rejected",
            OAuthError::Unavailable { .. } => "unavailable",
            OAuthError::Network(_) => "network",
            OAuthError::InvalidResponse(_) => "invalid_response",
        }
    }
}

/// Code exchange and refresh grants, injected into the vault and handlers
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange_code(&self, provider: Provider, code: &str) -> Result<TokenSet, OAuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, OAuthError>;
}

/// Google token response
#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

impl From<GoogleTokenResponse> for TokenSet {
    fn from(response: GoogleTokenResponse) -> Self {
        TokenSet {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response
                .expires_in
                .map(|seconds| Utc::now() + chrono::Duration::seconds(seconds)),
            scopes: response
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

pub struct GoogleOAuthClient {
    client_id: String,
    client_secret: String,
    redirect_base: String,
    auth_url: Url,
    token_url: Url,
    http_client: Client,
}

impl GoogleOAuthClient {
    pub fn from_config(config: &GoogleConfig) -> Result<Self, OAuthError> {
        let auth_url = Url::parse(&config.oauth_base)
            .map_err(|e| OAuthError::Configuration(format!("invalid auth URL: {}", e)))?;
        let token_url = Url::parse(&config.token_url)
            .map_err(|e| OAuthError::Configuration(format!("invalid token URL: {}", e)))?;
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| OAuthError::Configuration(format!("http client: {}", e)))?;

        Ok(Self {
            client_id: config.client_id.clone().unwrap_or_default(),
            client_secret: config.client_secret.clone().unwrap_or_default(),
            redirect_base: config.redirect_uri.trim_end_matches('/').to_string(),
            auth_url,
            token_url,
            http_client,
        })
    }

    /// Callback URL registered for a provider, e.g. `.../connect/gmail/callback`
    pub fn redirect_uri(&self, provider: Provider) -> String {
        format!("{}/{}/callback", self.redirect_base, provider.slug())
    }

    /// Consent URL requesting offline access so Google issues a refresh token
    pub fn authorize_url(&self, provider: Provider, scopes: &[&str], state: &str) -> Url {
        let mut url = self.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_uri(provider))
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        url
    }

    async fn token_request(
        &self,
        params: HashMap<&'static str, String>,
    ) -> Result<TokenSet, OAuthError> {
        let response = self
            .http_client
            .post(self.token_url.clone())
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::Network(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(OAuthError::RateLimited(retry_after));
        }

        if status.is_server_error() {
            return Err(OAuthError::Unavailable {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            return Err(OAuthError::Rejected {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: GoogleTokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::InvalidResponse(e.to_string()))?;

        Ok(body.into())
    }
}

#[async_trait]
impl TokenExchanger for GoogleOAuthClient {
    async fn exchange_code(&self, provider: Provider, code: &str) -> Result<TokenSet, OAuthError> {
        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.clone());
        params.insert("client_secret", self.client_secret.clone());
        params.insert("code", code.to_string());
        params.insert("grant_type", "authorization_code".to_string());
        params.insert("redirect_uri", self.redirect_uri(provider));

        self.token_request(params).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, OAuthError> {
        let mut params = HashMap::new();
        params.insert("client_id", self.client_id.clone());
        params.insert("client_secret", self.client_secret.clone());
        params.insert("refresh_token", refresh_token.to_string());
        params.insert("grant_type", "refresh_token".to_string());

        self.token_request(params).await
    }
}
