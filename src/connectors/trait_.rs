//! Connector trait definition
//!
//! Defines the interface every activity provider implements, the normalized
//! event shape connectors emit and the error taxonomy the job runner records.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::models::{ActivityType, Provider};
use crate::oauth::OAuthError;
use crate::repositories::ActivityRepository;
use crate::vault::{TokenVault, VaultError};

/// Provider item normalized into the common activity shape
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub user_id: Uuid,
    pub provider: Provider,
    pub activity_type: ActivityType,
    /// Native sent, occurred or modified time
    pub occurred_at: DateTime<Utc>,
    pub duration_minutes: Option<i32>,
    pub subject: Option<String>,
    pub description: Option<String>,
    /// Dedup key, unique per user
    pub source_id: String,
    pub metadata: JsonValue,
}

/// Connector failures, recorded per provider on the job
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No credential stored; the provider is skipped for this user
    #[error("{provider} is not connected")]
    NotConnected { provider: Provider },

    #[error("{provider} rate limited; retry after {retry_after_secs}s")]
    ProviderRateLimited {
        provider: Provider,
        retry_after_secs: u64,
    },

    #[error("{provider} unavailable: {details}")]
    ProviderUnavailable { provider: Provider, details: String },

    #[error("stored {provider} credential could not be decrypted")]
    DecryptionFailure { provider: Provider },

    #[error("malformed {provider} item: {details}")]
    ValidationFailure { provider: Provider, details: String },

    /// Provider rejected the access token (revoked grant, expired refresh token)
    #[error("{provider} rejected the stored credential")]
    Unauthorized { provider: Provider },
}

impl ConnectorError {
    /// Stable label used in job records and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectorError::NotConnected { .. } => "not_connected",
            ConnectorError::ProviderRateLimited { .. } => "rate_limited",
            ConnectorError::ProviderUnavailable { .. } => "unavailable",
            ConnectorError::DecryptionFailure { .. } => "decryption_failure",
            ConnectorError::ValidationFailure { .. } => "validation_failure",
            ConnectorError::Unauthorized { .. } => "unauthorized",
        }
    }

    pub fn from_vault(provider: Provider, error: VaultError) -> Self {
        match error {
            VaultError::NotConnected { .. } => ConnectorError::NotConnected { provider },
            VaultError::DecryptionFailure { .. } => ConnectorError::DecryptionFailure { provider },
            VaultError::Refresh(OAuthError::RateLimited(retry_after_secs)) => {
                ConnectorError::ProviderRateLimited {
                    provider,
                    retry_after_secs,
                }
            }
            VaultError::Refresh(OAuthError::Rejected { .. }) => {
                ConnectorError::Unauthorized { provider }
            }
            other => ConnectorError::ProviderUnavailable {
                provider,
                details: other.to_string(),
            },
        }
    }
}

/// An activity source the sync job loops over
#[async_trait]
pub trait ActivityConnector: Send + Sync {
    fn provider(&self) -> Provider;

    /// OAuth scopes requested at consent time
    fn scopes(&self) -> &'static [&'static str];

    /// Consent URL for connecting this provider; `state` is echoed back on the callback
    fn auth_url(&self, user_id: Uuid, state: &str) -> Url;

    /// New items since `since`, most recent first, capped at one page.
    ///
    /// Items whose `(user_id, source_id)` is already stored are left out.
    async fn fetch_recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, ConnectorError>;
}

/// Dependencies shared by every connector
#[derive(Clone)]
pub struct ConnectorContext {
    pub http_client: reqwest::Client,
    pub vault: Arc<TokenVault>,
    pub activities: ActivityRepository,
    pub page_size: u32,
}

impl ConnectorContext {
    pub async fn access_token(
        &self,
        user_id: Uuid,
        provider: Provider,
    ) -> Result<String, ConnectorError> {
        self.vault
            .access_token(user_id, provider)
            .await
            .map_err(|e| ConnectorError::from_vault(provider, e))
    }

    /// Drops items already in the activity store, keeping provider order
    pub async fn retain_new<T>(
        &self,
        user_id: Uuid,
        provider: Provider,
        items: Vec<T>,
        source_id: impl Fn(&T) -> &str,
    ) -> Result<Vec<T>, ConnectorError> {
        if items.is_empty() {
            return Ok(items);
        }
        let ids: Vec<String> = items.iter().map(|i| source_id(i).to_string()).collect();
        let existing = self
            .activities
            .existing_source_ids(user_id, &ids)
            .await
            .map_err(|e| ConnectorError::ProviderUnavailable {
                provider,
                details: format!("activity store lookup failed: {}", e),
            })?;

        let before = items.len();
        let fresh: Vec<T> = items
            .into_iter()
            .filter(|item| !existing.contains(source_id(item)))
            .collect();
        tracing::debug!(
            %user_id,
            provider = %provider,
            skipped = before - fresh.len(),
            "Filtered already stored items"
        );
        Ok(fresh)
    }
}
