//! Token vault
//!
//! Encrypted storage for per-user, per-provider OAuth credentials. Only
//! ciphertext reaches the `credentials` table; plaintext exists in memory for
//! the duration of a provider call.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use zeroize::Zeroize;

use crate::crypto::{CryptoError, TokenCipher, credential_aad};
use crate::models::credential::{self, ActiveModel, Entity as Credential, Model};
use crate::models::Provider;
use crate::oauth::{OAuthError, TokenExchanger};

/// Access tokens expiring within this window are refreshed before use
pub const REFRESH_SKEW_SECONDS: i64 = 60;

/// Token material handed to [`TokenVault::save`]
#[derive(Clone, Default)]
pub struct TokenSet {
    pub access_token: String,
    /// `None` keeps whatever refresh token is already stored
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

/// Decrypted credential
#[derive(Clone)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
}

impl Credentials {
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at.is_some_and(|at| at <= now + window)
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.access_token.zeroize();
        if let Some(token) = self.refresh_token.as_mut() {
            token.zeroize();
        }
    }
}

/// Connected provider as shown to the user; carries no token material
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConnectionSummary {
    pub provider: Provider,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
    pub connected_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("{provider} is not connected")]
    NotConnected { provider: Provider },

    #[error("stored {provider} credential could not be decrypted")]
    DecryptionFailure { provider: Provider },

    #[error("token encryption failed: {0}")]
    Encryption(#[from] CryptoError),

    #[error("token refresh failed: {0}")]
    Refresh(#[from] OAuthError),

    #[error("credential store error: {0}")]
    Database(#[from] DbErr),
}

impl VaultError {
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::NotConnected { .. } => "not_connected",
            VaultError::DecryptionFailure { .. } => "decryption_failure",
            VaultError::Encryption(_) => "encryption",
            VaultError::Refresh(_) => "refresh",
            VaultError::Database(_) => "database",
        }
    }
}

#[derive(Clone)]
pub struct TokenVault {
    db: Arc<DatabaseConnection>,
    cipher: Arc<dyn TokenCipher>,
    refresher: Option<Arc<dyn TokenExchanger>>,
}

impl TokenVault {
    pub fn new(db: Arc<DatabaseConnection>, cipher: Arc<dyn TokenCipher>) -> Self {
        Self {
            db,
            cipher,
            refresher: None,
        }
    }

    /// Enables refresh-on-demand through the given token endpoint client
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenExchanger>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    async fn find(&self, user_id: Uuid, provider: Provider) -> Result<Option<Model>, DbErr> {
        Credential::find()
            .filter(credential::Column::UserId.eq(user_id))
            .filter(credential::Column::Provider.eq(provider))
            .one(&*self.db)
            .await
    }

    /// Encrypts and upserts the user's credential for `provider`.
    ///
    /// When `tokens.refresh_token` is `None` the stored refresh token is kept;
    /// Google omits it on most refresh responses.
    pub async fn save(
        &self,
        user_id: Uuid,
        provider: Provider,
        tokens: TokenSet,
    ) -> Result<(), VaultError> {
        let aad = credential_aad(&user_id, provider.slug());
        let access_ct = self
            .cipher
            .encrypt(aad.as_bytes(), tokens.access_token.as_bytes())?;
        let refresh_ct = tokens
            .refresh_token
            .as_ref()
            .map(|token| self.cipher.encrypt(aad.as_bytes(), token.as_bytes()))
            .transpose()?;
        let scopes = (!tokens.scopes.is_empty()).then(|| serde_json::json!(tokens.scopes));
        let now = Utc::now();

        match self.find(user_id, provider).await? {
            Some(existing) => {
                let mut active: ActiveModel = existing.into();
                active.access_token_ciphertext = Set(access_ct);
                if let Some(ct) = refresh_ct {
                    active.refresh_token_ciphertext = Set(Some(ct));
                }
                active.expires_at = Set(tokens.expires_at.map(Into::into));
                if scopes.is_some() {
                    active.scopes = Set(scopes);
                }
                active.updated_at = Set(now.into());
                active.update(&*self.db).await?;
            }
            None => {
                ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    provider: Set(provider),
                    access_token_ciphertext: Set(access_ct),
                    refresh_token_ciphertext: Set(refresh_ct),
                    expires_at: Set(tokens.expires_at.map(Into::into)),
                    scopes: Set(scopes),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        tracing::info!(%user_id, provider = %provider, "Stored provider credential");
        Ok(())
    }

    /// Decrypts the user's credential for `provider`
    pub async fn load(&self, user_id: Uuid, provider: Provider) -> Result<Credentials, VaultError> {
        let model = self
            .find(user_id, provider)
            .await?
            .ok_or(VaultError::NotConnected { provider })?;
        self.decrypt(&model)
    }

    fn decrypt(&self, model: &Model) -> Result<Credentials, VaultError> {
        let provider = model.provider;
        let aad = credential_aad(&model.user_id, provider.slug());
        let open = |ct: &[u8]| -> Result<String, VaultError> {
            let bytes = self.cipher.decrypt(aad.as_bytes(), ct).map_err(|error| {
                tracing::error!(
                    user_id = %model.user_id,
                    provider = %provider,
                    error = %error,
                    "Credential decryption failed"
                );
                VaultError::DecryptionFailure { provider }
            })?;
            String::from_utf8(bytes).map_err(|_| VaultError::DecryptionFailure { provider })
        };

        let access_token = open(&model.access_token_ciphertext)?;
        let refresh_token = model
            .refresh_token_ciphertext
            .as_deref()
            .map(open)
            .transpose()?;
        let scopes = model
            .scopes
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default();

        Ok(Credentials {
            access_token,
            refresh_token,
            expires_at: model.expires_at.map(|at| at.with_timezone(&Utc)),
            scopes,
        })
    }

    /// Returns a usable access token, refreshing it first when it expires
    /// within [`REFRESH_SKEW_SECONDS`] and a refresh token is stored.
    pub async fn access_token(&self, user_id: Uuid, provider: Provider) -> Result<String, VaultError> {
        let credentials = self.load(user_id, provider).await?;
        let near_expiry =
            credentials.expires_within(Utc::now(), Duration::seconds(REFRESH_SKEW_SECONDS));

        if near_expiry && credentials.refresh_token.is_some() && self.refresher.is_some() {
            return self.refresh_loaded(user_id, provider, &credentials).await;
        }

        Ok(credentials.access_token.clone())
    }

    /// Refreshes the stored credential unconditionally
    pub async fn refresh(&self, user_id: Uuid, provider: Provider) -> Result<(), VaultError> {
        let credentials = self.load(user_id, provider).await?;
        self.refresh_loaded(user_id, provider, &credentials).await?;
        Ok(())
    }

    async fn refresh_loaded(
        &self,
        user_id: Uuid,
        provider: Provider,
        credentials: &Credentials,
    ) -> Result<String, VaultError> {
        let (Some(refresher), Some(refresh_token)) =
            (self.refresher.as_ref(), credentials.refresh_token.as_deref())
        else {
            return Ok(credentials.access_token.clone());
        };

        let tokens = refresher.refresh(refresh_token).await?;
        let access_token = tokens.access_token.clone();
        self.save(user_id, provider, tokens).await?;
        tracing::debug!(%user_id, provider = %provider, "Refreshed access token");
        Ok(access_token)
    }

    pub async fn list_connected(&self, user_id: Uuid) -> Result<Vec<ConnectionSummary>, VaultError> {
        let rows = Credential::find()
            .filter(credential::Column::UserId.eq(user_id))
            .order_by_asc(credential::Column::Provider)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ConnectionSummary {
                provider: row.provider,
                scopes: row
                    .scopes
                    .and_then(|value| serde_json::from_value(value).ok())
                    .unwrap_or_default(),
                expires_at: row.expires_at.map(|at| at.with_timezone(&Utc)),
                has_refresh_token: row.refresh_token_ciphertext.is_some(),
                connected_at: row.created_at.with_timezone(&Utc),
                updated_at: row.updated_at.with_timezone(&Utc),
            })
            .collect())
    }

    /// Removes the credential; returns whether one existed
    pub async fn delete(&self, user_id: Uuid, provider: Provider) -> Result<bool, VaultError> {
        let result = Credential::delete_many()
            .filter(credential::Column::UserId.eq(user_id))
            .filter(credential::Column::Provider.eq(provider))
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Credentials with a refresh token whose access token expires before `deadline`
    pub async fn expiring_before(
        &self,
        deadline: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, Provider)>, VaultError> {
        let rows = Credential::find()
            .filter(credential::Column::ExpiresAt.is_not_null())
            .filter(credential::Column::ExpiresAt.lte(deadline))
            .filter(credential::Column::RefreshTokenCiphertext.is_not_null())
            .order_by_asc(credential::Column::ExpiresAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| (row.user_id, row.provider))
            .collect())
    }
}
