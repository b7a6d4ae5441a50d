//! # OAuth State Repository
//!
//! Single-use consent states binding an OAuth callback to the user and
//! provider that started it.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use crate::models::Provider;
use crate::models::oauth_state::{self, ActiveModel, Entity, Model};

/// Lifetime of a consent state
pub const STATE_TTL_MINUTES: i64 = 10;

#[derive(Clone)]
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Stores a fresh random state for `(user_id, provider)`
    pub async fn create(
        &self,
        user_id: Uuid,
        provider: Provider,
        now: DateTime<Utc>,
    ) -> Result<Model, DbErr> {
        ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            provider: Set(provider),
            state: Set(generate_state()),
            expires_at: Set((now + Duration::minutes(STATE_TTL_MINUTES)).into()),
            created_at: Set(now.into()),
        }
        .insert(&*self.db)
        .await
    }

    /// Deletes the state and returns it if it was issued for `provider` and
    /// has not expired. A state is accepted at most once.
    pub async fn consume(
        &self,
        provider: Provider,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Model>, DbErr> {
        let Some(found) = Entity::find()
            .filter(oauth_state::Column::State.eq(state))
            .filter(oauth_state::Column::Provider.eq(provider))
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };

        let deleted = Entity::delete_by_id(found.id).exec(&*self.db).await?;
        if deleted.rows_affected == 0 {
            // consumed by a concurrent callback
            return Ok(None);
        }

        if found.expires_at.with_timezone(&Utc) <= now {
            return Ok(None);
        }

        Ok(Some(found))
    }

    /// Clean up expired OAuth states
    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64, DbErr> {
        let result = Entity::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lte(now))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}

/// 32 random bytes, URL-safe base64 without padding
fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64_url::encode(&bytes)
}
