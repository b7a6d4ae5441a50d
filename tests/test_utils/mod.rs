//! Test utilities shared by the integration tests.
//!
//! In-memory SQLite with migrations applied, fixture inserts for users,
//! clients and engagements, a vault with a fixed key, and a scripted
//! connector standing in for the Google APIs.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use serde_json::json;
use timecapture::connectors::{ActivityConnector, ConnectorError, RawEvent};
use timecapture::crypto::{AesGcmCipher, CryptoKey};
use timecapture::models::{ActivityType, Provider, client, engagement, user};
use timecapture::vault::TokenVault;
use url::Url;
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

pub fn test_crypto_key() -> CryptoKey {
    CryptoKey::new((0u8..32).collect()).expect("32-byte test key")
}

pub fn test_vault(db: &Arc<DatabaseConnection>) -> Arc<TokenVault> {
    Arc::new(TokenVault::new(
        Arc::clone(db),
        Arc::new(AesGcmCipher::new(test_crypto_key())),
    ))
}

pub async fn insert_user(db: &DatabaseConnection, email: &str) -> Result<Uuid> {
    let now = Utc::now();
    let model = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email.to_string()),
        display_name: Set(None),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await?;
    Ok(model.id)
}

pub async fn insert_client(
    db: &DatabaseConnection,
    user_id: Uuid,
    name: &str,
    company_name: Option<&str>,
) -> Result<Uuid> {
    let model = client::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        name: Set(name.to_string()),
        company_name: Set(company_name.map(str::to_string)),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await?;
    Ok(model.id)
}

/// Engagement fixture; pass a fixed `id` when a test depends on id order
pub async fn insert_engagement(
    db: &DatabaseConnection,
    id: Uuid,
    user_id: Uuid,
    client_id: Uuid,
    name: &str,
    description: Option<&str>,
    hourly_rate_cents: i64,
) -> Result<Uuid> {
    let model = engagement::ActiveModel {
        id: Set(id),
        user_id: Set(user_id),
        client_id: Set(client_id),
        name: Set(name.to_string()),
        description: Set(description.map(str::to_string)),
        status: Set(engagement::STATUS_ACTIVE.to_string()),
        hourly_rate_cents: Set(hourly_rate_cents),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await?;
    Ok(model.id)
}

/// A normalized event as a connector would return it
pub fn raw_event(
    user_id: Uuid,
    provider: Provider,
    source_id: &str,
    subject: &str,
    description: Option<&str>,
    duration_minutes: Option<i32>,
    occurred_at: DateTime<Utc>,
) -> RawEvent {
    let activity_type = match provider {
        Provider::Gmail => ActivityType::Email,
        Provider::GoogleCalendar => ActivityType::Meeting,
        Provider::GoogleDrive => ActivityType::Document,
    };
    RawEvent {
        user_id,
        provider,
        activity_type,
        occurred_at,
        duration_minutes,
        subject: Some(subject.to_string()),
        description: description.map(str::to_string),
        source_id: source_id.to_string(),
        metadata: json!({}),
    }
}

/// What a [`ScriptedConnector`] answers on every fetch
#[derive(Debug, Clone)]
pub enum Script {
    Events(Vec<RawEvent>),
    NotConnected,
    Unavailable(String),
}

/// Connector returning a fixed answer and counting its calls
pub struct ScriptedConnector {
    provider: Provider,
    script: Mutex<Script>,
    calls: Mutex<u32>,
}

impl ScriptedConnector {
    pub fn new(provider: Provider, script: Script) -> Arc<Self> {
        Arc::new(Self {
            provider,
            script: Mutex::new(script),
            calls: Mutex::new(0),
        })
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl ActivityConnector for ScriptedConnector {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn scopes(&self) -> &'static [&'static str] {
        &["https://www.googleapis.com/auth/test.readonly"]
    }

    fn auth_url(&self, user_id: Uuid, state: &str) -> Url {
        let mut url = Url::parse("https://accounts.example.com/o/oauth2/auth").unwrap();
        url.query_pairs_mut()
            .append_pair("provider", self.provider.slug())
            .append_pair("login_hint", &user_id.to_string())
            .append_pair("state", state);
        url
    }

    async fn fetch_recent(
        &self,
        _user_id: Uuid,
        _since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, ConnectorError> {
        *self.calls.lock().unwrap() += 1;
        match self.script.lock().unwrap().clone() {
            Script::Events(events) => Ok(events),
            Script::NotConnected => Err(ConnectorError::NotConnected {
                provider: self.provider,
            }),
            Script::Unavailable(details) => Err(ConnectorError::ProviderUnavailable {
                provider: self.provider,
                details,
            }),
        }
    }
}
