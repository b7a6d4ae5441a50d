//! Token vault tests: encrypted round trips, refresh-on-demand and the
//! lookups the refresh worker relies on

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde_json::json;
use timecapture::config::{GoogleConfig, TokenRefreshConfig};
use timecapture::crypto::{AesGcmCipher, CryptoKey};
use timecapture::models::{Provider, credential};
use timecapture::oauth::GoogleOAuthClient;
use timecapture::token_refresh::{RefreshStats, TokenRefreshService};
use timecapture::vault::{TokenSet, TokenVault, VaultError};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{insert_user, setup_test_db_arc, test_crypto_key, test_vault};

fn tokens(access: &str, refresh: Option<&str>, expires_in: Duration) -> TokenSet {
    TokenSet {
        access_token: access.to_string(),
        refresh_token: refresh.map(str::to_string),
        expires_at: Some(Utc::now() + expires_in),
        scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
    }
}

fn refreshing_vault(db: &Arc<DatabaseConnection>, server: &MockServer) -> TokenVault {
    let config = GoogleConfig {
        client_id: Some("client-123".to_string()),
        client_secret: Some("secret-456".to_string()),
        token_url: format!("{}/token", server.uri()),
        ..GoogleConfig::default()
    };
    let oauth = GoogleOAuthClient::from_config(&config).unwrap();
    TokenVault::new(db.clone(), Arc::new(AesGcmCipher::new(test_crypto_key())))
        .with_refresher(Arc::new(oauth))
}

#[tokio::test]
async fn tokens_round_trip_and_are_stored_encrypted() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    let vault = test_vault(&db);

    vault
        .save(
            user,
            Provider::Gmail,
            tokens("ya29.secret", Some("1//refresh"), Duration::hours(1)),
        )
        .await
        .unwrap();

    let loaded = vault.load(user, Provider::Gmail).await.unwrap();
    assert_eq!(loaded.access_token, "ya29.secret");
    assert_eq!(loaded.refresh_token.as_deref(), Some("1//refresh"));

    let row = credential::Entity::find().one(&*db).await.unwrap().unwrap();
    let stored = String::from_utf8_lossy(&row.access_token_ciphertext);
    assert!(!stored.contains("ya29.secret"));
}

#[tokio::test]
async fn saving_without_refresh_token_keeps_the_stored_one() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    let vault = test_vault(&db);

    vault
        .save(user, Provider::Gmail, tokens("first", Some("1//keep"), Duration::hours(1)))
        .await
        .unwrap();
    vault
        .save(user, Provider::Gmail, tokens("second", None, Duration::hours(1)))
        .await
        .unwrap();

    let loaded = vault.load(user, Provider::Gmail).await.unwrap();
    assert_eq!(loaded.access_token, "second");
    assert_eq!(loaded.refresh_token.as_deref(), Some("1//keep"));
}

#[tokio::test]
async fn missing_credential_is_not_connected() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();

    let err = test_vault(&db)
        .load(user, Provider::GoogleDrive)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VaultError::NotConnected {
            provider: Provider::GoogleDrive
        }
    ));
}

#[tokio::test]
async fn wrong_key_is_a_decryption_failure() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    test_vault(&db)
        .save(user, Provider::Gmail, tokens("secret", None, Duration::hours(1)))
        .await
        .unwrap();

    let other_key = CryptoKey::new((100u8..132).collect()).unwrap();
    let rotated = TokenVault::new(db.clone(), Arc::new(AesGcmCipher::new(other_key)));

    let err = rotated.load(user, Provider::Gmail).await.unwrap_err();
    assert_eq!(err.kind(), "decryption_failure");
}

#[tokio::test]
async fn credential_of_one_user_is_not_readable_as_another() {
    let db = setup_test_db_arc().await.unwrap();
    let alice = insert_user(&db, "alice@example.com").await.unwrap();
    let bob = insert_user(&db, "bob@example.com").await.unwrap();
    let vault = test_vault(&db);

    vault
        .save(alice, Provider::Gmail, tokens("alice-token", None, Duration::hours(1)))
        .await
        .unwrap();

    assert!(matches!(
        vault.load(bob, Provider::Gmail).await,
        Err(VaultError::NotConnected { .. })
    ));
}

#[tokio::test]
async fn list_and_delete_connections() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    let vault = test_vault(&db);

    vault
        .save(user, Provider::Gmail, tokens("a", Some("r"), Duration::hours(1)))
        .await
        .unwrap();
    vault
        .save(user, Provider::GoogleDrive, tokens("b", None, Duration::hours(1)))
        .await
        .unwrap();

    let connected = vault.list_connected(user).await.unwrap();
    assert_eq!(connected.len(), 2);
    let gmail = connected
        .iter()
        .find(|c| c.provider == Provider::Gmail)
        .unwrap();
    assert!(gmail.has_refresh_token);
    assert_eq!(gmail.scopes.len(), 1);

    let serialized = serde_json::to_string(&connected).unwrap();
    assert!(!serialized.contains("\"a\""));

    assert!(vault.delete(user, Provider::Gmail).await.unwrap());
    assert!(!vault.delete(user, Provider::Gmail).await.unwrap());
    assert_eq!(vault.list_connected(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn near_expiry_access_token_is_refreshed_on_demand() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vault = refreshing_vault(&db, &server);
    vault
        .save(
            user,
            Provider::Gmail,
            tokens("ya29.stale", Some("1//refresh"), Duration::seconds(10)),
        )
        .await
        .unwrap();

    assert_eq!(vault.access_token(user, Provider::Gmail).await.unwrap(), "ya29.fresh");

    let stored = vault.load(user, Provider::Gmail).await.unwrap();
    assert_eq!(stored.access_token, "ya29.fresh");
    assert_eq!(stored.refresh_token.as_deref(), Some("1//refresh"));
    assert!(stored.expires_at.unwrap() > Utc::now() + Duration::minutes(50));
}

#[tokio::test]
async fn fresh_access_token_is_returned_without_refresh() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let vault = refreshing_vault(&db, &server);
    vault
        .save(
            user,
            Provider::Gmail,
            tokens("ya29.live", Some("1//refresh"), Duration::hours(1)),
        )
        .await
        .unwrap();

    assert_eq!(vault.access_token(user, Provider::Gmail).await.unwrap(), "ya29.live");
}

#[tokio::test]
async fn expiring_before_lists_only_refreshable_credentials() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    let vault = test_vault(&db);

    vault
        .save(user, Provider::Gmail, tokens("a", Some("r"), Duration::minutes(5)))
        .await
        .unwrap();
    vault
        .save(user, Provider::GoogleDrive, tokens("b", None, Duration::minutes(5)))
        .await
        .unwrap();
    vault
        .save(user, Provider::GoogleCalendar, tokens("c", Some("r"), Duration::hours(2)))
        .await
        .unwrap();

    let due = vault
        .expiring_before(Utc::now() + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(due, vec![(user, Provider::Gmail)]);

    let unknown: Vec<(Uuid, Provider)> = vault
        .expiring_before(Utc::now() - Duration::days(1))
        .await
        .unwrap();
    assert!(unknown.is_empty());
}

#[tokio::test]
async fn refresh_sweep_counts_failures_without_stopping() {
    let db = setup_test_db_arc().await.unwrap();
    let user = insert_user(&db, "lawyer@example.com").await.unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=good-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.renewed",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("refresh_token=revoked-refresh"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant"
        })))
        .mount(&server)
        .await;

    let vault = Arc::new(refreshing_vault(&db, &server));
    vault
        .save(user, Provider::Gmail, tokens("old", Some("good-refresh"), Duration::minutes(2)))
        .await
        .unwrap();
    vault
        .save(
            user,
            Provider::GoogleDrive,
            tokens("old", Some("revoked-refresh"), Duration::minutes(2)),
        )
        .await
        .unwrap();

    let service = TokenRefreshService::new(vault.clone(), TokenRefreshConfig::default());
    let stats = service.tick(Utc::now()).await.unwrap();

    assert_eq!(
        stats,
        RefreshStats {
            attempted: 2,
            succeeded: 1,
            failed: 1
        }
    );
    assert_eq!(
        vault.load(user, Provider::Gmail).await.unwrap().access_token,
        "ya29.renewed"
    );
    assert_eq!(
        vault.load(user, Provider::GoogleDrive).await.unwrap().access_token,
        "old"
    );
}
