//! HTTP API tests against a served router with scripted connectors

use std::sync::Arc;

use anyhow::{Context, Result as AnyhowResult};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use sea_orm::DatabaseConnection;
use serde_json::Value;
use timecapture::config::AppConfig;
use timecapture::connectors::Registry;
use timecapture::models::{EntryStatus, Provider};
use timecapture::oauth::{OAuthError, TokenExchanger};
use timecapture::repositories::ActivityRepository;
use timecapture::server::{AppState, create_app};
use timecapture::vault::TokenSet;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{
    Script, ScriptedConnector, insert_client, insert_engagement, insert_user, raw_event,
    setup_test_db_arc, test_vault,
};

const TOKEN: &str = "operator-token";

/// Token endpoint that accepts any code
struct FakeExchanger;

#[async_trait]
impl TokenExchanger for FakeExchanger {
    async fn exchange_code(&self, _provider: Provider, code: &str) -> Result<TokenSet, OAuthError> {
        Ok(TokenSet {
            access_token: format!("access-for-{}", code),
            refresh_token: Some("refresh".to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenSet, OAuthError> {
        Err(OAuthError::Configuration("refresh not scripted".to_string()))
    }
}

struct TestApp {
    url: String,
    db: Arc<DatabaseConnection>,
    state: AppState,
    client: reqwest::Client,
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<AnyhowResult<()>>>,
}

impl TestApp {
    async fn spawn() -> Self {
        let db = setup_test_db_arc().await.unwrap();
        let config = AppConfig {
            operator_tokens: vec![TOKEN.to_string()],
            ..Default::default()
        };

        let mut registry = Registry::new();
        for provider in [Provider::Gmail, Provider::GoogleCalendar, Provider::GoogleDrive] {
            registry.register(ScriptedConnector::new(provider, Script::Events(Vec::new())));
        }

        let state = AppState::with_components(
            Arc::new(config),
            db.clone(),
            test_vault(&db),
            Arc::new(FakeExchanger),
            Arc::new(registry),
        );
        let app = create_app(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let join_handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            let _ = ready_tx.send(());
            server.await.context("axum server error")
        });
        ready_rx.await.expect("server task to signal readiness");

        Self {
            url: format!("http://{}", addr),
            db,
            state,
            client: reqwest::Client::new(),
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        }
    }

    fn get(&self, path: &str, user: Uuid) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.url, path))
            .bearer_auth(TOKEN)
            .header("X-User-Id", user.to_string())
    }

    fn post(&self, path: &str, user: Uuid) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.url, path))
            .bearer_auth(TOKEN)
            .header("X-User-Id", user.to_string())
    }

    async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.join_handle.take() {
            handle.await.unwrap().unwrap();
        }
    }
}

#[tokio::test]
async fn public_endpoints_need_no_token() {
    let app = TestApp::spawn().await;

    for path in ["/", "/healthz", "/readyz", "/providers", "/openapi.json"] {
        let response = app
            .client
            .get(format!("{}{}", app.url, path))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", path);
    }

    app.shutdown().await;
}

#[tokio::test]
async fn providers_are_listed_with_scopes() {
    let app = TestApp::spawn().await;

    let body: Value = app
        .client
        .get(format!("{}/providers", app.url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 3);
    assert_eq!(providers[0]["provider"], "gmail");
    assert_eq!(providers[0]["activity_type"], "email");
    assert_eq!(
        providers[0]["scopes"][0],
        "https://www.googleapis.com/auth/gmail.readonly"
    );
    assert_eq!(providers[2]["display_name"], "Google Drive");

    app.shutdown().await;
}

#[tokio::test]
async fn openapi_documents_bearer_auth() {
    let app = TestApp::spawn().await;

    let doc: Value = app
        .client
        .get(format!("{}/openapi.json", app.url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(
        doc["components"]["securitySchemes"]["bearer_auth"]["scheme"],
        "bearer"
    );
    assert!(doc["paths"]["/suggestions/{id}/approve"].is_object());

    app.shutdown().await;
}

#[tokio::test]
async fn protected_routes_require_token_and_user() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/sync", app.url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()["content-type"],
        "application/problem+json"
    );

    let response = app
        .client
        .post(format!("{}/sync", app.url))
        .bearer_auth("wrong")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .client
        .post(format!("{}/sync", app.url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_FAILED");

    app.shutdown().await;
}

#[tokio::test]
async fn manual_sync_is_queued_and_listed() {
    let app = TestApp::spawn().await;
    let user = insert_user(&app.db, "lawyer@example.com").await.unwrap();

    let response = app.post("/sync", user).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "sync started");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let jobs: Value = app
        .get("/jobs", user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let jobs = jobs["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], job_id);
    assert_eq!(jobs[0]["trigger"], "manual");
    assert_eq!(jobs[0]["status"], "queued");

    app.shutdown().await;
}

#[tokio::test]
async fn suggestions_move_through_the_lifecycle() {
    let app = TestApp::spawn().await;
    let user = insert_user(&app.db, "lawyer@example.com").await.unwrap();
    let client = insert_client(&app.db, user, "Acme Corp", None).await.unwrap();
    insert_engagement(&app.db, Uuid::from_u128(1), user, client, "Acme Merger", None, 30_000)
        .await
        .unwrap();
    ActivityRepository::new(app.db.clone())
        .upsert(&raw_event(
            user,
            Provider::Gmail,
            "msg-1",
            "Acme contract review",
            None,
            None,
            Utc::now(),
        ))
        .await
        .unwrap();
    app.state.suggestion_engine().process_user(user).await.unwrap();

    let listed: Value = app
        .get("/suggestions", user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let suggestions = listed["suggestions"].as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0]["status"], "suggested");
    assert_eq!(suggestions[0]["amount_cents"], 7_500);
    let id = suggestions[0]["id"].as_str().unwrap().to_string();

    let response = app
        .post(&format!("/suggestions/{}/bill", id), user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(&format!("/suggestions/{}/approve", id), user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let approved: Value = response.json().await.unwrap();
    assert_eq!(approved["status"], "approved");

    let response = app
        .post(&format!("/suggestions/{}/bill", id), user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let billed: Value = app
        .get("/suggestions?status=billed", user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(billed["suggestions"].as_array().unwrap().len(), 1);

    let stranger = insert_user(&app.db, "other@example.com").await.unwrap();
    let response = app
        .post(&format!("/suggestions/{}/reject", id), stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .get("/suggestions?status=nonsense", user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let entries = app
        .state
        .suggestions
        .list(user, EntryStatus::Billed, 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);

    app.shutdown().await;
}

#[tokio::test]
async fn oauth_connect_flow_stores_and_removes_credential() {
    let app = TestApp::spawn().await;
    let user = insert_user(&app.db, "lawyer@example.com").await.unwrap();

    let response = app.get("/connect/gmail", user).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["provider"], "gmail");
    let authorize_url = url::Url::parse(body["authorize_url"].as_str().unwrap()).unwrap();
    let state = authorize_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .expect("state parameter");

    let response = app
        .get("/connect/gmail/callback?code=abc&state=forged", user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_state");

    // a state issued for gmail is not valid on another provider's callback
    let response = app
        .get(
            &format!("/connect/google_drive/callback?code=abc&state={}", state),
            user,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .get(&format!("/connect/gmail/callback?code=abc&state={}", state), user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "connected");

    // single use
    let response = app
        .get(&format!("/connect/gmail/callback?code=abc&state={}", state), user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let stored = app.state.vault.load(user, Provider::Gmail).await.unwrap();
    assert_eq!(stored.access_token, "access-for-abc");

    let connections: Value = app
        .get("/connections", user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let connections = connections["connections"].as_array().unwrap();
    assert_eq!(connections.len(), 1);
    assert_eq!(connections[0]["provider"], "gmail");
    assert!(connections[0].get("access_token").is_none());

    let delete = |app: &TestApp| {
        app.client
            .delete(format!("{}/connections/gmail", app.url))
            .bearer_auth(TOKEN)
            .header("X-User-Id", user.to_string())
    };
    assert_eq!(delete(&app).send().await.unwrap().status(), StatusCode::NO_CONTENT);
    assert_eq!(delete(&app).send().await.unwrap().status(), StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let app = TestApp::spawn().await;
    let user = insert_user(&app.db, "lawyer@example.com").await.unwrap();

    let response = app.get("/connect/dropbox", user).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn declined_consent_is_reported() {
    let app = TestApp::spawn().await;
    let user = insert_user(&app.db, "lawyer@example.com").await.unwrap();

    let body: Value = app
        .get("/connect/google_calendar", user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let authorize_url = url::Url::parse(body["authorize_url"].as_str().unwrap()).unwrap();
    let (_, state) = authorize_url
        .query_pairs()
        .find(|(k, _)| k == "state")
        .unwrap();

    let response = app
        .get(
            &format!(
                "/connect/google_calendar/callback?error=access_denied&state={}",
                state
            ),
            user,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "CONSENT_DENIED");
    assert!(app.state.vault.list_connected(user).await.unwrap().is_empty());

    app.shutdown().await;
}
