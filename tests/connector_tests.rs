//! Google connector tests against a mocked API

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::DatabaseConnection;
use serde_json::json;
use timecapture::config::GoogleConfig;
use timecapture::connectors::{
    ActivityConnector, ConnectorContext, ConnectorError, GmailConnector, GoogleCalendarConnector,
    GoogleDriveConnector,
};
use timecapture::models::{ActivityType, Provider};
use timecapture::oauth::GoogleOAuthClient;
use timecapture::repositories::ActivityRepository;
use timecapture::vault::{TokenSet, TokenVault};
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{insert_user, raw_event, setup_test_db_arc, test_vault};

struct Harness {
    db: Arc<DatabaseConnection>,
    user: Uuid,
    vault: Arc<TokenVault>,
    server: MockServer,
}

impl Harness {
    async fn new() -> Self {
        let db = setup_test_db_arc().await.unwrap();
        let user = insert_user(&db, "lawyer@example.com").await.unwrap();
        let vault = test_vault(&db);
        Self {
            db,
            user,
            vault,
            server: MockServer::start().await,
        }
    }

    async fn connect(&self, provider: Provider) {
        self.vault
            .save(
                self.user,
                provider,
                TokenSet {
                    access_token: "ya29.live".to_string(),
                    refresh_token: Some("1//refresh".to_string()),
                    expires_at: Some(Utc::now() + Duration::hours(1)),
                    scopes: vec![],
                },
            )
            .await
            .unwrap();
    }

    fn ctx(&self) -> ConnectorContext {
        ConnectorContext {
            http_client: reqwest::Client::new(),
            vault: self.vault.clone(),
            activities: ActivityRepository::new(self.db.clone()),
            page_size: 50,
        }
    }

    fn oauth(&self) -> Arc<GoogleOAuthClient> {
        let config = GoogleConfig {
            token_url: format!("{}/token", self.server.uri()),
            ..GoogleConfig::default()
        };
        Arc::new(GoogleOAuthClient::from_config(&config).unwrap())
    }

    fn gmail(&self) -> GmailConnector {
        GmailConnector::new(self.ctx(), self.oauth(), &self.server.uri())
    }
}

fn gmail_message(id: &str, to: &str, subject: &str, millis: i64) -> serde_json::Value {
    json!({
        "id": id,
        "threadId": format!("thread-{}", id),
        "internalDate": millis.to_string(),
        "snippet": "Please find attached",
        "payload": {
            "headers": [
                { "name": "To", "value": to },
                { "name": "Subject", "value": subject }
            ]
        }
    })
}

#[tokio::test]
async fn gmail_maps_sent_messages() {
    let h = Harness::new().await;
    h.connect(Provider::Gmail).await;

    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .and(header("authorization", "Bearer ya29.live"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "m2" }, { "id": "m1" }]
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/m2"))
        .and(query_param("format", "metadata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_message(
            "m2",
            "counsel@acme.com",
            "Acme contract review",
            1_772_638_200_000,
        )))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "m1" })))
        .mount(&h.server)
        .await;

    let events = h
        .gmail()
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    // m1 has no internalDate and is skipped
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.source_id, "m2");
    assert_eq!(event.activity_type, ActivityType::Email);
    assert_eq!(event.subject.as_deref(), Some("Acme contract review"));
    assert_eq!(event.description.as_deref(), Some("Email sent to counsel@acme.com"));
    assert_eq!(event.duration_minutes, Some(15));
    assert_eq!(event.occurred_at.timestamp_millis(), 1_772_638_200_000);
}

#[tokio::test]
async fn gmail_skips_messages_already_stored() {
    let h = Harness::new().await;
    h.connect(Provider::Gmail).await;
    ActivityRepository::new(h.db.clone())
        .upsert(&raw_event(
            h.user,
            Provider::Gmail,
            "m1",
            "Earlier",
            None,
            None,
            Utc::now(),
        ))
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "m1" }]
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_message(
            "m1",
            "a@b.com",
            "Earlier",
            1_772_638_200_000,
        )))
        .expect(0)
        .mount(&h.server)
        .await;

    let events = h
        .gmail()
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn calendar_lists_attendees_and_measures_duration() {
    let h = Harness::new().await;
    h.connect(Provider::GoogleCalendar).await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("singleEvents", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {
                    "id": "evt-1",
                    "status": "confirmed",
                    "summary": "Acme kickoff",
                    "start": { "dateTime": "2026-10-12T14:00:00Z" },
                    "end": { "dateTime": "2026-10-12T14:52:00Z" },
                    "attendees": [
                        { "email": "lawyer@example.com", "self": true },
                        { "email": "ceo@acme.com" },
                        { "email": "cfo@acme.com" }
                    ]
                },
                {
                    "id": "evt-2",
                    "status": "cancelled",
                    "summary": "Dropped",
                    "start": { "dateTime": "2026-10-12T16:00:00Z" },
                    "end": { "dateTime": "2026-10-12T17:00:00Z" }
                }
            ]
        })))
        .mount(&h.server)
        .await;

    let connector = GoogleCalendarConnector::new(h.ctx(), h.oauth(), &h.server.uri());
    let events = connector
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.source_id, "evt-1");
    assert_eq!(event.activity_type, ActivityType::Meeting);
    assert_eq!(event.duration_minutes, Some(52));
    assert_eq!(
        event.description.as_deref(),
        Some("Meeting: Acme kickoff (Attendees: ceo@acme.com, cfo@acme.com)")
    );
}

#[tokio::test]
async fn drive_keys_documents_by_file_and_revision() {
    let h = Harness::new().await;
    h.connect(Provider::GoogleDrive).await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [{
                "id": "1AbC",
                "name": "Acme merger memo",
                "mimeType": "application/vnd.google-apps.document",
                "modifiedTime": "2026-10-12T09:30:00.000Z",
                "webViewLink": "https://docs.google.com/document/d/1AbC"
            }]
        })))
        .mount(&h.server)
        .await;

    let connector = GoogleDriveConnector::new(h.ctx(), h.oauth(), &h.server.uri());
    let events = connector
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source_id, "1AbC:2026-10-12T09:30:00.000Z");
    assert_eq!(
        events[0].description.as_deref(),
        Some("Document edited: Acme merger memo")
    );
    assert_eq!(events[0].duration_minutes, Some(30));
}

#[tokio::test]
async fn missing_credential_is_not_connected() {
    let h = Harness::new().await;

    let err = h
        .gmail()
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::NotConnected {
            provider: Provider::Gmail
        }
    ));
}

#[tokio::test]
async fn rejected_token_is_unauthorized() {
    let h = Harness::new().await;
    h.connect(Provider::Gmail).await;

    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_grant"))
        .mount(&h.server)
        .await;

    let err = h
        .gmail()
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "unauthorized");
}

#[tokio::test]
async fn rate_limit_carries_retry_after() {
    let h = Harness::new().await;
    h.connect(Provider::Gmail).await;

    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "120"))
        .mount(&h.server)
        .await;

    let err = h
        .gmail()
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ConnectorError::ProviderRateLimited {
            retry_after_secs: 120,
            ..
        }
    ));
}

#[tokio::test]
async fn gmail_skips_an_undecodable_message_and_keeps_the_rest() {
    let h = Harness::new().await;
    h.connect(Provider::Gmail).await;

    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "m2" }, { "id": "bad" }]
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/m2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_message(
            "m2",
            "counsel@acme.com",
            "Acme contract review",
            1_772_638_200_000,
        )))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/bad"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "snippet": 5 })))
        .mount(&h.server)
        .await;

    let events = h
        .gmail()
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].source_id, "m2");
}

#[tokio::test]
async fn gmail_message_fetch_errors_other_than_decoding_still_fail_the_batch() {
    let h = Harness::new().await;
    h.connect(Provider::Gmail).await;

    Mock::given(method("GET"))
        .and(path("/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{ "id": "m1" }]
        })))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/users/me/messages/m1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&h.server)
        .await;

    let err = h
        .gmail()
        .fetch_recent(h.user, Utc::now() - Duration::days(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "rate_limited");
}

fn calendar_event(id: &str, start: &str, end: &str) -> serde_json::Value {
    json!({
        "id": id,
        "status": "confirmed",
        "summary": format!("Call {}", id),
        "start": { "dateTime": start },
        "end": { "dateTime": end }
    })
}

#[tokio::test]
async fn calendar_follows_pages_and_keeps_the_newest_events() {
    let h = Harness::new().await;
    h.connect(Provider::GoogleCalendar).await;

    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                calendar_event("evt-3", "2026-10-14T09:00:00Z", "2026-10-14T09:30:00Z"),
                calendar_event("evt-4", "2026-10-15T09:00:00Z", "2026-10-15T09:30:00Z")
            ]
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/calendars/primary/events"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                calendar_event("evt-1", "2026-10-12T09:00:00Z", "2026-10-12T09:30:00Z"),
                calendar_event("evt-2", "2026-10-13T09:00:00Z", "2026-10-13T09:30:00Z")
            ],
            "nextPageToken": "page-2"
        })))
        .mount(&h.server)
        .await;

    let mut ctx = h.ctx();
    ctx.page_size = 2;
    let connector = GoogleCalendarConnector::new(ctx, h.oauth(), &h.server.uri());
    let events = connector
        .fetch_recent(h.user, Utc::now() - Duration::days(7))
        .await
        .unwrap();

    let ids: Vec<&str> = events.iter().map(|e| e.source_id.as_str()).collect();
    assert_eq!(ids, vec!["evt-4", "evt-3"]);
}
