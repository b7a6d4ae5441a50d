//! Gmail connector
//!
//! Pulls the user's sent mail through the Gmail API. One `messages.list` call
//! finds recent sent message ids, then a metadata-only `messages.get` per new
//! message reads the recipients and subject.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use crate::connectors::metadata::{EMAIL_DEFAULT_MINUTES, GMAIL_SCOPES};
use crate::connectors::{ActivityConnector, ConnectorContext, ConnectorError, RawEvent, google};
use crate::models::{ActivityType, Provider};
use crate::oauth::GoogleOAuthClient;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GmailMessage {
    id: String,
    thread_id: Option<String>,
    /// Milliseconds since the epoch, as a string
    internal_date: Option<String>,
    snippet: Option<String>,
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

impl GmailMessage {
    fn header(&self, name: &str) -> Option<&str> {
        self.payload.as_ref().and_then(|p| {
            p.headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case(name))
                .map(|h| h.value.as_str())
        })
    }
}

pub struct GmailConnector {
    ctx: ConnectorContext,
    oauth: Arc<GoogleOAuthClient>,
    api_base: String,
}

impl GmailConnector {
    pub fn new(ctx: ConnectorContext, oauth: Arc<GoogleOAuthClient>, api_base: &str) -> Self {
        Self {
            ctx,
            oauth,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn list_sent(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<MessageRef>, ConnectorError> {
        let url = format!("{}/users/me/messages", self.api_base);
        let query = format!("in:sent after:{}", since.timestamp());
        let max_results = self.ctx.page_size.to_string();
        let request = self.ctx.http_client.get(&url).query(&[
            ("q", query.as_str()),
            ("maxResults", max_results.as_str()),
        ]);

        let response = google::send(Provider::Gmail, request, access_token).await?;
        let list: MessageList = google::json(Provider::Gmail, response).await?;
        Ok(list.messages)
    }

    async fn get_message(
        &self,
        access_token: &str,
        id: &str,
    ) -> Result<GmailMessage, ConnectorError> {
        let url = format!("{}/users/me/messages/{}", self.api_base, id);
        let request = self.ctx.http_client.get(&url).query(&[
            ("format", "metadata"),
            ("metadataHeaders", "To"),
            ("metadataHeaders", "Subject"),
        ]);

        let response = google::send(Provider::Gmail, request, access_token).await?;
        google::json(Provider::Gmail, response).await
    }
}

fn map_message(user_id: Uuid, message: GmailMessage) -> Result<RawEvent, ConnectorError> {
    let invalid = |details: String| ConnectorError::ValidationFailure {
        provider: Provider::Gmail,
        details,
    };

    let millis: i64 = message
        .internal_date
        .as_deref()
        .ok_or_else(|| invalid(format!("message {} has no internalDate", message.id)))?
        .parse()
        .map_err(|_| invalid(format!("message {} has a non-numeric internalDate", message.id)))?;
    let occurred_at = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| invalid(format!("message {} internalDate out of range", message.id)))?;

    let to = message.header("To").unwrap_or("unknown recipient").to_string();
    let subject = message
        .header("Subject")
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty());

    Ok(RawEvent {
        user_id,
        provider: Provider::Gmail,
        activity_type: ActivityType::Email,
        occurred_at,
        duration_minutes: Some(EMAIL_DEFAULT_MINUTES),
        subject,
        description: Some(format!("Email sent to {}", to)),
        metadata: json!({
            "to": to,
            "thread_id": message.thread_id,
            "snippet": message.snippet,
        }),
        source_id: message.id,
    })
}

#[async_trait]
impl ActivityConnector for GmailConnector {
    fn provider(&self) -> Provider {
        Provider::Gmail
    }

    fn scopes(&self) -> &'static [&'static str] {
        GMAIL_SCOPES
    }

    fn auth_url(&self, _user_id: Uuid, state: &str) -> Url {
        self.oauth.authorize_url(Provider::Gmail, GMAIL_SCOPES, state)
    }

    #[tracing::instrument(skip(self), fields(provider = "gmail"))]
    async fn fetch_recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, ConnectorError> {
        let access_token = self.ctx.access_token(user_id, Provider::Gmail).await?;

        let refs = self.list_sent(&access_token, since).await?;
        let fresh = self
            .ctx
            .retain_new(user_id, Provider::Gmail, refs, |r| r.id.as_str())
            .await?;

        let mut events = Vec::with_capacity(fresh.len());
        for message_ref in fresh {
            let message = match self.get_message(&access_token, &message_ref.id).await {
                Ok(message) => message,
                Err(error @ ConnectorError::ValidationFailure { .. }) => {
                    tracing::warn!(%user_id, message_id = %message_ref.id, error = %error, "Skipping undecodable message");
                    continue;
                }
                Err(error) => return Err(error),
            };
            match map_message(user_id, message) {
                Ok(event) => events.push(event),
                Err(error) => {
                    tracing::warn!(%user_id, message_id = %message_ref.id, error = %error, "Skipping malformed message");
                }
            }
        }

        tracing::debug!(%user_id, count = events.len(), "Fetched sent mail");
        Ok(events)
    }
}
