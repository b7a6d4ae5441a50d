//! Google Calendar connector
//!
//! Reads the primary calendar's events inside the look-back window with
//! `events.list`. Recurring events are expanded (`singleEvents=true`) so each
//! occurrence is its own activity with its own id. The API only orders
//! ascending by start time, so every page of the window is read and the
//! newest events are kept.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use crate::connectors::metadata::GOOGLE_CALENDAR_SCOPES;
use crate::connectors::{ActivityConnector, ConnectorContext, ConnectorError, RawEvent, google};
use crate::models::{ActivityType, Provider};
use crate::oauth::GoogleOAuthClient;

/// Attendee emails listed in the meeting description
const MAX_LISTED_ATTENDEES: usize = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarEvent {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    location: Option<String>,
    html_link: Option<String>,
    start: Option<EventTime>,
    end: Option<EventTime>,
    #[serde(default)]
    attendees: Vec<Attendee>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    /// Absent for all-day events, which only carry `date`
    date_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Attendee {
    email: Option<String>,
    #[serde(default, rename = "self")]
    is_self: bool,
}

pub struct GoogleCalendarConnector {
    ctx: ConnectorContext,
    oauth: Arc<GoogleOAuthClient>,
    api_base: String,
}

impl GoogleCalendarConnector {
    pub fn new(ctx: ConnectorContext, oauth: Arc<GoogleOAuthClient>, api_base: &str) -> Self {
        Self {
            ctx,
            oauth,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    /// Every non-cancelled event starting in `[since, until)`, oldest first
    async fn list_events(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, ConnectorError> {
        let url = format!("{}/calendars/primary/events", self.api_base);
        let time_min = since.to_rfc3339();
        let time_max = until.to_rfc3339();
        let max_results = self.ctx.page_size.to_string();

        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("timeMin", time_min.as_str()),
                ("timeMax", time_max.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("maxResults", max_results.as_str()),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let request = self.ctx.http_client.get(&url).query(&query);

            let response = google::send(Provider::GoogleCalendar, request, access_token).await?;
            let page: EventList = google::json(Provider::GoogleCalendar, response).await?;
            items.extend(
                page.items
                    .into_iter()
                    .filter(|e| e.status.as_deref() != Some("cancelled")),
            );

            match page.next_page_token {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next)
                }
                _ => break,
            }
        }
        Ok(items)
    }
}

/// Newest `cap` events, most recent first
fn newest_first(mut items: Vec<CalendarEvent>, cap: usize) -> Vec<CalendarEvent> {
    items.reverse();
    items.truncate(cap);
    items
}

fn map_event(user_id: Uuid, event: CalendarEvent) -> Result<RawEvent, ConnectorError> {
    let invalid = |details: String| ConnectorError::ValidationFailure {
        provider: Provider::GoogleCalendar,
        details,
    };

    let start = event
        .start
        .as_ref()
        .and_then(|t| t.date_time)
        .ok_or_else(|| invalid(format!("event {} has no start time", event.id)))?;
    let end = event
        .end
        .as_ref()
        .and_then(|t| t.date_time)
        .ok_or_else(|| invalid(format!("event {} has no end time", event.id)))?;
    if end < start {
        return Err(invalid(format!("event {} ends before it starts", event.id)));
    }
    let duration_minutes = i32::try_from((end - start).num_minutes())
        .map_err(|_| invalid(format!("event {} is too long", event.id)))?;

    let title = event
        .summary
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "Untitled meeting".to_string());
    let attendees: Vec<String> = event
        .attendees
        .iter()
        .filter(|a| !a.is_self)
        .filter_map(|a| a.email.clone())
        .collect();

    let mut description = format!("Meeting: {}", title);
    if !attendees.is_empty() {
        let listed: Vec<&str> = attendees
            .iter()
            .take(MAX_LISTED_ATTENDEES)
            .map(String::as_str)
            .collect();
        description.push_str(&format!(" (Attendees: {})", listed.join(", ")));
    }

    Ok(RawEvent {
        user_id,
        provider: Provider::GoogleCalendar,
        activity_type: ActivityType::Meeting,
        occurred_at: start,
        duration_minutes: Some(duration_minutes),
        subject: Some(title),
        description: Some(description),
        metadata: json!({
            "end": end,
            "attendees": attendees,
            "location": event.location,
            "html_link": event.html_link,
        }),
        source_id: event.id,
    })
}

#[async_trait]
impl ActivityConnector for GoogleCalendarConnector {
    fn provider(&self) -> Provider {
        Provider::GoogleCalendar
    }

    fn scopes(&self) -> &'static [&'static str] {
        GOOGLE_CALENDAR_SCOPES
    }

    fn auth_url(&self, _user_id: Uuid, state: &str) -> Url {
        self.oauth
            .authorize_url(Provider::GoogleCalendar, GOOGLE_CALENDAR_SCOPES, state)
    }

    #[tracing::instrument(skip(self), fields(provider = "google_calendar"))]
    async fn fetch_recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, ConnectorError> {
        let access_token = self
            .ctx
            .access_token(user_id, Provider::GoogleCalendar)
            .await?;

        let items = self.list_events(&access_token, since, Utc::now()).await?;
        let items = newest_first(items, self.ctx.page_size as usize);

        let fresh = self
            .ctx
            .retain_new(user_id, Provider::GoogleCalendar, items, |e| e.id.as_str())
            .await?;

        let mut events = Vec::with_capacity(fresh.len());
        for item in fresh {
            let event_id = item.id.clone();
            match map_event(user_id, item) {
                Ok(event) => events.push(event),
                Err(error) => {
                    tracing::warn!(%user_id, %event_id, error = %error, "Skipping calendar event");
                }
            }
        }

        tracing::debug!(%user_id, count = events.len(), "Fetched calendar events");
        Ok(events)
    }
}
