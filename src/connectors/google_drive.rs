//! Google Drive connector
//!
//! Lists files modified inside the look-back window. Each modification is its
//! own activity: the source id pairs the file id with its `modifiedTime`, so a
//! file edited again later produces a new row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::json;
use url::Url;
use uuid::Uuid;

use crate::connectors::metadata::{DOCUMENT_DEFAULT_MINUTES, GOOGLE_DRIVE_SCOPES};
use crate::connectors::{ActivityConnector, ConnectorContext, ConnectorError, RawEvent, google};
use crate::models::{ActivityType, Provider};
use crate::oauth::GoogleOAuthClient;

const FILE_FIELDS: &str = "files(id,name,mimeType,modifiedTime,webViewLink)";

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: Option<String>,
    mime_type: Option<String>,
    /// Kept verbatim; it is part of the dedup key
    modified_time: Option<String>,
    web_view_link: Option<String>,
}

impl DriveFile {
    fn source_id(&self) -> String {
        format!("{}:{}", self.id, self.modified_time.as_deref().unwrap_or(""))
    }
}

pub struct GoogleDriveConnector {
    ctx: ConnectorContext,
    oauth: Arc<GoogleOAuthClient>,
    api_base: String,
}

impl GoogleDriveConnector {
    pub fn new(ctx: ConnectorContext, oauth: Arc<GoogleOAuthClient>, api_base: &str) -> Self {
        Self {
            ctx,
            oauth,
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn list_files(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<DriveFile>, ConnectorError> {
        let url = format!("{}/files", self.api_base);
        let query = format!(
            "modifiedTime > '{}' and trashed = false",
            since.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let page_size = self.ctx.page_size.to_string();
        let request = self.ctx.http_client.get(&url).query(&[
            ("q", query.as_str()),
            ("orderBy", "modifiedTime desc"),
            ("pageSize", page_size.as_str()),
            ("fields", FILE_FIELDS),
        ]);

        let response = google::send(Provider::GoogleDrive, request, access_token).await?;
        let list: FileList = google::json(Provider::GoogleDrive, response).await?;
        Ok(list.files)
    }
}

fn map_file(user_id: Uuid, file: DriveFile) -> Result<RawEvent, ConnectorError> {
    let modified = file.modified_time.as_deref().ok_or_else(|| {
        ConnectorError::ValidationFailure {
            provider: Provider::GoogleDrive,
            details: format!("file {} has no modifiedTime", file.id),
        }
    })?;
    let occurred_at = DateTime::parse_from_rfc3339(modified)
        .map_err(|e| ConnectorError::ValidationFailure {
            provider: Provider::GoogleDrive,
            details: format!("file {} modifiedTime '{}': {}", file.id, modified, e),
        })?
        .with_timezone(&Utc);

    let name = file
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "Untitled document".to_string());

    Ok(RawEvent {
        user_id,
        provider: Provider::GoogleDrive,
        activity_type: ActivityType::Document,
        occurred_at,
        duration_minutes: Some(DOCUMENT_DEFAULT_MINUTES),
        subject: Some(name.clone()),
        description: Some(format!("Document edited: {}", name)),
        source_id: file.source_id(),
        metadata: json!({
            "file_id": file.id,
            "mime_type": file.mime_type,
            "web_view_link": file.web_view_link,
        }),
    })
}

#[async_trait]
impl ActivityConnector for GoogleDriveConnector {
    fn provider(&self) -> Provider {
        Provider::GoogleDrive
    }

    fn scopes(&self) -> &'static [&'static str] {
        GOOGLE_DRIVE_SCOPES
    }

    fn auth_url(&self, _user_id: Uuid, state: &str) -> Url {
        self.oauth
            .authorize_url(Provider::GoogleDrive, GOOGLE_DRIVE_SCOPES, state)
    }

    #[tracing::instrument(skip(self), fields(provider = "google_drive"))]
    async fn fetch_recent(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<RawEvent>, ConnectorError> {
        let access_token = self.ctx.access_token(user_id, Provider::GoogleDrive).await?;

        let files = self.list_files(&access_token, since).await?;
        let keyed: Vec<(String, DriveFile)> = files.into_iter().map(|f| (f.source_id(), f)).collect();
        let fresh = self
            .ctx
            .retain_new(user_id, Provider::GoogleDrive, keyed, |(key, _)| key.as_str())
            .await?;

        let mut events = Vec::with_capacity(fresh.len());
        for (key, file) in fresh {
            match map_file(user_id, file) {
                Ok(event) => events.push(event),
                Err(error) => {
                    tracing::warn!(%user_id, source_id = %key, error = %error, "Skipping drive file");
                }
            }
        }

        tracing::debug!(%user_id, count = events.len(), "Fetched edited documents");
        Ok(events)
    }
}
