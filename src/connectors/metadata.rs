//! Provider metadata
//!
//! Static facts about each supported provider: the activity type it yields,
//! the OAuth scopes it needs and the default duration its items carry.

use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{ActivityType, Provider};

pub const GMAIL_SCOPES: &[&str] = &["https://www.googleapis.com/auth/gmail.readonly"];
pub const GOOGLE_CALENDAR_SCOPES: &[&str] =
    &["https://www.googleapis.com/auth/calendar.readonly"];
pub const GOOGLE_DRIVE_SCOPES: &[&str] =
    &["https://www.googleapis.com/auth/drive.metadata.readonly"];

/// Default duration stamped on sent email
pub const EMAIL_DEFAULT_MINUTES: i32 = 15;
/// Default duration stamped on an edited document
pub const DOCUMENT_DEFAULT_MINUTES: i32 = 30;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProviderMetadata {
    pub provider: Provider,
    pub display_name: &'static str,
    pub activity_type: ActivityType,
    #[schema(value_type = Vec<String>)]
    pub scopes: &'static [&'static str],
}

impl ProviderMetadata {
    pub fn for_provider(provider: Provider) -> Self {
        let (activity_type, scopes) = match provider {
            Provider::Gmail => (ActivityType::Email, GMAIL_SCOPES),
            Provider::GoogleCalendar => (ActivityType::Meeting, GOOGLE_CALENDAR_SCOPES),
            Provider::GoogleDrive => (ActivityType::Document, GOOGLE_DRIVE_SCOPES),
        };
        Self {
            provider,
            display_name: provider.display_name(),
            activity_type,
            scopes,
        }
    }
}
