//! Provider identifiers
//!
//! The set of external sources the capture pipeline can pull activity from.
//! Stored as its slug in `credentials`, `oauth_states` and `raw_activities`.

use std::fmt;
use std::str::FromStr;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// External activity provider
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Sent mail via the Gmail API
    #[sea_orm(string_value = "gmail")]
    Gmail,
    /// Events via the Google Calendar API
    #[sea_orm(string_value = "google_calendar")]
    GoogleCalendar,
    /// Edited files via the Google Drive API
    #[sea_orm(string_value = "google_drive")]
    GoogleDrive,
}

impl Provider {
    pub fn slug(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::GoogleCalendar => "google_calendar",
            Provider::GoogleDrive => "google_drive",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Provider::Gmail => "Gmail",
            Provider::GoogleCalendar => "Google Calendar",
            Provider::GoogleDrive => "Google Drive",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Returned when a path or header names a provider we do not support.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported provider '{0}'")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gmail" => Ok(Provider::Gmail),
            "google_calendar" => Ok(Provider::GoogleCalendar),
            "google_drive" => Ok(Provider::GoogleDrive),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}
