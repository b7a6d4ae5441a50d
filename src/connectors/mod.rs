//! Connectors module
//!
//! Activity connectors for the supported providers:
//! - The `ActivityConnector` trait and the normalized `RawEvent` shape
//! - Provider metadata and the ordered registry the sync job iterates
//! - Gmail, Google Calendar and Google Drive implementations

pub mod gmail;
pub mod google;
pub mod google_calendar;
pub mod google_drive;
pub mod metadata;
pub mod registry;
pub mod trait_;

pub use gmail::GmailConnector;
pub use google_calendar::GoogleCalendarConnector;
pub use google_drive::GoogleDriveConnector;
pub use metadata::ProviderMetadata;
pub use registry::{Registry, RegistryError};
pub use trait_::{ActivityConnector, ConnectorContext, ConnectorError, RawEvent};
