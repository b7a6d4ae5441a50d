//! # Data Models
//!
//! SeaORM entities and the value types shared across the capture pipeline.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod client;
pub mod credential;
pub mod engagement;
pub mod oauth_state;
pub mod provider;
pub mod raw_activity;
pub mod suggested_entry;
pub mod sync_job;
pub mod user;

pub use client::Entity as Client;
pub use credential::Entity as Credential;
pub use engagement::Entity as Engagement;
pub use oauth_state::Entity as OAuthState;
pub use provider::Provider;
pub use raw_activity::{ActivityType, Entity as RawActivity};
pub use suggested_entry::{Entity as SuggestedEntry, EntryStatus, TaskCategory};
pub use sync_job::{Entity as SyncJob, SyncJobStatus, SyncTrigger};
pub use user::Entity as User;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "timecapture".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
