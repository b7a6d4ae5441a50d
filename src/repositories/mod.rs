//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM operations
//! for database entities, providing a user-scoped API for data access.

pub mod activity;
pub mod engagement;
pub mod oauth_state;
pub mod suggestion;
pub mod sync_job;
pub mod user;

pub use activity::ActivityRepository;
pub use engagement::{EngagementCandidate, EngagementRepository};
pub use oauth_state::OAuthStateRepository;
pub use suggestion::{CreateOutcome, LifecycleError, NewSuggestion, SuggestionRepository};
pub use sync_job::{JobCompletion, NOT_CONNECTED_KEY, ProviderFailure, SyncJobRepository};
pub use user::UserRepository;
