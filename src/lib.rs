//! # Time Capture Library
//!
//! Pulls a user's sent mail, calendar events and edited documents from their
//! connected providers and turns each activity into a suggested billable time
//! entry matched against the user's active engagements.

pub mod auth;
pub mod config;
pub mod connectors;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod oauth;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod suggestions;
pub mod sync_executor;
pub mod telemetry;
pub mod token_refresh;
pub mod vault;
pub use migration;
