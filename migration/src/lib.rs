//! Database migrations for the timecapture service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_09_01_000001_create_users;
mod m2026_09_01_000002_create_credentials;
mod m2026_09_01_000003_create_oauth_states;
mod m2026_09_01_000004_create_clients_and_engagements;
mod m2026_09_01_000005_create_raw_activities;
mod m2026_09_01_000006_create_suggested_entries;
mod m2026_09_01_000007_create_sync_jobs;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_09_01_000001_create_users::Migration),
            Box::new(m2026_09_01_000002_create_credentials::Migration),
            Box::new(m2026_09_01_000003_create_oauth_states::Migration),
            Box::new(m2026_09_01_000004_create_clients_and_engagements::Migration),
            Box::new(m2026_09_01_000005_create_raw_activities::Migration),
            Box::new(m2026_09_01_000006_create_suggested_entries::Migration),
            Box::new(m2026_09_01_000007_create_sync_jobs::Migration),
        ]
    }
}
