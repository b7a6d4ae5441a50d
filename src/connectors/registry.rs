//! Connector registry
//!
//! Ordered set of activity connectors. Sync jobs run them in registration
//! order; handlers look them up by provider.

use std::sync::Arc;

use crate::config::GoogleConfig;
use crate::connectors::{
    ActivityConnector, ConnectorContext, GmailConnector, GoogleCalendarConnector,
    GoogleDriveConnector,
};
use crate::models::Provider;
use crate::oauth::GoogleOAuthClient;

/// Error type for registry operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    #[error("provider '{provider}' has no registered connector")]
    ProviderNotFound { provider: Provider },
}

#[derive(Clone, Default)]
pub struct Registry {
    connectors: Vec<Arc<dyn ActivityConnector>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Email, calendar and document connectors backed by the Google APIs
    pub fn google(
        config: &GoogleConfig,
        ctx: ConnectorContext,
        oauth: Arc<GoogleOAuthClient>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(GmailConnector::new(
            ctx.clone(),
            oauth.clone(),
            &config.gmail_api_base,
        )));
        registry.register(Arc::new(GoogleCalendarConnector::new(
            ctx.clone(),
            oauth.clone(),
            &config.calendar_api_base,
        )));
        registry.register(Arc::new(GoogleDriveConnector::new(
            ctx,
            oauth,
            &config.drive_api_base,
        )));
        registry
    }

    /// Adds a connector, replacing any already registered for the same provider
    pub fn register(&mut self, connector: Arc<dyn ActivityConnector>) {
        let provider = connector.provider();
        match self.connectors.iter().position(|c| c.provider() == provider) {
            Some(index) => self.connectors[index] = connector,
            None => self.connectors.push(connector),
        }
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn ActivityConnector>, RegistryError> {
        self.connectors
            .iter()
            .find(|c| c.provider() == provider)
            .cloned()
            .ok_or(RegistryError::ProviderNotFound { provider })
    }

    pub fn connectors(&self) -> &[Arc<dyn ActivityConnector>] {
        &self.connectors
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.connectors.iter().map(|c| c.provider()).collect()
    }
}
