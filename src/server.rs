//! # Server Configuration
//!
//! Application state, the Axum router, and the serve loop that runs the HTTP
//! API alongside the sync scheduler, the worker pool and the token refresher.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router, middleware,
    routing::{delete, get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::connectors::{ConnectorContext, Registry};
use crate::crypto::{AesGcmCipher, CryptoKey};
use crate::handlers;
use crate::oauth::{GoogleOAuthClient, TokenExchanger};
use crate::repositories::{
    ActivityRepository, EngagementRepository, OAuthStateRepository, SuggestionRepository,
    SyncJobRepository, UserRepository,
};
use crate::scheduler::{SyncScheduler, SystemClock};
use crate::suggestions::SuggestionEngine;
use crate::sync_executor::{ExecutorConfig, SyncExecutor};
use crate::telemetry::trace_context_middleware;
use crate::token_refresh::TokenRefreshService;
use crate::vault::TokenVault;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub vault: Arc<TokenVault>,
    pub oauth: Arc<dyn TokenExchanger>,
    pub registry: Arc<Registry>,
    pub oauth_states: OAuthStateRepository,
    pub suggestions: SuggestionRepository,
    pub jobs: SyncJobRepository,
    pub scheduler: SyncScheduler,
}

impl AppState {
    /// Wires the Google-backed connectors, vault and repositories
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        crypto_key: CryptoKey,
    ) -> Result<Self> {
        let google = Arc::new(
            GoogleOAuthClient::from_config(&config.google)
                .context("Failed to build Google OAuth client")?,
        );
        let vault = Arc::new(
            TokenVault::new(Arc::clone(&db), Arc::new(AesGcmCipher::new(crypto_key)))
                .with_refresher(google.clone()),
        );
        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to build provider HTTP client")?;
        let ctx = ConnectorContext {
            http_client,
            vault: Arc::clone(&vault),
            activities: ActivityRepository::new(Arc::clone(&db)),
            page_size: config.scheduler.page_size,
        };
        let registry = Arc::new(Registry::google(&config.google, ctx, google.clone()));

        Ok(Self::with_components(config, db, vault, google, registry))
    }

    /// Builds the state around externally supplied vault, token endpoint and
    /// connectors
    pub fn with_components(
        config: Arc<AppConfig>,
        db: Arc<DatabaseConnection>,
        vault: Arc<TokenVault>,
        oauth: Arc<dyn TokenExchanger>,
        registry: Arc<Registry>,
    ) -> Self {
        let jobs = SyncJobRepository::new(Arc::clone(&db));
        let scheduler = SyncScheduler::new(
            Arc::new(SystemClock),
            Arc::new(jobs.clone()),
            Arc::new(UserRepository::new(Arc::clone(&db))),
            config.scheduler.interval_seconds,
        );

        Self {
            oauth_states: OAuthStateRepository::new(Arc::clone(&db)),
            suggestions: SuggestionRepository::new(Arc::clone(&db)),
            jobs,
            scheduler,
            config,
            db,
            vault,
            oauth,
            registry,
        }
    }

    pub fn suggestion_engine(&self) -> SuggestionEngine {
        SuggestionEngine::new(
            ActivityRepository::new(Arc::clone(&self.db)),
            EngagementRepository::new(Arc::clone(&self.db)),
            self.suggestions.clone(),
        )
    }

    /// Worker pool draining the sync job queue
    pub fn executor(&self) -> SyncExecutor {
        SyncExecutor::new(
            Arc::clone(&self.registry),
            ActivityRepository::new(Arc::clone(&self.db)),
            self.suggestion_engine(),
            self.jobs.clone(),
            ExecutorConfig::from(&self.config.scheduler),
        )
    }

    pub fn token_refresher(&self) -> TokenRefreshService {
        TokenRefreshService::new(Arc::clone(&self.vault), self.config.token_refresh.clone())
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/sync", post(handlers::sync::trigger_sync))
        .route("/suggestions", get(handlers::suggestions::list_suggestions))
        .route(
            "/suggestions/{id}/approve",
            post(handlers::suggestions::approve_suggestion),
        )
        .route(
            "/suggestions/{id}/reject",
            post(handlers::suggestions::reject_suggestion),
        )
        .route(
            "/suggestions/{id}/bill",
            post(handlers::suggestions::bill_suggestion),
        )
        .route("/connect/{provider}", get(handlers::connect::start_oauth))
        .route(
            "/connect/{provider}/callback",
            get(handlers::connect::oauth_callback),
        )
        .route(
            "/connections",
            get(handlers::connections::list_connections),
        )
        .route(
            "/connections/{provider}",
            delete(handlers::connections::delete_connection),
        )
        .route("/jobs", get(handlers::jobs::list_jobs))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/providers", get(handlers::connections::list_providers))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_context_middleware))
}

/// Starts the server and background workers, returning after a graceful
/// shutdown on ctrl-c
pub async fn run_server(config: AppConfig, db: DatabaseConnection, crypto_key: CryptoKey) -> Result<()> {
    let addr = config.bind_addr().context("Invalid server address")?;
    let state = AppState::new(Arc::new(config), Arc::new(db), crypto_key)?;

    let shutdown = CancellationToken::new();
    let workers = [
        tokio::spawn(state.scheduler.clone().run(shutdown.clone())),
        tokio::spawn(state.executor().run(shutdown.clone())),
        tokio::spawn(state.token_refresher().run(shutdown.clone())),
    ];

    let profile = state.config.profile.clone();
    let app = create_app(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(%addr, profile = %profile, "Server listening");

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %err, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        })
        .await
        .context("HTTP server error")?;

    shutdown.cancel();
    for worker in workers {
        if let Err(err) = worker.await {
            tracing::error!(error = %err, "Background worker panicked");
        }
    }
    tracing::info!("Server stopped");

    Ok(())
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::readyz,
        crate::handlers::sync::trigger_sync,
        crate::handlers::suggestions::list_suggestions,
        crate::handlers::suggestions::approve_suggestion,
        crate::handlers::suggestions::reject_suggestion,
        crate::handlers::suggestions::bill_suggestion,
        crate::handlers::connect::start_oauth,
        crate::handlers::connect::oauth_callback,
        crate::handlers::connections::list_providers,
        crate::handlers::connections::list_connections,
        crate::handlers::connections::delete_connection,
        crate::handlers::jobs::list_jobs,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::models::Provider,
            crate::models::EntryStatus,
            crate::models::TaskCategory,
            crate::models::SyncTrigger,
            crate::models::SyncJobStatus,
            crate::error::ApiError,
            crate::handlers::HealthResponse,
            crate::handlers::sync::SyncStartedResponse,
            crate::handlers::suggestions::SuggestionInfo,
            crate::handlers::suggestions::SuggestionsResponse,
            crate::handlers::connect::AuthorizeUrlResponse,
            crate::handlers::connect::CallbackResponse,
            crate::models::ActivityType,
            crate::connectors::ProviderMetadata,
            crate::handlers::connections::ProvidersResponse,
            crate::handlers::connections::ConnectionsResponse,
            crate::vault::ConnectionSummary,
            crate::handlers::jobs::JobInfo,
            crate::handlers::jobs::JobsResponse,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Time Capture API",
        description = "Turns provider activity into suggested billable time entries",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
