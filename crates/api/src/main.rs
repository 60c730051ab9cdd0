// Hearth session service
// HTTP entry point for session lifecycle and refresh token rotation

mod config;
mod handlers;
mod middleware;
mod routes;

use anyhow::Context;
use config::{Config, LogFormat, StoreBackend};
use dotenvy::dotenv;
use hearth_auth::{Clock, RefreshTokenService, SessionPolicy, SessionService, SystemClock};
use hearth_database::{Database, InMemorySessionStore, SessionRepository, SessionStore};
use middleware::ServiceKey;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

pub struct AppState {
    pub sessions: SessionService,
    pub refresh: RefreshTokenService,
    pub store: Arc<dyn SessionStore>,
    pub service_key: ServiceKey,
}

impl AppState {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
        service_key: ServiceKey,
    ) -> Self {
        Self {
            sessions: SessionService::new(store.clone(), clock.clone(), policy),
            refresh: RefreshTokenService::new(store.clone(), clock, policy),
            store,
            service_key,
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hearth_api=debug,hearth_auth=debug,tower_http=debug"));

    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn SessionStore>> {
    match config.store {
        StoreBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let database = Database::new(config.database.clone())
                .await
                .context("Failed to connect to database")?;
            database.ping().await.context("Database ping failed")?;
            database.migrate().await.context("Failed to run database migrations")?;
            tracing::info!("Database connected and migrated");
            Ok(Arc::new(SessionRepository::new(database.pool().clone())))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory session store; sessions will not survive a restart");
            Ok(Arc::new(InMemorySessionStore::new()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Hearth session service");
    tracing::info!(
        session_ttl_secs = config.policy.session_ttl().num_seconds(),
        refresh_token_ttl_secs = config.policy.refresh_token_ttl().num_seconds(),
        refresh_window_secs = config.policy.refresh_window().num_seconds(),
        "Session policy loaded"
    );

    let store = connect_store(&config).await?;
    let state = Arc::new(AppState::new(
        store,
        Arc::new(SystemClock),
        config.policy,
        config.service_key.clone(),
    ));

    let app = routes::create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server ready at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}
