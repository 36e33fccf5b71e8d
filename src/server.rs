/// Server setup and initialization
///
/// Wires together all components: database, definition storage, model registry,
/// process engine, and HTTP routes.

use crate::{
    api::{create_api_routes, AppState},
    config::Config,
    process::{DefinitionStorage, ModelRegistry},
    runtime::{ListenerRegistry, ProcessEngine},
    store::Database,
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build the engine over an open database, warming the model cache from storage
pub async fn create_engine(
    database: &Database,
    config: &Config,
    listeners: ListenerRegistry,
) -> Result<Arc<ProcessEngine>> {
    tracing::info!("📋 Initializing definition storage");
    let storage = DefinitionStorage::new(database.pool().clone());

    tracing::info!("📊 Initializing model registry");
    let registry = Arc::new(ModelRegistry::new(storage));

    tracing::info!("📥 Loading existing definitions from storage");
    registry
        .init_from_storage()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load definitions from storage: {}", e))?;

    tracing::info!("🚀 Initializing process engine");
    Ok(Arc::new(ProcessEngine::new(database, registry, listeners, &config.engine)))
}

/// Router for an already-built engine
pub fn create_router(engine: Arc<ProcessEngine>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .merge(create_api_routes().with_state(AppState { engine }))
}

/// Create the main Axum application with all routes
pub async fn create_app(config: Config) -> Result<Router> {
    let database = Database::connect(&config.database)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open process database: {}", e))?;

    let engine = create_engine(&database, &config, ListenerRegistry::with_defaults()).await?;

    tracing::info!("📡 Creating HTTP router with all endpoints");
    let app = create_router(engine);

    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting procweave server...");

    let app = create_app(config.clone()).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
