mod config;
mod db;
mod errors;
mod models;
mod poller;
mod routes;
mod state;
mod store;
mod tasks;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::pg_tier::{ensure_schema, PgTier};
use crate::store::redis_tier::RedisTier;
use crate::store::ProgressStore;
use crate::tasks::launcher::TaskLauncher;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Beacon API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (durable tier)
    let db = create_pool(&config.database_url).await?;
    ensure_schema(&db).await?;

    // Initialize Redis (fast tier)
    let redis_client = redis::Client::open(config.redis_url.clone())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connection established");

    // Dual-tier progress store, constructed once and injected everywhere
    let store = ProgressStore::new(
        Arc::new(RedisTier::new(redis_conn, config.progress_ttl_secs)),
        Arc::new(PgTier::new(db.clone())),
    );

    let launcher = TaskLauncher::new(store.clone(), config.max_concurrent_tasks);
    info!(
        "Task launcher ready (max {} concurrent tasks)",
        config.max_concurrent_tasks
    );

    // Build app state
    let state = AppState {
        db,
        store,
        launcher,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
