//! Atelier - publishing backend for an AI-analyzed gallery, a blog and a link directory

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier::{
    analysis::create_analyzer,
    api,
    cache::create_cache,
    config::Config,
    db,
    storage::LocalStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Atelier...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    let cache = create_cache(&config.cache);
    tracing::info!("Cache initialized");

    let storage = LocalStorage::new(&config.storage);
    tokio::fs::create_dir_all(storage.root()).await?;
    tracing::info!("Uploads stored in {}", storage.root().display());

    let analyzer = create_analyzer(&config.ai, &config.storage)?.map(Arc::new);

    let state = api::build_state(&config, pool, cache, Arc::new(storage), analyzer)?;
    let app = api::build_router(state, &config);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
