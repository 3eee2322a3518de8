//! healthmon storage server.
//!
//! Receives health-check registrations and results from collectors, keeps
//! current state and status history in SQLite, and serves grouped views.

use healthmon::config::ServerConfig;
use healthmon::db::Store;
use healthmon::state::{Aggregator, SystemClock};
use healthmon::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("healthmon=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting healthmon storage API on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let aggregator = Aggregator::new(store, Arc::new(SystemClock));

    // Start web server
    let server = Server::new(cfg, aggregator);
    server.start().await?;

    Ok(())
}
