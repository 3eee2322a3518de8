//! healthmon collector.
//!
//! Runs the configured health checks on an interval and reports each result
//! to the storage API.

use healthmon::collector::{report_routes, Collector, HttpReporter};
use healthmon::config::MonitorSettings;
use healthmon::lifetime::Lifetime;
use healthmon::probe::ProbeRegistry;

use std::net::SocketAddr;
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
    let settings = MonitorSettings::load()?;
    tracing::info!(
        "Starting collector for application {} on {}",
        settings.application_id,
        settings.server_name
    );
    tracing::info!("Reporting to {}", settings.storage_api);

    let reporter = Arc::new(HttpReporter::new(&settings.storage_api, settings.report_timeout())?);
    let lifetime = Lifetime::new();
    let collector = Collector::from_settings(&settings, &ProbeRegistry::with_builtin(), reporter, lifetime)?;

    let handle = collector.start();

    if let Some(port) = settings.health_port {
        let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
        tracing::info!("Serving /health on {}", listener.local_addr()?);
        let routes = report_routes(handle.reports());
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, routes).await {
                tracing::error!("Health endpoint failed: {}", e);
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested, stopping collector");

    handle.shutdown(settings.shutdown_timeout()).await;

    Ok(())
}
