//! Modelhub server binary.
//!
//! Serves the auth endpoints and the GraphQL API over a SQLite database.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use modelhub::{api, config, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::init();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "modelhub=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.server.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!(
        "Starting modelhub server on {}:{}",
        config.server.host,
        config.server.port
    );

    let state = AppState::new().await?;
    tracing::info!("Application state initialized");

    api::status::init_startup_time();

    let _maintenance_handle = state.start_maintenance();
    tracing::debug!(
        interval_secs = config.server.maintenance_interval_secs,
        "Credential purge task started"
    );

    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
