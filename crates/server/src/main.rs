mod bootstrap;
mod error;
mod routes;
mod state;

use anyhow::Result;

use taxcase_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use taxcase_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let router = routes::router(app.state.clone());

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(event_name = "system.server.started", %address, "taxcase-server listening");

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "taxcase-server stopping");
    app.dispatcher.abort();

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for shutdown signal");
    }
}
