mod api;
mod application;
mod build;
mod clock;
mod config;
mod error;
mod events;
mod infrastructure;
mod manager;
mod models;
mod queue;
mod state;
mod triggers;
mod workers;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use build::ShellBuildRunner;
use clock::{Clock, SystemClock};
use config::{AgentSettings, ServerConfig};
use infrastructure::logging::TraceContext;
use state::AppContext;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting integration agent");

    let settings = AgentSettings::from_env();
    info!("Loading configuration from {}", settings.config_path.display());
    let config = ServerConfig::load(&settings.config_path)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    for problem in config.validate(&clock) {
        warn!("Configuration problem: {}", problem);
    }

    let context = AppContext::new(&config, settings.clone(), Arc::new(ShellBuildRunner::new()), clock);
    info!("Application context initialized");

    // Start status reporter before any project emits events
    tokio::spawn(workers::run_status_reporter(context.clone()));

    context.manager.start_all_projects(&TraceContext::system("startup"));

    let app = api::router(context.clone());

    // Start API server
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!("API server listening on {}", settings.bind_addr);

    let api_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server failed: {}", e);
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = api_server => {
            info!("API server stopped");
        }
    }

    info!("Shutting down...");
    context
        .manager
        .stop_all_projects(&TraceContext::system("shutdown"), false)
        .await;

    Ok(())
}
