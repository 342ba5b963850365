//! claimsight-ae - Analysis Engine Microservice
//!
//! Runs the continuous AI-analysis loop over pending accident records and
//! exposes engine control plus live updates to the validation dashboard
//! via HTTP REST + SSE.
//!
//! Default port: 5741. The engine starts in the Stopped state unless
//! `--auto-start` (or CLAIMSIGHT_AUTO_START=1) is given; an operator starts
//! it from the dashboard.

use anyhow::Result;
use clap::Parser;
use claimsight_common::events::EventBus;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use claimsight_ae::config::{AeConfig, Cli};
use claimsight_ae::engine::EngineHandle;
use claimsight_ae::gateway::HttpGateway;
use claimsight_ae::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AeConfig::resolve(&cli);

    info!("Starting claimsight-ae (Analysis Engine) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Records backend: {}", config.backend_url);
    info!(
        "Cycle policy: {} records x {} sub-batches every {:?}",
        config.policy.batch_size, config.policy.max_concurrent_batches, config.policy.cycle_interval
    );

    let gateway = Arc::new(HttpGateway::new(
        config.backend_url.clone(),
        config.request_timeout,
    )?);

    let event_bus = EventBus::new(100);
    let engine = EngineHandle::new(gateway, event_bus.clone(), config.policy.clone());

    // Initial metrics/settings snapshot, then the timer loop
    engine.bootstrap().await;
    let shutdown = CancellationToken::new();
    engine.spawn_run_loop(shutdown.clone());

    if config.auto_start {
        engine.start().await;
    }

    let state = AppState::new(engine, event_bus);
    let app = claimsight_ae::build_router(state);

    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
