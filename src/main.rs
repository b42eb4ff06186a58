use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slotkeeper::api::{self, AppState};
use slotkeeper::compactor;
use slotkeeper::config::Config;
use slotkeeper::engine::Engine;
use slotkeeper::notify::NotifyHub;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=info", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    slotkeeper::observability::init(config.metrics_port)
        .context("Failed to install Prometheus metrics exporter")?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(
        Engine::new(config.wal_path(), notify, config.engine_config())
            .context("Failed to open WAL")?,
    );

    let compactor_engine = engine.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_engine, threshold).await;
    });

    let app = api::router(AppState { engine });

    let addr = config.server_addr();
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("slotkeeper listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  lock_wait: {}ms", config.lock_wait.as_millis());
    info!("  allow_past: {}", config.allow_past);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Failed to serve application")?;

    info!("slotkeeper stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
