use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;

use conflictd::api::{self, AppState};
use conflictd::config::ServiceConfig;
use conflictd::engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    conflictd::observability::init_tracing();

    let config = ServiceConfig::from_env().context("invalid configuration")?;
    conflictd::observability::init_metrics(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("cannot create data dir {}", config.data_dir.display()))?;

    let engine = Arc::new(Engine::new(config.wal_path()).context("cannot open schedule store")?);
    if let Some(seed_file) = &config.seed_file {
        conflictd::seed::seed_if_empty(&engine, seed_file)
            .await
            .context("seeding failed")?;
    }

    tokio::spawn(conflictd::compactor::run_compactor(
        engine.clone(),
        config.compact_threshold,
    ));

    let addr = config.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!("conflictd listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  query_timeout: {:?}", config.query_timeout);
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight requests
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let state = AppState::new(engine, config.query_timeout);
    let mut server = tokio::spawn(api::serve(listener, state, async {
        let _ = stop_rx.await;
    }));

    tokio::select! {
        result = &mut server => {
            result.context("server task panicked")??;
            return Ok(());
        }
        result = shutdown_signal() => result?,
    }
    info!("shutdown signal received, draining requests...");
    let _ = stop_tx.send(());

    match tokio::time::timeout(config.drain_timeout, &mut server).await {
        Ok(result) => {
            result.context("server task panicked")??;
            info!("all requests drained");
        }
        Err(_) => {
            tracing::warn!("drain timeout after {:?}, aborting open requests", config.drain_timeout);
            server.abort();
        }
    }

    info!("conflictd stopped");
    Ok(())
}

async fn shutdown_signal() -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to register SIGTERM handler")?;
        tokio::select! {
            result = ctrl_c => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}
