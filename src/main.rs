use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shopfloor::collaborators::InMemoryCatalog;
use shopfloor::config::{ServerConfig, ShopConfig};
use shopfloor::engine::{Collaborators, Engine};
use shopfloor::{api, observability, selection, sweeper};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = ServerConfig::from_env()?;
    let shop = ShopConfig::from_env()?;
    observability::init(server.metrics_port)?;

    std::fs::create_dir_all(&server.data_dir)?;
    let catalog = match &server.catalog_path {
        Some(path) => InMemoryCatalog::load(path)?,
        None => InMemoryCatalog::default(),
    };
    if catalog.is_empty() {
        tracing::warn!("service catalog is empty, every booking will be rejected");
    }

    let deps = Collaborators::new(Arc::new(catalog))
        .with_selector(Arc::from(selection::selector_for(shop.bay_selection)));
    let sweep_interval = shop.sweep_interval;
    let engine = Arc::new(Engine::new(server.data_dir.join("shopfloor.wal"), shop, deps)?);

    // Provision bays on first start.
    if engine.list_bays().await.is_empty() {
        for i in 0..server.initial_bays {
            engine.add_bay(&format!("Bay {}", i + 1)).await?;
        }
        info!(bays = server.initial_bays, "provisioned bays");
    }

    let shutdown = CancellationToken::new();
    let recovery = tokio::spawn(sweeper::run_recovery(
        engine.clone(),
        sweep_interval,
        shutdown.clone(),
    ));
    let compactor = tokio::spawn(sweeper::run_compactor(
        engine.clone(),
        server.compact_threshold,
        shutdown.clone(),
    ));

    let listener = TcpListener::bind(server.listen_addr).await?;
    info!("shopfloor listening on {}", server.listen_addr);
    info!("  data_dir: {}", server.data_dir.display());
    info!(
        "  metrics: {}",
        server
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, api::router(engine.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, stopping background tasks");
    shutdown.cancel();
    let _ = tokio::join!(recovery, compactor);
    if let Err(e) = engine.compact_wal().await {
        tracing::error!("final WAL compaction failed: {e}");
    }

    info!("shopfloor stopped");
    Ok(())
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };
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
                tracing::error!("failed to register SIGTERM handler: {e}");
                ctrl_c.await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }
}
