use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use spacebook::building::BuildingCatalog;
use spacebook::clock::SystemClock;
use spacebook::config::Config;
use spacebook::engine::Engine;
use spacebook::notify::NotifyHub;
use spacebook::scheduler::Scheduler;
use spacebook::store::{Store, run_compactor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    spacebook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let notify = Arc::new(NotifyHub::new());
    let store = Arc::new(Store::open(config.wal_path(), notify)?);
    let catalog = match &config.buildings_file {
        Some(path) => BuildingCatalog::load(path)?,
        None => BuildingCatalog::new(),
    };

    info!("spacebook starting");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  reservations: {}", store.reservation_count());
    info!("  buildings: {}", catalog.len());
    info!("  scan_interval: {}s", config.scan_interval.as_secs());
    info!("  payment_window: {}h", config.payment_window_hours);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let engine = Arc::new(Engine::new(
        store.clone(),
        Arc::new(catalog),
        Arc::new(SystemClock),
        config.engine_config(),
    ));
    let scheduler = Arc::new(Scheduler::new(engine, config.scan_interval));
    let scheduler_task = scheduler.start();

    let shutdown = CancellationToken::new();
    let compactor_task = tokio::spawn(run_compactor(
        store.clone(),
        config.compact_threshold,
        shutdown.clone(),
    ));

    wait_for_signal().await;
    info!("shutdown signal received");

    scheduler.shutdown();
    shutdown.cancel();
    let _ = tokio::join!(scheduler_task, compactor_task);

    info!("spacebook stopped");
    Ok(())
}

async fn wait_for_signal() {
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
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
