//! Livedata Daemon - live CLI queries against managed network devices
//!
//! Serves the HTTP API, runs queued query and cleanup jobs, and sweeps old
//! job results on a schedule.

use anyhow::{Context, Result};
use livedata_common::bootstrap::{bootstrap, BootstrapOutcome, ReadinessFlags};
use livedata_common::config::LivedataConfig;
use livedata_common::directory::{DeviceDirectory, InventoryDirectory};
use livedata_common::result_store::SqliteResultStore;
use livedatad::queue::JobQueue;
use livedatad::scheduler::start_retention_schedule;
use livedatad::server::{self, AppState};
use livedatad::ssh::SshTransport;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = LivedataConfig::load().context("Failed to load configuration")?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Livedata Daemon v{} starting", env!("CARGO_PKG_VERSION"));

    let mut flags = ReadinessFlags::default();
    let job_names = config.job_names();

    let store = Arc::new(
        SqliteResultStore::open_at(&config.storage.db_path)
            .with_context(|| format!("Failed to open {}", config.storage.db_path.display()))?,
    );
    flags.schema_ready = true;
    report(bootstrap(flags, store.as_ref(), &job_names)?);

    let directory: Arc<dyn DeviceDirectory> = match InventoryDirectory::load(&config.inventory.path) {
        Ok(directory) => {
            flags.inventory_ready = true;
            Arc::new(directory)
        }
        Err(e) => {
            error!("Inventory not loaded, jobs stay disabled: {}", e);
            Arc::new(InventoryDirectory::new())
        }
    };
    report(bootstrap(flags, store.as_ref(), &job_names)?);

    let transport = Arc::new(SshTransport::new(config.ssh.clone()));
    let (queue, _dispatcher) = JobQueue::start(config.jobs.clone(), Arc::clone(&store), transport);
    let _schedule = start_retention_schedule(queue.clone(), &config.retention);

    let state = AppState::new(directory, store, queue, config);
    server::run(state, shutdown_signal()).await?;

    info!("Shutting down gracefully");
    Ok(())
}

fn report(outcome: BootstrapOutcome) {
    match outcome {
        BootstrapOutcome::Waiting { flags } => info!(
            "Bootstrap waiting (schema_ready={}, inventory_ready={})",
            flags.schema_ready, flags.inventory_ready
        ),
        BootstrapOutcome::Completed {
            newly_registered,
            newly_enabled,
        } => info!(
            "Bootstrap complete ({} job(s) registered, {} enabled)",
            newly_registered.len(),
            newly_enabled.len()
        ),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
