//! Gateway daemon.
//!
//! Wires the control plane together and runs until interrupted. The HTTP
//! surface mounts on top of the [`Supervisor`] this binary constructs; it
//! is intentionally not part of the core.

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;

use palisade_audit::AuditLog;
use palisade_core::GatewayConfig;
use palisade_events::WebhookRegistry;
use palisade_gateway::{Scheduler, Supervisor};
use palisade_pool::WorkerPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = GatewayConfig::from_env().context("loading configuration")?;
    let audit_key = config.audit_key;
    let shared = config.into_shared();

    let data_dir = PathBuf::from(
        std::env::var("PALISADE_DATA_DIR").unwrap_or_else(|_| "data".to_string()),
    );
    std::fs::create_dir_all(&data_dir).context("creating data directory")?;

    let audit = Arc::new(
        AuditLog::open(data_dir.join("audit.log"), audit_key.as_ref())
            .context("opening audit log")?,
    );
    let webhooks = Arc::new(
        WebhookRegistry::open(data_dir.join("webhooks.json"))
            .context("opening webhook registry")?,
    );

    let worker_bin = std::env::var("PALISADE_WORKER_BIN")
        .unwrap_or_else(|_| "palisade-worker".to_string());
    let pool = Arc::new(
        WorkerPool::spawn(shared.clone(), &worker_bin, &[]).context("spawning worker pool")?,
    );

    let supervisor = Arc::new(
        Supervisor::new(shared, audit)
            .with_pool(Arc::clone(&pool))
            .with_webhooks(webhooks),
    );

    let scheduler =
        Arc::new(Scheduler::open(data_dir.join("schedule.json")).context("opening schedule")?);
    let scheduler_handle = Arc::clone(&scheduler).run(Arc::clone(&supervisor));

    tracing::info!(
        health = %supervisor.health_snapshot(),
        "palisade gateway running, press ctrl-c to stop"
    );
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;

    scheduler_handle.abort();
    pool.shutdown().await;
    tracing::info!("palisade gateway stopped");
    Ok(())
}
