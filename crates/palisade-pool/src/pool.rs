//! The worker pool.

use palisade_core::SharedConfig;
use palisade_events::{EventBus, EventKind};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

use crate::error::{PoolError, PoolResult};
use crate::worker::WorkerProcess;

/// Non-blocking health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolHealth {
    /// Configured pool size.
    pub size: usize,
    /// Workers whose subprocess is currently running.
    pub alive: usize,
    /// Workers sitting in the checkout channel right now.
    pub available: usize,
}

/// Fixed-size pool of persistent worker subprocesses.
///
/// Checkout goes through a bounded channel (capacity = pool size): acquiring
/// a worker removes its slot, returning puts it back. The slot is returned
/// on every path out of `execute`, including errors; that is load-bearing
/// for liveness.
pub struct WorkerPool {
    config: SharedConfig,
    workers: Vec<Arc<Mutex<WorkerProcess>>>,
    checkout_tx: mpsc::Sender<usize>,
    checkout_rx: Mutex<mpsc::Receiver<usize>>,
    available: AtomicUsize,
    running: AtomicBool,
    bus: Option<EventBus>,
}

impl WorkerPool {
    /// Spawn `pool_size` workers running `program args...`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SpawnFailed`] if any worker fails to start.
    pub fn spawn(config: SharedConfig, program: &str, args: &[String]) -> PoolResult<Self> {
        let size = config.load().pool_size;
        let (checkout_tx, checkout_rx) = mpsc::channel(size.max(1));

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let worker = WorkerProcess::spawn(program, args)?;
            workers.push(Arc::new(Mutex::new(worker)));
            checkout_tx
                .try_send(index)
                .expect("checkout channel sized to pool");
        }

        tracing::info!(size, program, "worker pool started");
        Ok(Self {
            config,
            workers,
            checkout_tx,
            checkout_rx: Mutex::new(checkout_rx),
            available: AtomicUsize::new(size),
            running: AtomicBool::new(true),
            bus: None,
        })
    }

    /// Publish `worker_unhealthy` events on this bus when workers restart.
    #[must_use]
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Execute one action on a checked-out worker.
    ///
    /// `timeout` bounds both the checkout wait and the response read;
    /// `None` uses the configured worker timeout.
    pub async fn execute(
        &self,
        action: &str,
        params: serde_json::Value,
        timeout: Option<Duration>,
    ) -> PoolResult<serde_json::Value> {
        if !self.running.load(Ordering::SeqCst) || self.workers.is_empty() {
            return Err(PoolError::Unavailable);
        }
        let timeout = timeout.unwrap_or_else(|| self.config.load().worker_timeout);

        // Check a worker out of the bounded channel.
        let index = {
            let mut rx = self.checkout_rx.lock().await;
            match tokio::time::timeout(timeout, rx.recv()).await {
                Err(_elapsed) => return Err(PoolError::AllWorkersBusy),
                Ok(None) => return Err(PoolError::Unavailable),
                Ok(Some(index)) => index,
            }
        };
        self.available.fetch_sub(1, Ordering::SeqCst);

        let worker = Arc::clone(&self.workers[index]);
        let mut guard = worker.lock().await;
        let failures_before = guard.fail_count();
        let result = guard.call(action, params, timeout).await;
        let failures_after = guard.fail_count();
        drop(guard);

        if failures_after > failures_before {
            if let Some(bus) = &self.bus {
                bus.publish(EventKind::WorkerUnhealthy {
                    worker: index,
                    fail_count: failures_after,
                });
            }
        }

        // Always hand the slot back, even on error.
        let _ = self.checkout_tx.try_send(index);
        self.available.fetch_add(1, Ordering::SeqCst);

        result
    }

    /// Health snapshot. Workers currently processing a call count as alive.
    #[must_use]
    pub fn health(&self) -> PoolHealth {
        let alive = self
            .workers
            .iter()
            .filter(|worker| match worker.try_lock() {
                Ok(mut guard) => guard.alive(),
                // Held by an in-flight call.
                Err(_) => true,
            })
            .count();
        PoolHealth {
            size: self.workers.len(),
            alive,
            available: self.available.load(Ordering::SeqCst),
        }
    }

    /// Kill every worker. The pool refuses further work afterwards.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        for worker in &self.workers {
            worker.lock().await.kill();
        }
        tracing::info!("worker pool shut down");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.workers.len())
            .field("available", &self.available.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
