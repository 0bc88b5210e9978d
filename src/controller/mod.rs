//! # Controller
//!
//! Fixed-size worker pool draining the work queue.
//!
//! Workers only start once the watch cache has replayed the initial list, so no pass ever
//! runs against an incomplete view. Each dequeued key gets one reconciliation pass; the
//! result decides whether the key is forgotten or requeued with backoff.

mod informer;
pub mod reconciler;

pub use informer::run_informer;
pub use reconciler::{Reconciler, ReconcilerError};

use crate::crd::OsbInstance;
use crate::observability::metrics;
use crate::queue::WorkQueue;
use crate::runtime::error_policy::handle_reconciliation_result;
use anyhow::{Context, Result};
use futures::FutureExt;
use kube_runtime::reflector::{ObjectRef, Store};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};

/// Work queue key of an instance
pub type InstanceKey = ObjectRef<OsbInstance>;

pub struct Controller {
    cache: Store<OsbInstance>,
    queue: WorkQueue<InstanceKey>,
    reconciler: Reconciler,
    max_retries: u32,
}

impl Controller {
    pub fn new(queue: WorkQueue<InstanceKey>, reconciler: Reconciler, max_retries: u32) -> Self {
        Self {
            cache: reconciler.cache.clone(),
            queue,
            reconciler,
            max_retries,
        }
    }

    pub fn queue(&self) -> &WorkQueue<InstanceKey> {
        &self.queue
    }

    /// Wait for the cache to sync, run `workers` workers until `shutdown` resolves, then
    /// shut the queue down and wait for in-flight passes to finish.
    pub async fn run<F>(self: Arc<Self>, workers: usize, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = std::pin::pin!(shutdown);

        info!("Waiting for watch cache to sync");
        tokio::select! {
            ready = self.cache.wait_until_ready() => {
                ready.context("Watch cache writer dropped before the initial list completed")?;
            }
            () = &mut shutdown => {
                info!("Shutdown requested before the watch cache synced");
                self.queue.shut_down();
                return Ok(());
            }
        }

        info!("Starting {} workers", workers);
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let controller = Arc::clone(&self);
                tokio::spawn(async move {
                    while controller.process_next_work_item().await {}
                    tracing::debug!("Worker {} stopped", worker);
                })
            })
            .collect();

        shutdown.await;
        info!("Shutting down work queue, waiting for in-flight passes");
        self.queue.shut_down();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }
        info!("All workers stopped");
        Ok(())
    }

    /// Take one key off the queue and reconcile it. Returns false once the queue is shut down.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let span = info_span!(
            "controller.reconcile",
            resource.name = %key.name,
            resource.namespace = key.namespace.as_deref().unwrap_or_default()
        );
        let start = Instant::now();
        metrics::increment_reconciliations();

        // A panicking pass must not take the worker down with it
        let result = AssertUnwindSafe(self.reconciler.reconcile(&key).instrument(span.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(ReconcilerError::Defect(format!(
                    "reconciliation of {} panicked",
                    key.name
                )))
            });

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        span.in_scope(|| {
            handle_reconciliation_result(&self.queue, &key, result, self.max_retries);
        });
        self.queue.done(&key);
        true
    }
}
