//! MySqlRestore controller
//!
//! Admits newly observed restores into the work queue and runs a pool of
//! workers that drain it through the reconciler.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::config::OperatorConfig;
use crate::crd::{MySqlRestore, RestoreConditionType};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcilers::restore::RestoreReconciler;

use super::key::object_key;
use super::queue::RateLimitingQueue;

/// Kind label used for metrics and the queue name
const KIND: &str = "MySqlRestore";

/// How often cache sync state is polled during startup
const CACHE_SYNC_POLL: Duration = Duration::from_millis(100);

/// Validates and schedules MySqlRestores
pub struct RestoreController {
    reconciler: RestoreReconciler,
    queue: RateLimitingQueue,
    cache_sync_timeout: Duration,
}

/// Releases a queue key when dropped, including on unwind
struct DoneGuard<'a> {
    queue: &'a RateLimitingQueue,
    key: &'a str,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

impl RestoreController {
    pub fn new(reconciler: RestoreReconciler, config: &OperatorConfig) -> Self {
        Self {
            reconciler,
            queue: RateLimitingQueue::new(KIND, config.backoff),
            cache_sync_timeout: config.cache_sync_timeout,
        }
    }

    pub fn queue(&self) -> &RateLimitingQueue {
        &self.queue
    }

    /// Handle a newly observed restore.
    ///
    /// Restores that are already scheduled are skipped, so replayed add
    /// notifications after a restart do not queue finished work. Returns
    /// whether the restore was queued.
    pub fn on_add(&self, restore: &MySqlRestore) -> bool {
        if restore.has_condition_true(RestoreConditionType::Scheduled) {
            debug!(
                namespace = restore.metadata.namespace.as_deref().unwrap_or(""),
                name = restore.metadata.name.as_deref().unwrap_or(""),
                member = %restore.spec.scheduled_member,
                "MySqlRestore is already scheduled on cluster member"
            );
            return false;
        }

        match object_key(restore) {
            Ok(key) => {
                self.queue.add(key);
                true
            }
            Err(e) => {
                error!(error = %e, "Error creating queue key, item not added to queue");
                false
            }
        }
    }

    fn caches_synced(&self) -> bool {
        let r = &self.reconciler;
        r.restores.has_synced()
            && r.clusters.has_synced()
            && r.backups.has_synced()
            && r.pods.has_synced()
    }

    /// Block until every store has synced, the timeout passes, or shutdown
    pub async fn wait_for_cache_sync(&self, shutdown: &CancellationToken) -> Result<()> {
        let deadline = Instant::now() + self.cache_sync_timeout;
        let mut poll = tokio::time::interval(CACHE_SYNC_POLL);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Err(Error::Cancelled),
                _ = poll.tick() => {}
            }
            if self.caches_synced() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::CacheSyncTimeout(self.cache_sync_timeout));
            }
        }
    }

    /// Run `workers` workers until `shutdown` is cancelled.
    ///
    /// Fails without starting any worker if the caches do not sync in time.
    /// On shutdown the queue is closed first and the call returns once every
    /// worker has finished its current item.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken, workers: usize) -> Result<()> {
        info!(workers, "Starting MySqlRestore controller");

        info!("Waiting for caches to sync");
        if let Err(e) = self.wait_for_cache_sync(&shutdown).await {
            self.queue.shut_down();
            error!(error = %e, "Caches did not sync");
            return Err(e);
        }
        metrics::CACHES_SYNCED.set(1.0);
        info!("Caches are synced");

        let handles: Vec<_> = (0..workers.max(1))
            .map(|worker| {
                let controller = self.clone();
                tokio::spawn(async move { controller.run_worker(worker).await })
            })
            .collect();

        shutdown.cancelled().await;

        info!("Waiting for workers to finish their work");
        self.queue.shut_down();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!(error = %e, "Worker exited abnormally");
            }
        }
        info!("All workers have finished");
        info!("Shutting down MySqlRestore controller");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn run_worker(&self, worker: usize) {
        while self.process_next_work_item().await {}
        debug!("Worker stopped");
    }

    /// Take one key off the queue and sync it. Returns false on shutdown.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let _done = DoneGuard {
            queue: &self.queue,
            key: &key,
        };

        let _timer = metrics::RECONCILE_DURATION
            .with_label_values(&[KIND])
            .start_timer();
        metrics::RECONCILIATIONS.with_label_values(&[KIND]).inc();

        match self.reconciler.sync(&key).await {
            Ok(outcome) => {
                debug!(key = %key, outcome = ?outcome, "Reconciled MySqlRestore");
                self.queue.forget(&key);
            }
            Err(e) => {
                error!(
                    key = %key,
                    error = %e,
                    requeues = self.queue.num_requeues(&key),
                    "Error in sync handler, re-adding to queue"
                );
                metrics::RECONCILIATION_ERRORS
                    .with_label_values(&[KIND])
                    .inc();
                self.queue.add_rate_limited(key.clone());
            }
        }
        true
    }
}
