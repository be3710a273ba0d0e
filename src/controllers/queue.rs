//! Rate-limited, deduplicating work queue
//!
//! Keys are plain strings. A key is held at most once in the queue; a key
//! added while a worker is processing it is delivered again after the worker
//! calls [`RateLimitingQueue::done`]. Failed keys are re-added with an
//! exponential delay driven by their failure count until
//! [`RateLimitingQueue::forget`] clears it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

use crate::metrics;

/// Per-key exponential backoff: `base * 2^(failures - 1)`, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    /// Delay of the first retry
    pub const DEFAULT_BASE: Duration = Duration::from_millis(5);
    /// Upper bound for any retry delay
    pub const DEFAULT_MAX: Duration = Duration::from_secs(1000);

    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay before retry number `failures` (1-based)
    pub fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        2u32.checked_pow(failures - 1)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE, Self::DEFAULT_MAX)
    }
}

#[derive(Default)]
struct QueueState {
    /// Keys ready for delivery, in order
    queue: VecDeque<String>,
    /// Keys that need processing (queued, or re-added while processing)
    dirty: HashSet<String>,
    /// Keys handed out by `get` and not yet `done`
    processing: HashSet<String>,
    /// Delayed keys and the instant they become eligible
    waiting: HashMap<String, Instant>,
    /// Failure count per key
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

impl QueueState {
    /// Mark `key` dirty; returns true if it was appended to the queue
    fn insert(&mut self, key: String) -> bool {
        if self.shutting_down || self.dirty.contains(&key) {
            return false;
        }
        self.dirty.insert(key.clone());
        if self.processing.contains(&key) {
            return false;
        }
        self.queue.push_back(key);
        true
    }

    fn promote_due(&mut self, now: Instant) {
        let mut due: Vec<(Instant, String)> = self
            .waiting
            .iter()
            .filter(|(_, ready_at)| **ready_at <= now)
            .map(|(key, ready_at)| (*ready_at, key.clone()))
            .collect();
        due.sort();
        for (_, key) in due {
            self.waiting.remove(&key);
            self.insert(key);
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.waiting.values().min().copied()
    }
}

/// Work queue shared by the controller's workers
pub struct RateLimitingQueue {
    name: String,
    state: Mutex<QueueState>,
    notify: Notify,
    backoff: ExponentialBackoff,
}

impl RateLimitingQueue {
    pub fn new(name: impl Into<String>, backoff: ExponentialBackoff) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            backoff,
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_depth(&self, state: &QueueState) {
        metrics::QUEUE_DEPTH
            .with_label_values(&[&self.name])
            .set(state.queue.len() as f64);
    }

    /// Add a key, unless it is already pending
    pub fn add(&self, key: impl Into<String>) {
        let mut state = self.state();
        if state.insert(key.into()) {
            self.record_depth(&state);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Add a key once `delay` has elapsed
    pub fn add_after(&self, key: impl Into<String>, delay: Duration) {
        let key = key.into();
        if delay.is_zero() {
            self.add(key);
            return;
        }

        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        let ready_at = Instant::now() + delay;
        let entry = state.waiting.entry(key).or_insert(ready_at);
        if ready_at < *entry {
            *entry = ready_at;
        }
        drop(state);
        // Wake a waiter so it re-arms its timer against the new deadline.
        self.notify.notify_one();
    }

    /// Re-add a key after the backoff for its failure count
    pub fn add_rate_limited(&self, key: impl Into<String>) {
        let key = key.into();
        let failures = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            *failures = failures.saturating_add(1);
            *failures
        };
        let delay = self.backoff.delay(failures);
        metrics::QUEUE_RETRIES.with_label_values(&[&self.name]).inc();
        trace!(key = %key, failures, delay_ms = delay.as_millis() as u64, "Requeue with backoff");
        self.add_after(key, delay);
    }

    /// Clear the failure history of a key
    pub fn forget(&self, key: &str) {
        self.state().failures.remove(key);
    }

    /// Number of times the key has been requeued since it was last forgotten
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Wait for the next key. Returns `None` once the queue is shut down.
    ///
    /// Every key returned must be released with [`done`](Self::done).
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                state.promote_due(Instant::now());
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    self.record_depth(&state);
                    return Some(key);
                }
                state.next_deadline()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified.as_mut() => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Release a key returned by `get`
    pub fn done(&self, key: &str) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.to_string());
            self.record_depth(&state);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Keys ready for delivery
    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys and release every blocked `get`
    pub fn shut_down(&self) {
        let mut state = self.state();
        state.shutting_down = true;
        state.waiting.clear();
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }
}
