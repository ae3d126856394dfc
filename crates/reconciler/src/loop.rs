//! Continuous reconciliation loop.
//!
//! Keys are fed into a deduplicating work queue, either explicitly through
//! [`ReconciliationLoop::enqueue`] or by the periodic resync of every record
//! in the store. Workers pop keys and run one engine pass each. A key is
//! never handed to two workers at once; a key enqueued while in flight is
//! processed again once the running pass finishes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use nimbus_core::{NamespacedName, RetryClass};
use nimbus_store::InstanceStorage;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::reconciler::Reconciler;

/// Configuration for the reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Delay before a freshly created record is checked again.
    #[serde(with = "duration_millis", rename = "requeue_after_ms")]
    pub requeue_after: Duration,
    /// Base backoff for infrastructure failures.
    #[serde(with = "duration_millis", rename = "fast_backoff_ms")]
    pub fast_backoff: Duration,
    /// Base backoff when the provisioning service refused or garbled a request.
    #[serde(with = "duration_millis", rename = "slow_backoff_ms")]
    pub slow_backoff: Duration,
    /// Upper bound for any backoff.
    #[serde(with = "duration_millis", rename = "max_backoff_ms")]
    pub max_backoff: Duration,
    /// Interval between full resyncs of the store.
    #[serde(with = "duration_millis", rename = "resync_interval_ms")]
    pub resync_interval: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            requeue_after: Duration::from_secs(1),
            fast_backoff: Duration::from_millis(500),
            slow_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            resync_interval: Duration::from_secs(30),
        }
    }
}

impl LoopConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero workers, a zero resync
    /// interval or backoff bases above `max_backoff`.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        if self.resync_interval.is_zero() {
            return Err(Error::invalid_config("resync_interval must be non-zero"));
        }
        if self.fast_backoff > self.max_backoff || self.slow_backoff > self.max_backoff {
            return Err(Error::invalid_config(
                "backoff bases must not exceed max_backoff",
            ));
        }
        Ok(())
    }

    /// Delay before retrying after `failures` consecutive failures of `class`.
    ///
    /// Doubles per failure starting at the class base, capped at
    /// `max_backoff`. Returns `None` for errors that must not be retried.
    #[must_use]
    pub fn backoff_for(&self, class: RetryClass, failures: u32) -> Option<Duration> {
        let base = match class {
            RetryClass::Fast => self.fast_backoff,
            RetryClass::Slow => self.slow_backoff,
            RetryClass::Never => return None,
        };
        let exponent = failures.saturating_sub(1).min(31);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        Some(base.saturating_mul(factor).min(self.max_backoff))
    }
}

/// Serde helper storing durations as whole milliseconds.
mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Bookkeeping behind [`WorkQueue`].
#[derive(Debug, Default)]
struct QueueState {
    /// Keys waiting for a worker, in arrival order.
    ready: VecDeque<NamespacedName>,
    /// Mirror of `ready` for deduplication.
    queued: HashSet<NamespacedName>,
    /// Keys a worker is currently reconciling.
    in_flight: HashSet<NamespacedName>,
    /// Keys enqueued while in flight.
    dirty: HashSet<NamespacedName>,
    /// Consecutive failures per key.
    failures: HashMap<NamespacedName, u32>,
    /// Delayed adds not yet due.
    delayed: usize,
}

impl QueueState {
    fn add(&mut self, key: NamespacedName) {
        if self.in_flight.contains(&key) {
            self.dirty.insert(key);
        } else if self.queued.insert(key.clone()) {
            self.ready.push_back(key);
        }
    }

    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.in_flight.is_empty() && self.delayed == 0
    }
}

/// Deduplicating work queue with delayed adds.
#[derive(Debug, Default)]
struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    async fn add(&self, key: NamespacedName) {
        self.state.lock().await.add(key);
        self.notify.notify_waiters();
    }

    /// Add `key` once `delay` has elapsed.
    async fn add_after(self: &Arc<Self>, key: NamespacedName, delay: Duration) {
        self.state.lock().await.delayed += 1;
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = queue.state.lock().await;
                state.delayed = state.delayed.saturating_sub(1);
                state.add(key);
            }
            queue.notify.notify_waiters();
        });
    }

    /// Wait for the next key and mark it in flight.
    ///
    /// With `until_idle`, returns `None` once nothing is ready, in flight or
    /// scheduled.
    async fn next(&self, until_idle: bool) -> Option<NamespacedName> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock().await;
                if let Some(key) = state.ready.pop_front() {
                    state.queued.remove(&key);
                    state.in_flight.insert(key.clone());
                    return Some(key);
                }
                if until_idle && state.is_idle() {
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Mark a pass over `key` finished.
    async fn done(&self, key: &NamespacedName) {
        {
            let mut state = self.state.lock().await;
            state.in_flight.remove(key);
            if state.dirty.remove(key) {
                state.add(key.clone());
            }
        }
        self.notify.notify_waiters();
    }

    /// Count a failure for `key`, returning the consecutive total.
    async fn record_failure(&self, key: &NamespacedName) -> u32 {
        let mut state = self.state.lock().await;
        let failures = state.failures.entry(key.clone()).or_insert(0);
        *failures = failures.saturating_add(1);
        *failures
    }

    /// Reset the failure count for `key`.
    async fn forget(&self, key: &NamespacedName) {
        self.state.lock().await.failures.remove(key);
    }

    async fn len(&self) -> usize {
        self.state.lock().await.ready.len()
    }
}

/// State shared by the loop and its workers.
struct Shared {
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    config: LoopConfig,
}

impl Shared {
    async fn process(&self, worker: usize, key: NamespacedName) {
        match self.reconciler.reconcile(&key).await {
            Ok(outcome) => {
                self.queue.forget(&key).await;
                debug!(worker, record = %key, state = %outcome.state, "Pass finished");
                if outcome.requeue {
                    self.queue
                        .add_after(key.clone(), self.config.requeue_after)
                        .await;
                }
            }
            Err(e) => {
                let failures = self.queue.record_failure(&key).await;
                match self.config.backoff_for(e.retry_class(), failures) {
                    Some(delay) => {
                        warn!(
                            worker,
                            record = %key,
                            error = %e,
                            failures,
                            retry_in_ms = delay.as_millis(),
                            "Reconciliation failed, requeueing"
                        );
                        self.queue.add_after(key.clone(), delay).await;
                    }
                    None => {
                        error!(
                            worker,
                            record = %key,
                            error = %e,
                            "Reconciliation failed permanently, dropping key"
                        );
                        self.queue.forget(&key).await;
                    }
                }
            }
        }
        self.queue.done(&key).await;
    }

    async fn work(self: Arc<Self>, worker: usize, mut stop_rx: Option<watch::Receiver<bool>>) {
        debug!(worker, "Worker started");
        loop {
            let next = match stop_rx.as_mut() {
                Some(rx) => tokio::select! {
                    key = self.queue.next(false) => key,
                    _ = rx.changed() => None,
                },
                None => self.queue.next(true).await,
            };
            let Some(key) = next else { break };
            self.process(worker, key).await;
        }
        debug!(worker, "Worker stopped");
    }
}

/// Continuous reconciliation loop.
///
/// Drives every record in the store toward convergence, retrying failed
/// passes with backoff according to the error's retry class.
pub struct ReconciliationLoop {
    /// State shared with the workers.
    shared: Arc<Shared>,
    /// Store listed on every resync.
    store: Arc<dyn InstanceStorage>,
    /// Stop signal receiver.
    stop_rx: watch::Receiver<bool>,
    /// Stop signal sender (for external control).
    stop_tx: watch::Sender<bool>,
}

impl ReconciliationLoop {
    /// Create a new reconciliation loop.
    pub fn new(
        reconciler: Arc<Reconciler>,
        store: Arc<dyn InstanceStorage>,
        config: LoopConfig,
    ) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                reconciler,
                queue: Arc::new(WorkQueue::default()),
                config,
            }),
            store,
            stop_rx,
            stop_tx,
        }
    }

    /// Queue `key` for reconciliation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoopStopped`] once the loop was told to stop.
    pub async fn enqueue(&self, key: NamespacedName) -> Result<()> {
        if *self.stop_rx.borrow() {
            return Err(Error::LoopStopped);
        }
        self.shared.queue.add(key).await;
        Ok(())
    }

    /// Number of keys waiting for a worker.
    pub async fn queue_len(&self) -> usize {
        self.shared.queue.len().await
    }

    /// Enqueue every record currently in the store.
    async fn resync(&self) {
        match self.store.list().await {
            Ok(instances) => {
                debug!(count = instances.len(), "Resyncing instances");
                for instance in instances {
                    self.shared.queue.add(instance.key()).await;
                }
            }
            Err(e) => warn!(error = %e, "Failed to list instances for resync"),
        }
    }

    /// Run the reconciliation loop until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the loop configuration is invalid.
    pub async fn run(&self) -> Result<()> {
        self.shared.config.validate()?;
        info!(
            workers = self.shared.config.workers,
            resync_ms = self.shared.config.resync_interval.as_millis(),
            "Starting reconciliation loop"
        );

        let mut workers = JoinSet::new();
        for worker in 0..self.shared.config.workers {
            workers.spawn(
                Arc::clone(&self.shared).work(worker, Some(self.stop_rx.clone())),
            );
        }

        let mut stop_rx = self.stop_rx.clone();
        let mut resync = tokio::time::interval(self.shared.config.resync_interval);

        while !*stop_rx.borrow() {
            tokio::select! {
                _ = resync.tick() => self.resync().await,
                changed = stop_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        drain(&mut workers).await;
        info!("Reconciliation loop stopped");
        Ok(())
    }

    /// Reconcile every record in the store, including requeues and retries,
    /// until no work remains.
    ///
    /// A record that keeps failing with a retryable error is re-enqueued
    /// after each backoff, so this does not return until that record
    /// succeeds. Callers that need a bound should wrap it in a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the loop configuration is invalid.
    pub async fn run_until_idle(&self) -> Result<()> {
        self.shared.config.validate()?;
        self.resync().await;

        let mut workers = JoinSet::new();
        for worker in 0..self.shared.config.workers {
            workers.spawn(Arc::clone(&self.shared).work(worker, None));
        }
        drain(&mut workers).await;
        debug!("Reconciliation queue drained");
        Ok(())
    }

    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Get a stopper handle.
    pub fn stopper(&self) -> LoopStopper {
        LoopStopper {
            stop_tx: self.stop_tx.clone(),
        }
    }
}

async fn drain(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "Worker task failed");
        }
    }
}

/// Handle to stop a reconciliation loop.
#[derive(Clone)]
pub struct LoopStopper {
    stop_tx: watch::Sender<bool>,
}

impl LoopStopper {
    /// Stop the loop.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}
