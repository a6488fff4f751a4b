//! DispatchController - periodic single-flight consumer of the queue

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    AttemptOutcome, DeliveryTransport, DispatchConfig, Grid, MessageId, QueueError, QueueMetrics,
    RetryPolicy,
};
use queue_store::PersistentQueueStore;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::error::DispatcherError;
use crate::metrics::ControllerMetrics;
use crate::rate_limiter::RateLimiter;
use crate::retry::deliver_with_retry;

/// Result of one controller tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Dispatch is paused; no record was touched
    Paused,
    /// Another delivery holds the in-flight guard
    Busy,
    /// Nothing eligible to send
    Idle,
    /// Record delivered and marked sent
    Sent { id: MessageId },
    /// Attempt failed; record stays pending
    Failed { id: MessageId, attempts: u32 },
    /// Attempt failed and exhausted the bound
    Evicted { id: MessageId, attempts: u32 },
}

/// Holds the in-flight flag until dropped
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Single active consumer of a `PersistentQueueStore`
pub struct DispatchController<T> {
    store: Arc<PersistentQueueStore>,
    transport: Arc<T>,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    tick_interval: Duration,
    in_flight: AtomicBool,
    metrics: Arc<dyn QueueMetrics>,
    tick_metrics: ControllerMetrics,
}

impl<T> DispatchController<T>
where
    T: DeliveryTransport + Sync + 'static,
{
    /// Create a controller with its own rate limiter
    pub fn new(
        store: Arc<PersistentQueueStore>,
        transport: Arc<T>,
        config: &DispatchConfig,
        metrics: Arc<dyn QueueMetrics>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit()));
        Self::with_limiter(store, transport, limiter, config, metrics)
    }

    /// Create a controller sharing an existing limiter
    pub fn with_limiter(
        store: Arc<PersistentQueueStore>,
        transport: Arc<T>,
        limiter: Arc<RateLimiter>,
        config: &DispatchConfig,
        metrics: Arc<dyn QueueMetrics>,
    ) -> Self {
        Self {
            store,
            transport,
            limiter,
            policy: RetryPolicy::from_dispatch(config),
            tick_interval: config.tick_interval(),
            in_flight: AtomicBool::new(false),
            metrics,
            tick_metrics: ControllerMetrics::new(),
        }
    }

    /// Replace the inline retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<PersistentQueueStore> {
        &self.store
    }

    /// Shared rate limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Tick counters
    pub fn metrics(&self) -> &ControllerMetrics {
        &self.tick_metrics
    }

    /// Whether a delivery currently holds the guard
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one dispatch cycle
    ///
    /// Order of checks: pause flag, in-flight guard, next eligible record.
    #[instrument(name = "dispatch_tick", skip(self), fields(transport = %self.transport.name()))]
    pub async fn tick(&self) -> Result<TickOutcome, DispatcherError> {
        let outcome = self.tick_inner().await?;
        self.tick_metrics.record(&outcome);
        Ok(outcome)
    }

    async fn tick_inner(&self) -> Result<TickOutcome, DispatcherError> {
        if self.with_store(|store| store.get_state()).await?.control.queue_paused {
            debug!("Queue paused, skipping tick");
            return Ok(TickOutcome::Paused);
        }

        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            debug!("Delivery in flight, skipping tick");
            return Ok(TickOutcome::Busy);
        };

        let Some(record) = self.with_store(|store| store.get_next_unsent()).await? else {
            return Ok(TickOutcome::Idle);
        };

        debug!(id = %record.id, source = %record.source, attempts = record.attempts, "Dispatching record");

        match deliver_with_retry(self.transport.as_ref(), &self.limiter, &self.policy, &record.payload).await {
            Ok(calls) => {
                let id = record.id.clone();
                match self.with_store(move |store| store.mark_sent(&id)).await {
                    Ok(_) => {
                        info!(id = %record.id, source = %record.source, calls, "Message sent");
                        Ok(TickOutcome::Sent { id: record.id })
                    }
                    Err(err) => {
                        // 已投递但未能落盘, 按一次失败计数
                        self.metrics.api_error("store");
                        error!(id = %record.id, error = %err, "Delivered but could not mark sent");
                        let id = record.id.clone();
                        match self.with_store(move |store| store.mark_attempt(&id)).await {
                            Ok(outcome) => Ok(attempt_outcome(record.id, record.attempts, outcome)),
                            Err(_) => Err(err.into()),
                        }
                    }
                }
            }
            Err(err) => {
                self.metrics.send_failed(record.source);
                self.metrics.api_error("send");
                warn!(id = %record.id, source = %record.source, error = %err, "Dispatch attempt failed");

                let id = record.id.clone();
                let outcome = self.with_store(move |store| store.mark_attempt(&id)).await?;
                Ok(attempt_outcome(record.id, record.attempts, outcome))
            }
        }
    }

    /// Run a store call on the blocking pool
    ///
    /// Every store method commits with `synchronous = full`, so each call may
    /// wait on an fsync.
    async fn with_store<R, F>(&self, op: F) -> Result<R, QueueError>
    where
        F: FnOnce(&PersistentQueueStore) -> Result<R, QueueError> + Send + 'static,
        R: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|err| QueueError::storage_message(format!("store task failed: {err}")))?
    }

    /// Deliver a grid now, outside the queue
    ///
    /// Shares the in-flight guard, rate limiter and retry policy with ticks.
    #[instrument(name = "dispatch_send_immediate", skip(self, grid), fields(transport = %self.transport.name()))]
    pub async fn send_immediate(&self, grid: &Grid) -> Result<u32, DispatcherError> {
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            return Err(DispatcherError::Busy);
        };

        match deliver_with_retry(self.transport.as_ref(), &self.limiter, &self.policy, grid).await {
            Ok(calls) => {
                info!(calls, "Immediate send delivered");
                Ok(calls)
            }
            Err(err) => {
                self.metrics.api_error("send");
                Err(err.into())
            }
        }
    }

    /// Drive ticks until `shutdown` flips to `true` or its sender is dropped
    ///
    /// The first tick fires one interval after start. On shutdown any
    /// in-flight tick is aborted and the store is flushed.
    #[instrument(name = "dispatch_run", skip(self, shutdown), fields(interval_ms = self.tick_interval.as_millis() as u64))]
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), DispatcherError> {
        info!(transport = %self.transport.name(), "Dispatch controller started");

        let mut ticker = interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticks: JoinSet<Result<TickOutcome, DispatcherError>> = JoinSet::new();

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let this = Arc::clone(&self);
                        ticks.spawn(async move { this.tick().await });
                    }
                    Some(joined) = ticks.join_next(), if !ticks.is_empty() => {
                        log_tick(joined);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        }

        if !ticks.is_empty() {
            warn!(pending = ticks.len(), "Abandoning in-flight dispatch");
        }
        ticks.abort_all();
        while let Some(joined) = ticks.join_next().await {
            log_tick(joined);
        }

        self.with_store(|store| store.flush()).await?;

        let snapshot = self.tick_metrics.snapshot();
        info!(
            ticks = snapshot.ticks(),
            sent = snapshot.sent,
            failed = snapshot.failed,
            evicted = snapshot.evicted,
            "Dispatch controller stopped"
        );
        Ok(())
    }

    /// Spawn the run loop as a background task
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<Result<(), DispatcherError>> {
        tokio::spawn(self.run(shutdown))
    }
}

fn attempt_outcome(id: MessageId, previous: u32, outcome: AttemptOutcome) -> TickOutcome {
    match outcome {
        AttemptOutcome::Retry { attempts } => TickOutcome::Failed { id, attempts },
        AttemptOutcome::Evicted { attempts } => TickOutcome::Evicted { id, attempts },
        // 投递期间被其他路径标记为终态
        AttemptOutcome::AlreadyTerminal => TickOutcome::Failed {
            id,
            attempts: previous,
        },
    }
}

fn log_tick(joined: Result<Result<TickOutcome, DispatcherError>, JoinError>) {
    match joined {
        Ok(Ok(outcome)) => debug!(outcome = ?outcome, "Tick finished"),
        Ok(Err(err)) => error!(error = %err, "Tick failed"),
        Err(err) if err.is_cancelled() => debug!("Tick cancelled"),
        Err(err) => error!(error = ?err, "Tick task panicked"),
    }
}
