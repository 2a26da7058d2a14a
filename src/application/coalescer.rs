//! Request coalescing for the external lookup service.
//!
//! Callers register interest in a key with a callback. Once per tick the
//! coalescer takes the whole pending set, resolves every key with a single
//! batched call and fires the callbacks. When the batch endpoint itself is
//! rate limited it falls back to one call per key, in registration order, and
//! stops at the first per-key rate limit.
//!
//! ## Generations
//!
//! Registrations go into the current generation under a mutex. A tick swaps
//! that generation for an empty one while holding the same mutex, so a
//! registration racing with a tick lands in exactly one generation: the one
//! being drained or the next one. The drained generation is owned by the tick
//! and nothing else touches it.
//!
//! Every generation is processed at most once. Keys that are not resolved by
//! their tick (not found, rate limited, transport error) are dropped together
//! with their callbacks; callers using [`RequestCoalescer::enqueue_blocking`]
//! learn about this through [`LookupError::Unresolved`].

use crate::application::config::{CoalescerConfig, ConfigError};
use crate::application::gate::RateLimitGate;
use crate::application::handle::TaskHandle;
use crate::application::metrics::Metrics;
use crate::application::ports::{AnomalySink, LookupService};
use crate::domain::error::{Anomaly, ServiceError};
use crate::domain::lookup::{Keyed, LookupKey, PendingLookups, Registration};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Error returned by [`RequestCoalescer::enqueue_blocking`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No item arrived within the timeout; the registration was cancelled
    TimedOut {
        /// Key that was looked up
        key: LookupKey,
        /// How long the caller waited
        timeout: Duration,
    },
    /// The tick that drained the key finished without resolving it
    Unresolved {
        /// Key that was looked up
        key: LookupKey,
    },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::TimedOut { key, timeout } => {
                write!(f, "lookup of {} timed out after {:?}", key, timeout)
            }
            LookupError::Unresolved { key } => write!(f, "lookup of {} was not resolved", key),
        }
    }
}

impl std::error::Error for LookupError {}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The previous tick was still running; nothing was done.
    Overlapped,
    /// A cooldown is active; the pending set was left untouched.
    Deferred,
    /// Nothing was pending.
    Idle,
    /// The batch call failed with a non rate-limit error; the generation was dropped.
    Failed {
        /// Keys of the dropped generation
        dropped: Vec<LookupKey>,
    },
    /// The generation was processed.
    Completed {
        /// Keys whose callbacks fired, in item order
        resolved: Vec<LookupKey>,
        /// Drained keys that got no item, in registration order
        unresolved: Vec<LookupKey>,
    },
}

/// Coalesces lookups into one batched call per tick.
///
/// Share it behind an `Arc`; all methods take `&self`.
pub struct RequestCoalescer<T> {
    pending: Mutex<PendingLookups<T>>,
    next_registration: AtomicU64,
    executing: AtomicBool,
    gate: RateLimitGate,
    service: Arc<dyn LookupService<T>>,
    metrics: Metrics,
    config: CoalescerConfig,
}

impl<T> fmt::Debug for RequestCoalescer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCoalescer")
            .field("gate", &self.gate)
            .field("config", &self.config)
            .field("executing", &self.executing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

/// Builder for constructing a [`RequestCoalescer`].
pub struct RequestCoalescerBuilder<T> {
    service: Arc<dyn LookupService<T>>,
    gate: RateLimitGate,
    tick_interval: Duration,
    metrics: Option<Metrics>,
}

impl<T> RequestCoalescerBuilder<T>
where
    T: Keyed + Clone + Send + 'static,
{
    /// Set the tick interval.
    ///
    /// The interval will be validated when `build()` is called.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Share a metrics tracker with other components.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the coalescer.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroTickInterval` if the tick interval is zero.
    pub fn build(self) -> Result<Arc<RequestCoalescer<T>>, ConfigError> {
        let config = CoalescerConfig::new(self.tick_interval)?;

        Ok(Arc::new(RequestCoalescer {
            pending: Mutex::new(PendingLookups::new()),
            next_registration: AtomicU64::new(0),
            executing: AtomicBool::new(false),
            gate: self.gate,
            service: self.service,
            metrics: self.metrics.unwrap_or_default(),
            config,
        }))
    }
}

/// Clears the executing flag when a tick ends, including when its future is dropped.
struct ExecutingGuard<'a>(&'a AtomicBool);

impl Drop for ExecutingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T> RequestCoalescer<T>
where
    T: Keyed + Clone + Send + 'static,
{
    /// Start building a coalescer around a lookup service and a gate.
    pub fn builder(
        service: Arc<dyn LookupService<T>>,
        gate: RateLimitGate,
    ) -> RequestCoalescerBuilder<T> {
        RequestCoalescerBuilder {
            service,
            gate,
            tick_interval: CoalescerConfig::default().tick_interval,
            metrics: None,
        }
    }

    /// Register `callback` to receive the item for `key`.
    ///
    /// The callback runs at most once, on the blocking thread pool, during the
    /// first tick that drains the key and resolves it.
    pub fn enqueue<F>(&self, key: LookupKey, callback: F) -> Registration
    where
        F: FnOnce(T) + Send + 'static,
    {
        let registration = Registration {
            key,
            id: self.next_registration.fetch_add(1, Ordering::Relaxed),
        };
        self.lock_pending().register(registration, Box::new(callback));
        registration
    }

    /// Remove a registration that has not been drained yet.
    ///
    /// Returns `false` if it was already drained or cancelled.
    pub fn cancel(&self, registration: Registration) -> bool {
        self.lock_pending().cancel(registration)
    }

    /// Look up `key` and wait for the item.
    ///
    /// Waits at most `timeout`. On expiry the registration is cancelled, or
    /// turns into a no-op if a tick has already drained it.
    ///
    /// # Errors
    /// - `LookupError::TimedOut` if no item arrived in time
    /// - `LookupError::Unresolved` if the draining tick could not resolve the key
    pub async fn enqueue_blocking(
        &self,
        key: LookupKey,
        timeout: Duration,
    ) -> Result<T, LookupError> {
        let (tx, rx) = oneshot::channel();
        let registration = self.enqueue(key, move |item| {
            // The waiter may have given up already.
            let _ = tx.send(item);
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(item)) => Ok(item),
            Ok(Err(_)) => Err(LookupError::Unresolved { key }),
            Err(_) => {
                self.cancel(registration);
                Err(LookupError::TimedOut { key, timeout })
            }
        }
    }

    /// Number of distinct keys waiting for the next tick.
    pub fn pending_len(&self) -> usize {
        self.lock_pending().len()
    }

    /// Get the coalescer configuration.
    pub fn config(&self) -> &CoalescerConfig {
        &self.config
    }

    /// Get the metrics tracker.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Start ticking at the configured interval.
    ///
    /// Each tick runs in its own task, so a slow tick makes the next ones
    /// report [`Anomaly::OverlappingTick`] instead of queueing up.
    pub fn start(self: &Arc<Self>) -> TaskHandle {
        let coalescer = Arc::clone(self);

        TaskHandle::spawn(move |mut shutdown| async move {
            let mut ticker = tokio::time::interval(coalescer.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.requested() => break,
                    _ = ticker.tick() => {
                        let coalescer = Arc::clone(&coalescer);
                        tokio::spawn(async move {
                            coalescer.tick().await;
                        });
                    }
                }
            }

            tracing::debug!("lookup ticker stopped");
        })
    }

    /// Run one drain cycle.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.metrics.record_overlap();
            self.sink().report(Anomaly::OverlappingTick);
            return TickOutcome::Overlapped;
        }
        let _executing = ExecutingGuard(&self.executing);

        // Read only: the expiry transition belongs to the posting side.
        if self.gate.is_blocked().await {
            self.metrics.record_deferred();
            return TickOutcome::Deferred;
        }

        let mut generation = self.drain();
        if generation.is_empty() {
            return TickOutcome::Idle;
        }

        let keys = generation.keys().to_vec();
        tracing::info!(keys = ?keys, "looking up item(s)");

        let items = match self.service.lookup(&keys).await {
            Ok(items) => items,
            Err(ServiceError::RateLimited { .. }) => {
                self.sink()
                    .report(Anomaly::BatchRateLimited { keys: keys.len() });
                self.fallback(&keys).await
            }
            Err(error) => {
                self.sink().report(Anomaly::LookupFailed { key: None, error });
                self.metrics.record_unresolved(keys.len());
                return TickOutcome::Failed { dropped: keys };
            }
        };

        let resolved = self.dispatch(&mut generation, items).await;

        let found: HashSet<LookupKey, ahash::RandomState> = resolved.iter().copied().collect();
        let unresolved: Vec<LookupKey> = keys
            .into_iter()
            .filter(|key| !found.contains(key))
            .collect();

        if !unresolved.is_empty() {
            tracing::info!(keys = ?unresolved, "could not resolve item(s)");
            self.metrics.record_unresolved(unresolved.len());
        }

        TickOutcome::Completed {
            resolved,
            unresolved,
        }
    }

    /// Swap the current generation for an empty one.
    fn drain(&self) -> PendingLookups<T> {
        std::mem::take(&mut *self.lock_pending())
    }

    /// Resolve keys one at a time after the batch call was rate limited.
    async fn fallback(&self, keys: &[LookupKey]) -> Vec<T> {
        let mut items = Vec::with_capacity(keys.len());

        for &key in keys {
            match self.service.lookup_one(key).await {
                Ok(item) => items.push(item),
                Err(ServiceError::NotFound) => {}
                Err(ServiceError::RateLimited { reset_at }) => {
                    self.gate.enter_cooldown(reset_at).await;
                    self.metrics.record_cooldown();
                    break;
                }
                Err(error) => self.sink().report(Anomaly::LookupFailed {
                    key: Some(key),
                    error,
                }),
            }
        }

        items
    }

    /// Fire the callbacks of every resolved item and wait for all of them.
    ///
    /// Returns the keys whose callbacks fired.
    async fn dispatch(&self, generation: &mut PendingLookups<T>, items: Vec<T>) -> Vec<LookupKey> {
        let mut resolved = Vec::with_capacity(items.len());
        let mut invocations = JoinSet::new();

        for item in items {
            let key = item.key();
            let callbacks = generation.take_callbacks(key);
            if callbacks.is_empty() {
                tracing::debug!(key, "ignoring item nobody is waiting for");
                continue;
            }

            resolved.push(key);
            for callback in callbacks {
                let item = item.clone();
                invocations.spawn_blocking(move || callback(item));
            }
        }

        while let Some(result) = invocations.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    self.sink().report(Anomaly::CallbackPanicked);
                }
            }
        }

        self.metrics.record_resolved(resolved.len());
        resolved
    }

    fn lock_pending(&self) -> MutexGuard<'_, PendingLookups<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sink(&self) -> &Arc<dyn AnomalySink> {
        self.gate.sink()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::Anomaly;
    use crate::infrastructure::mocks::{
        MockClock, MockItem, MockLookupService, MockStore, RecordingSink,
    };
    use std::sync::Mutex as StdMutex;

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        coalescer: Arc<RequestCoalescer<MockItem>>,
        service: Arc<MockLookupService<MockItem>>,
        store: Arc<MockStore>,
        sink: Arc<RecordingSink>,
    }

    fn fixture(items: &[LookupKey]) -> Fixture {
        let service = Arc::new(MockLookupService::with_items(
            items.iter().map(|&key| MockItem::new(key)),
        ));
        let store = Arc::new(MockStore::new());
        let sink = Arc::new(RecordingSink::new());
        let gate = RateLimitGate::new(
            store.clone(),
            Arc::new(MockClock::new(NOW)),
            sink.clone(),
        );
        let coalescer = RequestCoalescer::<MockItem>::builder(service.clone(), gate)
            .build()
            .unwrap();

        Fixture {
            coalescer,
            service,
            store,
            sink,
        }
    }

    fn record(log: &Arc<StdMutex<Vec<LookupKey>>>) -> impl FnOnce(MockItem) + Send + 'static {
        let log = Arc::clone(log);
        move |item| log.lock().unwrap().push(item.key)
    }

    #[tokio::test]
    async fn test_idle_tick() {
        let f = fixture(&[]);
        assert_eq!(f.coalescer.tick().await, TickOutcome::Idle);
        assert!(f.service.batch_calls().is_empty());
    }

    #[tokio::test]
    async fn test_same_key_is_looked_up_once() {
        let f = fixture(&[10]);
        let log = Arc::new(StdMutex::new(Vec::new()));

        for _ in 0..3 {
            f.coalescer.enqueue(10, record(&log));
        }
        assert_eq!(f.coalescer.pending_len(), 1);

        let outcome = f.coalescer.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Completed {
                resolved: vec![10],
                unresolved: vec![],
            }
        );
        assert_eq!(f.service.batch_calls(), vec![vec![10]]);
        assert_eq!(*log.lock().unwrap(), vec![10, 10, 10]);
    }

    #[tokio::test]
    async fn test_duplicate_items_fire_callbacks_once() {
        let f = fixture(&[10]);
        f.service.duplicate_batch_results(true);
        let log = Arc::new(StdMutex::new(Vec::new()));
        f.coalescer.enqueue(10, record(&log));

        f.coalescer.tick().await;

        assert_eq!(*log.lock().unwrap(), vec![10]);
    }

    #[tokio::test]
    async fn test_cancel_before_tick() {
        let f = fixture(&[10, 20]);
        let log = Arc::new(StdMutex::new(Vec::new()));

        let registration = f.coalescer.enqueue(10, record(&log));
        f.coalescer.enqueue(20, record(&log));

        assert!(f.coalescer.cancel(registration));
        assert!(!f.coalescer.cancel(registration));

        f.coalescer.tick().await;
        assert_eq!(f.service.batch_calls(), vec![vec![20]]);
        assert_eq!(*log.lock().unwrap(), vec![20]);
    }

    #[tokio::test]
    async fn test_transport_error_drops_generation() {
        let f = fixture(&[10]);
        f.service
            .fail_batch_with(ServiceError::transport("connection refused"));
        let log = Arc::new(StdMutex::new(Vec::new()));
        f.coalescer.enqueue(10, record(&log));

        assert_eq!(
            f.coalescer.tick().await,
            TickOutcome::Failed { dropped: vec![10] }
        );
        assert_eq!(f.coalescer.pending_len(), 0);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(f.sink.kinds(), vec!["lookup_failed"]);
        assert_eq!(f.coalescer.metrics().lookups_unresolved(), 1);
    }

    #[tokio::test]
    async fn test_deferred_tick_keeps_pending_set() {
        let f = fixture(&[10]);
        f.store.insert("cooldown-until", &(NOW + 60).to_string());
        let log = Arc::new(StdMutex::new(Vec::new()));
        f.coalescer.enqueue(10, record(&log));

        assert_eq!(f.coalescer.tick().await, TickOutcome::Deferred);
        assert_eq!(f.coalescer.pending_len(), 1);
        assert!(f.service.batch_calls().is_empty());
        assert_eq!(f.coalescer.metrics().ticks_deferred(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let f = fixture(&[10]);
        f.coalescer.executing.store(true, Ordering::SeqCst);
        f.coalescer.enqueue(10, |_| {});

        assert_eq!(f.coalescer.tick().await, TickOutcome::Overlapped);
        assert_eq!(f.coalescer.pending_len(), 1);
        assert_eq!(f.sink.anomalies(), vec![Anomaly::OverlappingTick]);

        f.coalescer.executing.store(false, Ordering::SeqCst);
        assert!(matches!(
            f.coalescer.tick().await,
            TickOutcome::Completed { .. }
        ));
    }

    #[tokio::test]
    async fn test_panicking_callback_is_reported() {
        let f = fixture(&[10]);
        let log = Arc::new(StdMutex::new(Vec::new()));
        f.coalescer.enqueue(10, |_| panic!("callback failure"));
        f.coalescer.enqueue(10, record(&log));

        f.coalescer.tick().await;

        assert_eq!(*log.lock().unwrap(), vec![10]);
        assert_eq!(f.sink.anomalies(), vec![Anomaly::CallbackPanicked]);
    }

    #[tokio::test]
    async fn test_builder_rejects_zero_interval() {
        let service: Arc<MockLookupService<MockItem>> = Arc::new(MockLookupService::new());
        let gate = RateLimitGate::new(
            Arc::new(MockStore::new()),
            Arc::new(MockClock::new(NOW)),
            Arc::new(RecordingSink::new()),
        );

        let result = RequestCoalescer::<MockItem>::builder(service, gate)
            .with_tick_interval(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::ZeroTickInterval)));
    }

    #[test]
    fn test_lookup_error_display() {
        let error = LookupError::TimedOut {
            key: 5,
            timeout: Duration::from_secs(2),
        };
        assert_eq!(error.to_string(), "lookup of 5 timed out after 2s");
        assert_eq!(
            LookupError::Unresolved { key: 5 }.to_string(),
            "lookup of 5 was not resolved"
        );
    }
}
