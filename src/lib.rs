//! # lookup-throttle
//!
//! Request coalescing and rate-limit cooldowns for bots talking to a
//! rate-limited HTTP API.
//!
//! The crate sits between a command layer and two groups of endpoints of an
//! external service:
//!
//! - a **lookup** endpoint that resolves many item ids in one call, fronted by
//!   a [`RequestCoalescer`] that batches every lookup requested during one
//!   tick into a single call;
//! - a **posting** endpoint, fronted by an [`OutboundDispatcher`] that sends
//!   one message at a time through a FIFO queue.
//!
//! Both consult a [`RateLimitGate`]: a cooldown timestamp persisted in a
//! shared [`KeyValueStore`]. When the service answers with a rate-limit
//! error, the gate stores the reset time and every process sharing the store
//! stops calling until it has passed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # use async_trait::async_trait;
//! # use lookup_throttle::{Keyed, LookupKey, LookupService, OutboundMessage, PostingService, ServiceError};
//! # #[derive(Clone)]
//! # struct Status { id: LookupKey }
//! # impl Keyed for Status { fn key(&self) -> LookupKey { self.id } }
//! # struct Api;
//! # #[async_trait]
//! # impl LookupService<Status> for Api {
//! #     async fn lookup(&self, _keys: &[LookupKey]) -> Result<Vec<Status>, ServiceError> { Ok(vec![]) }
//! #     async fn lookup_one(&self, _key: LookupKey) -> Result<Status, ServiceError> { Err(ServiceError::NotFound) }
//! # }
//! # #[async_trait]
//! # impl PostingService for Api {
//! #     async fn post(&self, _message: &OutboundMessage) -> Result<(), ServiceError> { Ok(()) }
//! #     async fn set_display_name(&self, _name: &str) -> Result<(), ServiceError> { Ok(()) }
//! # }
//! use lookup_throttle::{
//!     GateConfig, MemoryStore, OutboundDispatcher, RateLimitGate, RequestCoalescer, SystemClock,
//!     TracingSink,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let clock = Arc::new(SystemClock::new());
//!     let sink = Arc::new(TracingSink::new());
//!     let api = Arc::new(Api);
//!
//!     // Lookups and posts are limited separately, so they get separate keys.
//!     let lookup_gate = RateLimitGate::with_config(
//!         store.clone(),
//!         clock.clone(),
//!         sink.clone(),
//!         GateConfig::new("lookup-cooldown")?,
//!     );
//!     let post_gate =
//!         RateLimitGate::with_config(store, clock, sink, GateConfig::new("post-cooldown")?);
//!
//!     let coalescer = RequestCoalescer::<Status>::builder(api.clone(), lookup_gate)
//!         .with_tick_interval(Duration::from_secs(1))
//!         .build()?;
//!     let ticker = coalescer.start();
//!
//!     let (outbox, dispatcher) = OutboundDispatcher::builder(api, post_gate).build().spawn();
//!
//!     coalescer.enqueue(1234, move |status: Status| {
//!         let _ = outbox.reply(status.id, "found it");
//!     });
//!
//!     ticker.shutdown().await?;
//!     dispatcher.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Coalescing
//!
//! Every call to [`RequestCoalescer::enqueue`] adds a callback to the current
//! *generation* of pending lookups. Once per tick the generation is swapped
//! out and resolved with one batch call:
//!
//! - callbacks registered for the same key share a single lookup;
//! - every callback fires at most once, even if the service returns an item
//!   twice;
//! - keys the service does not return are dropped with their callbacks;
//! - a tick that is still running when the next one fires is skipped and
//!   reported, never queued.
//!
//! If the batch call is rate limited the coalescer falls back to single
//! lookups in registration order and stops at the first one that is rate
//! limited as well, storing its reset time in the gate.
//!
//! For request/response style code, [`RequestCoalescer::enqueue_blocking`]
//! waits for the item with a timeout:
//!
//! ```rust,no_run
//! # use lookup_throttle::{Keyed, LookupError, LookupKey, RequestCoalescer};
//! # use std::sync::Arc;
//! # use std::time::Duration;
//! # #[derive(Clone)]
//! # struct Status { id: LookupKey }
//! # impl Keyed for Status { fn key(&self) -> LookupKey { self.id } }
//! # async fn example(coalescer: Arc<RequestCoalescer<Status>>) {
//! match coalescer.enqueue_blocking(1234, Duration::from_secs(5)).await {
//!     Ok(status) => println!("found {}", status.id),
//!     Err(LookupError::Unresolved { key }) => println!("{} does not exist", key),
//!     Err(LookupError::TimedOut { .. }) => println!("service is slow or cooling down"),
//! }
//! # }
//! ```
//!
//! ## Cooldowns
//!
//! The gate stores one decimal Unix timestamp per key: `0` means
//! unrestricted, anything in the future blocks calls. The first check after
//! the timestamp has passed resets it to `0` with a compare-and-set, and only
//! that caller is told the cooldown just ended. The coalescer only reads the
//! gate, so when it shares a key with the dispatcher the reset is always
//! observed by the dispatcher, which uses it to restore its display name
//! exactly once:
//!
//! ```rust,no_run
//! # use lookup_throttle::{DisplayNames, OutboundDispatcher, PostingService, RateLimitGate};
//! # use std::sync::Arc;
//! # fn example(api: Arc<dyn PostingService>, gate: RateLimitGate) {
//! let dispatcher = OutboundDispatcher::builder(api, gate)
//!     .with_display_names(DisplayNames::new("dicebot", "dicebot (resting)"))
//!     .build();
//! # }
//! ```
//!
//! Store failures never block callers. The gate fails open and reports an
//! [`Anomaly`] to its [`AnomalySink`]; [`TracingSink`] logs anomalies as
//! `tracing` events with an `anomaly` field.
//!
//! ## Sharing State Between Processes
//!
//! With the `redis-storage` feature, [`RedisStore`] keeps cooldowns in Redis
//! so that several bot processes honour the same rate limit:
//!
//! ```rust,ignore
//! use lookup_throttle::{RedisStore, RedisStoreConfig};
//!
//! let store = RedisStore::connect_with_config(
//!     "redis://127.0.0.1/",
//!     RedisStoreConfig { key_prefix: "dicebot:".to_string() },
//! )
//! .await?;
//! ```
//!
//! ## Observability
//!
//! Coalescers and dispatchers built with the same [`Metrics`] share counters:
//!
//! ```rust,no_run
//! # use lookup_throttle::Metrics;
//! let metrics = Metrics::new();
//! // .with_metrics(metrics.clone()) on both builders
//!
//! let snapshot = metrics.snapshot();
//! println!("Resolution rate: {:.2}%", snapshot.resolution_rate() * 100.0);
//! println!("Messages skipped: {}", snapshot.messages_skipped);
//! ```

// Domain layer - pure business logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    cooldown::{CooldownReading, GateDecision},
    error::{Anomaly, ServiceError, StoreError},
    lookup::{Callback, Keyed, LookupKey, PendingLookups, Registration},
    message::{OutboundMessage, Target},
    sender::Sender,
};

pub use application::{
    coalescer::{LookupError, RequestCoalescer, RequestCoalescerBuilder, TickOutcome},
    config::{
        CoalescerConfig, ConfigError, DispatcherConfig, DisplayNames, GateConfig,
        DEFAULT_COOLDOWN_KEY,
    },
    dispatcher::{
        DispatchError, DispatchOutcome, OutboundDispatcher, OutboundDispatcherBuilder, Outbox,
    },
    gate::RateLimitGate,
    handle::{ShutdownError, ShutdownSignal, TaskHandle},
    metrics::{Metrics, MetricsSnapshot},
    ports::{AnomalySink, Clock, KeyValueStore, LookupService, PostingService},
};

pub use infrastructure::{clock::SystemClock, sink::TracingSink, storage::MemoryStore};

#[cfg(feature = "redis-storage")]
pub use infrastructure::redis_storage::{RedisStore, RedisStoreConfig};
