//! Ports (interfaces) for the application layer.
//!
//! In hexagonal architecture, ports define the interfaces that the application
//! layer needs. Infrastructure adapters implement these ports; the external
//! service clients are supplied by the host application.

use crate::domain::error::{Anomaly, ServiceError, StoreError};
use crate::domain::lookup::LookupKey;
use crate::domain::message::OutboundMessage;
use async_trait::async_trait;
use std::fmt::Debug;

/// Port for obtaining the current wall-clock time.
///
/// Cooldowns are persisted as Unix timestamps shared between processes, so
/// this is wall-clock time rather than a monotonic instant.
/// Infrastructure provides concrete implementations (SystemClock, MockClock).
pub trait Clock: Send + Sync + Debug {
    /// Current time in Unix seconds.
    fn now(&self) -> i64;
}

/// Port for the shared, persisted key-value store.
///
/// The store is the only state shared between processes. Implementations must
/// not cache values locally: every `get` has to observe writes made by other
/// processes.
#[async_trait]
pub trait KeyValueStore: Send + Sync + Debug {
    /// Read a value. `Ok(None)` means the key is absent.
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite a value unconditionally.
    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError>;

    /// Write a value only if the key is absent.
    ///
    /// Returns `true` if the value was written. Must be atomic like
    /// `compare_and_set`.
    async fn set_if_absent(&self, name: &str, value: &str) -> Result<bool, StoreError>;

    /// Remove a value.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Replace the value only if it currently equals `expected`.
    ///
    /// Returns `true` if the value was replaced. The check and the write must
    /// be atomic with respect to every other client of the store.
    async fn compare_and_set(
        &self,
        name: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, StoreError>;
}

/// Port for the external lookup endpoints.
#[async_trait]
pub trait LookupService<T>: Send + Sync {
    /// Look up many keys in one call.
    ///
    /// The result may omit keys silently (deleted or private items).
    async fn lookup(&self, keys: &[LookupKey]) -> Result<Vec<T>, ServiceError>;

    /// Look up a single key.
    async fn lookup_one(&self, key: LookupKey) -> Result<T, ServiceError>;
}

/// Port for the external posting endpoints.
#[async_trait]
pub trait PostingService: Send + Sync {
    /// Send one message.
    async fn post(&self, message: &OutboundMessage) -> Result<(), ServiceError>;

    /// Change the public display name of our identity.
    async fn set_display_name(&self, name: &str) -> Result<(), ServiceError>;
}

/// Port for reporting absorbed failures.
///
/// Implementations must not panic and should return quickly; they are called
/// from inside ticks and the dispatcher loop.
pub trait AnomalySink: Send + Sync + Debug {
    /// Record an anomaly.
    fn report(&self, anomaly: Anomaly);
}
