//! Mock lookup service for testing.

use crate::application::ports::LookupService;
use crate::domain::error::ServiceError;
use crate::domain::lookup::{Keyed, LookupKey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Minimal item type for lookup tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockItem {
    pub key: LookupKey,
}

impl MockItem {
    /// Create an item resolving `key`.
    pub fn new(key: LookupKey) -> Self {
        Self { key }
    }
}

impl Keyed for MockItem {
    fn key(&self) -> LookupKey {
        self.key
    }
}

#[derive(Debug)]
struct State<T> {
    items: HashMap<LookupKey, T>,
    batch_failure: Option<ServiceError>,
    key_failures: HashMap<LookupKey, ServiceError>,
    duplicate_results: bool,
    delay: Duration,
    batch_calls: Vec<Vec<LookupKey>>,
    single_calls: Vec<LookupKey>,
}

/// Scriptable lookup service that records every call.
///
/// Keys without a scripted item resolve to nothing in batch calls and to
/// `ServiceError::NotFound` in single calls.
#[derive(Debug)]
pub struct MockLookupService<T> {
    state: Mutex<State<T>>,
}

impl<T: Keyed + Clone> MockLookupService<T> {
    /// Create a service that knows no items.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                items: HashMap::new(),
                batch_failure: None,
                key_failures: HashMap::new(),
                duplicate_results: false,
                delay: Duration::ZERO,
                batch_calls: Vec::new(),
                single_calls: Vec::new(),
            }),
        }
    }

    /// Create a service that knows `items`.
    pub fn with_items(items: impl IntoIterator<Item = T>) -> Self {
        let service = Self::new();
        for item in items {
            service.insert(item);
        }
        service
    }

    /// Make an item resolvable.
    pub fn insert(&self, item: T) {
        self.lock().items.insert(item.key(), item);
    }

    /// Fail every batch call with `error` until cleared.
    pub fn fail_batch_with(&self, error: ServiceError) {
        self.lock().batch_failure = Some(error);
    }

    /// Let batch calls succeed again.
    pub fn clear_batch_failure(&self) {
        self.lock().batch_failure = None;
    }

    /// Fail single lookups of `key` with `error`.
    pub fn fail_key_with(&self, key: LookupKey, error: ServiceError) {
        self.lock().key_failures.insert(key, error);
    }

    /// Return every batch item twice.
    pub fn duplicate_batch_results(&self, duplicate: bool) {
        self.lock().duplicate_results = duplicate;
    }

    /// Delay every call by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = delay;
    }

    /// Keys of every batch call, in call order.
    pub fn batch_calls(&self) -> Vec<Vec<LookupKey>> {
        self.lock().batch_calls.clone()
    }

    /// Keys of every single lookup, in call order.
    pub fn single_calls(&self) -> Vec<LookupKey> {
        self.lock().single_calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().expect(
            "MockLookupService mutex poisoned - a test thread panicked while holding the lock",
        )
    }
}

impl<T: Keyed + Clone> Default for MockLookupService<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> LookupService<T> for MockLookupService<T>
where
    T: Keyed + Clone + Send + 'static,
{
    async fn lookup(&self, keys: &[LookupKey]) -> Result<Vec<T>, ServiceError> {
        let delay = {
            let mut state = self.lock();
            state.batch_calls.push(keys.to_vec());
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        if let Some(error) = &state.batch_failure {
            return Err(error.clone());
        }

        let copies = if state.duplicate_results { 2 } else { 1 };
        let mut items = Vec::new();
        for key in keys {
            if let Some(item) = state.items.get(key) {
                for _ in 0..copies {
                    items.push(item.clone());
                }
            }
        }
        Ok(items)
    }

    async fn lookup_one(&self, key: LookupKey) -> Result<T, ServiceError> {
        let delay = {
            let mut state = self.lock();
            state.single_calls.push(key);
            state.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        if let Some(error) = state.key_failures.get(&key) {
            return Err(error.clone());
        }
        state.items.get(&key).cloned().ok_or(ServiceError::NotFound)
    }
}
