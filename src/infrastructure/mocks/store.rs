//! Mock key-value store for testing.

use crate::application::ports::KeyValueStore;
use crate::domain::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory store whose availability can be switched off.
///
/// While unavailable, every operation fails with `StoreError::Unavailable`.
#[derive(Debug, Clone, Default)]
pub struct MockStore {
    values: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<AtomicBool>,
}

impl MockStore {
    /// Create an empty, available store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value directly, bypassing availability.
    pub fn insert(&self, name: &str, value: &str) {
        self.lock().insert(name.to_string(), value.to_string());
    }

    /// Read a value directly, bypassing availability.
    pub fn value(&self, name: &str) -> Option<String> {
        self.lock().get(name).cloned()
    }

    /// Make every subsequent operation fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.values
            .lock()
            .expect("MockStore mutex poisoned - a test thread panicked while holding the lock")
    }
}

#[async_trait]
impl KeyValueStore for MockStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.value(name))
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.check()?;
        self.insert(name, value);
        Ok(())
    }

    async fn set_if_absent(&self, name: &str, value: &str) -> Result<bool, StoreError> {
        self.check()?;
        let mut values = self.lock();
        if values.contains_key(name) {
            return Ok(false);
        }
        values.insert(name.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.check()?;
        self.lock().remove(name);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        name: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut values = self.lock();
        match values.get_mut(name) {
            Some(current) if current.as_str() == expected => {
                *current = value.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
