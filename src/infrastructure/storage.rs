//! In-process key-value store.
//!
//! Provides a concurrent store for deployments where a single process owns
//! the cooldown state, and for tests.

use crate::application::ports::KeyValueStore;
use crate::domain::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Thread-safe in-memory store backed by DashMap.
///
/// Clones share the same map, so several gates in one process can observe
/// each other's writes. State is lost when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    map: Arc<DashMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of stored keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.get(name).map(|value| value.clone()))
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.map.insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn set_if_absent(&self, name: &str, value: &str) -> Result<bool, StoreError> {
        match self.map.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(value.to_string());
                Ok(true)
            }
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.map.remove(name);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        name: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        // The shard stays write-locked while the entry reference is alive.
        match self.map.get_mut(name) {
            Some(mut current) if current.as_str() == expected => {
                *current = value.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
