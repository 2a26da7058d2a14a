//! Redis-backed key-value store.
//!
//! Lets several processes share one cooldown: every gate pointed at the same
//! Redis server and key sees the same timestamp.
//!
//! ## Architecture
//!
//! - Keys: the gate's key with a configurable prefix
//! - Values: decimal Unix timestamps, stored as plain strings
//! - No TTL: a cooldown must survive until it is explicitly reset
//!
//! ## Features
//!
//! - Reconnection handled by `redis::aio::ConnectionManager`
//! - Atomic `compare_and_set` through a server-side Lua script
//! - `set_if_absent` maps to `SETNX`
//! - Async-only interface (requires `tokio` runtime)
//!
//! ## Error Handling
//!
//! Redis failures are returned as [`StoreError::Unavailable`]. The gate turns
//! them into anomalies and fails open, so an outage never stalls lookups or
//! sends.
//!
//! ## Example
//!
//! ```rust,ignore
//! use lookup_throttle::{RateLimitGate, RedisStore, SystemClock, TracingSink};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = RedisStore::connect("redis://127.0.0.1/")
//!         .await
//!         .expect("Failed to connect to Redis");
//!
//!     let gate = RateLimitGate::new(
//!         Arc::new(store),
//!         Arc::new(SystemClock::new()),
//!         Arc::new(TracingSink::new()),
//!     );
//! }
//! ```

use crate::application::ports::KeyValueStore;
use crate::domain::error::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};
use std::fmt;

const COMPARE_AND_SET: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

/// Configuration for Redis storage.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RedisStoreConfig {
    /// Key prefix for Redis keys (default: "lookup-throttle:")
    pub key_prefix: String,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "lookup-throttle:".to_string(),
        }
    }
}

/// Redis-backed store shared across processes.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    compare_and_set: Script,
    config: RedisStoreConfig,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to Redis with default configuration.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., "redis://127.0.0.1/")
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        Self::connect_with_config(url, RedisStoreConfig::default()).await
    }

    /// Connect to Redis with custom configuration.
    ///
    /// # Errors
    /// Returns error if connection fails.
    pub async fn connect_with_config(
        url: &str,
        config: RedisStoreConfig,
    ) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            compare_and_set: Script::new(COMPARE_AND_SET),
            config,
        })
    }

    /// Get the store configuration.
    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.config.key_prefix, name)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, name: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(self.key(name)).await?;
        Ok(value)
    }

    async fn set(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(self.key(name), value).await?;
        Ok(())
    }

    async fn set_if_absent(&self, name: &str, value: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let written: bool = conn.set_nx(self.key(name), value).await?;
        Ok(written)
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(self.key(name)).await?;
        Ok(())
    }

    async fn compare_and_set(
        &self,
        name: &str,
        expected: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.connection.clone();
        let swapped: i32 = self
            .compare_and_set
            .key(self.key(name))
            .arg(expected)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;

        if swapped == 1 {
            tracing::debug!(key = name, "compare-and-set succeeded");
        }
        Ok(swapped == 1)
    }
}
