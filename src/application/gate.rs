//! Persisted cooldown gate.
//!
//! The gate answers "may I call the external service now?" by re-reading a
//! single timestamp from the shared store on every check. Nothing is cached
//! in-process, so every coalescer and dispatcher sharing the key, in this
//! process or another, sees the same cooldown.
//!
//! Store failures never block callers: the gate fails open and reports the
//! failure to its [`AnomalySink`].

use crate::application::config::GateConfig;
use crate::application::ports::{AnomalySink, Clock, KeyValueStore};
use crate::domain::cooldown::{CooldownReading, GateDecision, UNRESTRICTED_VALUE};
use crate::domain::error::{Anomaly, StoreError};
use std::fmt;
use std::sync::Arc;

/// Shared cooldown gate backed by a [`KeyValueStore`].
///
/// Cheap to clone; clones share the store, clock and sink.
#[derive(Clone)]
pub struct RateLimitGate {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn AnomalySink>,
    config: GateConfig,
}

impl fmt::Debug for RateLimitGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitGate")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RateLimitGate {
    /// Create a gate with the default configuration.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn AnomalySink>,
    ) -> Self {
        Self::with_config(store, clock, sink, GateConfig::default())
    }

    /// Create a gate with a custom configuration.
    pub fn with_config(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn AnomalySink>,
        config: GateConfig,
    ) -> Self {
        Self {
            store,
            clock,
            sink,
            config,
        }
    }

    /// Store key holding the cooldown.
    pub fn key(&self) -> &str {
        &self.config.key
    }

    /// Get the gate configuration.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Sink receiving anomalies from this gate and the components using it.
    pub fn sink(&self) -> &Arc<dyn AnomalySink> {
        &self.sink
    }

    /// Current time according to the gate's clock.
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Check whether a call may proceed, resetting an expired cooldown.
    ///
    /// Returns `just_unlocked = true` to exactly one caller per cooldown
    /// episode: the expired value is replaced with `0` through
    /// `compare_and_set`, and only the caller whose swap succeeds sees the
    /// transition. Other racers simply proceed.
    pub async fn check_and_maybe_unlock(&self) -> GateDecision {
        let key = self.key();

        let raw = match self.store.get(key).await {
            Ok(raw) => raw,
            Err(error) => {
                self.report_store_error("get", error);
                return GateDecision::ALLOW;
            }
        };

        match CooldownReading::classify(raw.as_deref(), self.now()) {
            CooldownReading::Missing => {
                // A cooldown written since our read wins over the default.
                if let Err(error) = self.store.set_if_absent(key, UNRESTRICTED_VALUE).await {
                    self.report_store_error("set_if_absent", error);
                }
                GateDecision::ALLOW
            }
            CooldownReading::Unrestricted => GateDecision::ALLOW,
            CooldownReading::Active { until } => {
                tracing::debug!(key, until, "cooldown active");
                GateDecision::BLOCKED
            }
            CooldownReading::Expired { until } => {
                let expected = raw.as_deref().unwrap_or_default();
                match self
                    .store
                    .compare_and_set(key, expected, UNRESTRICTED_VALUE)
                    .await
                {
                    Ok(true) => {
                        tracing::info!(key, until, "cooldown expired");
                        GateDecision::UNLOCKED
                    }
                    // Another client made the transition first.
                    Ok(false) => GateDecision::ALLOW,
                    Err(error) => {
                        self.report_store_error("compare_and_set", error);
                        GateDecision::ALLOW
                    }
                }
            }
            CooldownReading::Corrupt { raw } => {
                self.sink.report(Anomaly::CorruptCooldown {
                    key: key.to_string(),
                    raw: raw.clone(),
                });
                // Only replace the value we judged corrupt.
                if let Err(error) = self
                    .store
                    .compare_and_set(key, &raw, UNRESTRICTED_VALUE)
                    .await
                {
                    self.report_store_error("compare_and_set", error);
                }
                GateDecision::ALLOW
            }
        }
    }

    /// Check whether an active cooldown blocks calls, without writing.
    ///
    /// Expired, missing and unparsable values all count as not blocked and
    /// are left in place, so the expiry transition (and its
    /// `just_unlocked` signal) stays with [`check_and_maybe_unlock`].
    /// Store failures are reported and fail open.
    ///
    /// [`check_and_maybe_unlock`]: RateLimitGate::check_and_maybe_unlock
    pub async fn is_blocked(&self) -> bool {
        let key = self.key();

        let raw = match self.store.get(key).await {
            Ok(raw) => raw,
            Err(error) => {
                self.report_store_error("get", error);
                return false;
            }
        };

        match CooldownReading::classify(raw.as_deref(), self.now()) {
            CooldownReading::Active { until } => {
                tracing::debug!(key, until, "cooldown active");
                true
            }
            _ => false,
        }
    }

    /// Overwrite the cooldown with `until` (Unix seconds).
    ///
    /// Only call this with a reset time declared by the external service.
    pub async fn set_cooldown(&self, until: i64) {
        if let Err(error) = self.store.set(self.key(), &until.to_string()).await {
            self.report_store_error("set", error);
            return;
        }
        tracing::warn!(key = self.key(), until, "rate limited, cooling down");
    }

    /// Start a cooldown after a rate-limit response.
    ///
    /// Uses the server-declared `reset_at` when there is one, otherwise
    /// `now + default_cooldown`. Returns the timestamp written.
    pub async fn enter_cooldown(&self, reset_at: Option<i64>) -> i64 {
        let until = reset_at.unwrap_or_else(|| {
            let fallback =
                i64::try_from(self.config.default_cooldown.as_secs()).unwrap_or(i64::MAX);
            self.now().saturating_add(fallback)
        });
        self.set_cooldown(until).await;
        until
    }

    /// Read the stored cooldown timestamp.
    ///
    /// Returns `Ok(None)` if nothing is stored or the value is not an integer.
    pub async fn cooldown_until(&self) -> Result<Option<i64>, StoreError> {
        let raw = self.store.get(self.key()).await?;
        Ok(raw.and_then(|raw| raw.parse().ok()))
    }

    /// Delete the stored cooldown. The next check recreates it as `0`.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.store.delete(self.key()).await
    }

    fn report_store_error(&self, operation: &'static str, error: StoreError) {
        self.sink.report(Anomaly::StoreUnavailable { operation, error });
    }
}
