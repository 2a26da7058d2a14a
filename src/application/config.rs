//! Component configuration.
//!
//! Every config validates itself on construction so that a built component
//! never has to re-check its settings.

use std::time::Duration;

/// Default store key for the cooldown timestamp.
pub const DEFAULT_COOLDOWN_KEY: &str = "cooldown-until";

/// Error returned when configuration validation fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Tick interval duration must be greater than zero
    ZeroTickInterval,
    /// Default cooldown duration must be greater than zero
    ZeroDefaultCooldown,
    /// Store key must not be empty
    EmptyCooldownKey,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ZeroTickInterval => write!(f, "tick interval must be greater than 0"),
            ConfigError::ZeroDefaultCooldown => {
                write!(f, "default cooldown must be greater than 0")
            }
            ConfigError::EmptyCooldownKey => write!(f, "cooldown key must not be empty"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Configuration for a [`RateLimitGate`](crate::application::gate::RateLimitGate).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GateConfig {
    /// Store key holding the cooldown timestamp. Must be stable across
    /// restarts so the cooldown survives them.
    pub key: String,
    /// Cooldown applied when a rate-limit response declares no reset time
    pub default_cooldown: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_COOLDOWN_KEY.to_string(),
            default_cooldown: Duration::from_secs(10 * 60),
        }
    }
}

impl GateConfig {
    /// Create a gate config for the given store key.
    ///
    /// # Errors
    /// Returns `ConfigError::EmptyCooldownKey` if `key` is empty.
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ConfigError::EmptyCooldownKey);
        }
        Ok(Self {
            key,
            ..Self::default()
        })
    }

    /// Set the fallback cooldown.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroDefaultCooldown` if `cooldown` is zero.
    pub fn with_default_cooldown(mut self, cooldown: Duration) -> Result<Self, ConfigError> {
        if cooldown.is_zero() {
            return Err(ConfigError::ZeroDefaultCooldown);
        }
        self.default_cooldown = cooldown;
        Ok(self)
    }
}

/// Configuration for a [`RequestCoalescer`](crate::application::coalescer::RequestCoalescer).
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoalescerConfig {
    /// How often pending lookups are drained
    pub tick_interval: Duration,
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl CoalescerConfig {
    /// Create a coalescer config with the given tick interval.
    ///
    /// # Errors
    /// Returns `ConfigError::ZeroTickInterval` if `tick_interval` is zero.
    pub fn new(tick_interval: Duration) -> Result<Self, ConfigError> {
        if tick_interval.is_zero() {
            return Err(ConfigError::ZeroTickInterval);
        }
        Ok(Self { tick_interval })
    }
}

/// Display names switched when posting is rate limited and when it recovers.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DisplayNames {
    /// Name restored once the cooldown is over
    pub normal: String,
    /// Name shown while posting is rate limited
    pub limited: String,
}

impl DisplayNames {
    /// Create a pair of display names.
    pub fn new(normal: impl Into<String>, limited: impl Into<String>) -> Self {
        Self {
            normal: normal.into(),
            limited: limited.into(),
        }
    }
}

/// Configuration for an [`OutboundDispatcher`](crate::application::dispatcher::OutboundDispatcher).
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DispatcherConfig {
    /// Names to switch on cooldown transitions; `None` disables the actions
    pub display_names: Option<DisplayNames>,
}

impl DispatcherConfig {
    /// Switch display names on cooldown transitions.
    pub fn with_display_names(mut self, names: DisplayNames) -> Self {
        self.display_names = Some(names);
        self
    }
}
