//! Error taxonomy shared by every component.
//!
//! None of these errors ever reach a caller that registered a lookup or queued
//! a message. The core absorbs them and forwards the interesting ones to an
//! [`AnomalySink`](crate::application::ports::AnomalySink) as an [`Anomaly`].

use crate::domain::lookup::LookupKey;
use std::fmt;

/// Error returned by the external lookup/posting service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The service rejected the call for exceeding its rate limit.
    RateLimited {
        /// Server-declared reset time (Unix seconds), if the response carried one
        reset_at: Option<i64>,
    },
    /// The requested item does not exist or is not visible to us.
    NotFound,
    /// Any other failure, including connection errors.
    Transport(String),
}

impl ServiceError {
    /// Shorthand for a rate-limit error with a declared reset time.
    pub fn rate_limited(reset_at: i64) -> Self {
        ServiceError::RateLimited {
            reset_at: Some(reset_at),
        }
    }

    /// Shorthand for a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        ServiceError::Transport(message.into())
    }

    /// Check whether this is a rate-limit response.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ServiceError::RateLimited { .. })
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::RateLimited {
                reset_at: Some(reset_at),
            } => write!(f, "rate limited until {}", reset_at),
            ServiceError::RateLimited { reset_at: None } => write!(f, "rate limited"),
            ServiceError::NotFound => write!(f, "not found"),
            ServiceError::Transport(message) => write!(f, "transport error: {}", message),
        }
    }
}

impl std::error::Error for ServiceError {}

/// Error returned by the shared key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or rejected the command.
    Unavailable(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(message) => write!(f, "store unavailable: {}", message),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(feature = "redis-storage")]
impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Something the core absorbed instead of failing.
///
/// Reported through the anomaly sink. The variants correspond to the
/// situations an operator would want to hear about: overlapping ticks,
/// self-healed state, unreachable infrastructure and failed calls.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Anomaly {
    /// A tick fired while the previous one was still running and was skipped.
    OverlappingTick,
    /// The persisted cooldown value was not an integer and was reset to 0.
    CorruptCooldown {
        /// Store key holding the value
        key: String,
        /// The value found in the store
        raw: String,
    },
    /// A store operation failed; the gate failed open.
    StoreUnavailable {
        /// Which store operation failed
        operation: &'static str,
        /// Underlying error
        error: StoreError,
    },
    /// The batch lookup was rate limited; single lookups were used instead.
    BatchRateLimited {
        /// Number of keys in the affected generation
        keys: usize,
    },
    /// A lookup call failed. `key` is `None` for the batch call.
    LookupFailed {
        /// Key of the single lookup, if any
        key: Option<LookupKey>,
        /// Underlying error
        error: ServiceError,
    },
    /// An outbound message could not be delivered and was dropped.
    SendFailed {
        /// Underlying error
        error: ServiceError,
    },
    /// The lock or unlock display-name action failed.
    ActionFailed {
        /// The display name that could not be applied
        display_name: String,
        /// Underlying error
        error: ServiceError,
    },
    /// A lookup callback panicked.
    CallbackPanicked,
}

impl Anomaly {
    /// Short machine-friendly name of the anomaly kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Anomaly::OverlappingTick => "overlapping_tick",
            Anomaly::CorruptCooldown { .. } => "corrupt_cooldown",
            Anomaly::StoreUnavailable { .. } => "store_unavailable",
            Anomaly::BatchRateLimited { .. } => "batch_rate_limited",
            Anomaly::LookupFailed { .. } => "lookup_failed",
            Anomaly::SendFailed { .. } => "send_failed",
            Anomaly::ActionFailed { .. } => "action_failed",
            Anomaly::CallbackPanicked => "callback_panicked",
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::OverlappingTick => {
                write!(f, "lookup tick fired while the previous tick was running")
            }
            Anomaly::CorruptCooldown { key, raw } => {
                write!(f, "non-integer value {:?} stored under {}, reset to 0", raw, key)
            }
            Anomaly::StoreUnavailable { operation, error } => {
                write!(f, "store {} failed: {}", operation, error)
            }
            Anomaly::BatchRateLimited { keys } => write!(
                f,
                "batch lookup of {} key(s) rate limited, falling back to single lookups",
                keys
            ),
            Anomaly::LookupFailed {
                key: Some(key),
                error,
            } => write!(f, "lookup of {} failed: {}", key, error),
            Anomaly::LookupFailed { key: None, error } => {
                write!(f, "batch lookup failed: {}", error)
            }
            Anomaly::SendFailed { error } => write!(f, "outbound message dropped: {}", error),
            Anomaly::ActionFailed {
                display_name,
                error,
            } => write!(f, "could not set display name {:?}: {}", display_name, error),
            Anomaly::CallbackPanicked => write!(f, "lookup callback panicked"),
        }
    }
}
