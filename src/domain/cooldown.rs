//! Cooldown state as persisted in the shared store.
//!
//! The store holds a single decimal integer per gate: the Unix timestamp until
//! which calls must not be attempted, or `0` when unrestricted. This module
//! interprets a raw stored value against the current time; the gate decides
//! what to write back.

/// Stored value meaning "never limited".
pub const UNRESTRICTED: i64 = 0;

/// Stored representation of [`UNRESTRICTED`].
pub const UNRESTRICTED_VALUE: &str = "0";

/// Interpretation of the stored cooldown value at a given instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CooldownReading {
    /// No value stored yet.
    Missing,
    /// Value is `0`.
    Unrestricted,
    /// Value is a timestamp still in the future.
    Active {
        /// End of the cooldown
        until: i64,
    },
    /// Value is a non-zero timestamp that has passed.
    Expired {
        /// End of the cooldown that just elapsed
        until: i64,
    },
    /// Value is not an integer.
    Corrupt {
        /// The value found in the store
        raw: String,
    },
}

impl CooldownReading {
    /// Classify a raw stored value at `now` (Unix seconds).
    ///
    /// A timestamp equal to `now` counts as expired.
    pub fn classify(raw: Option<&str>, now: i64) -> Self {
        let Some(raw) = raw else {
            return CooldownReading::Missing;
        };

        match raw.parse::<i64>() {
            Ok(UNRESTRICTED) => CooldownReading::Unrestricted,
            Ok(until) if until > now => CooldownReading::Active { until },
            Ok(until) => CooldownReading::Expired { until },
            Err(_) => CooldownReading::Corrupt {
                raw: raw.to_string(),
            },
        }
    }
}

/// Answer of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateDecision {
    /// Whether the caller may call the external service now
    pub can_proceed: bool,
    /// Whether this check observed the end of a cooldown episode
    pub just_unlocked: bool,
}

impl GateDecision {
    /// Unrestricted, no transition.
    pub const ALLOW: GateDecision = GateDecision {
        can_proceed: true,
        just_unlocked: false,
    };

    /// Cooldown still active.
    pub const BLOCKED: GateDecision = GateDecision {
        can_proceed: false,
        just_unlocked: false,
    };

    /// First check after the cooldown expired.
    pub const UNLOCKED: GateDecision = GateDecision {
        can_proceed: true,
        just_unlocked: true,
    };
}
