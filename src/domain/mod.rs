//! Domain layer - pure types with no I/O.
//!
//! This layer contains the core concepts and invariants:
//! - Pending lookup generations and callbacks
//! - Cooldown interpretation and gate decisions
//! - Outbound messages and the closed set of senders
//! - The error and anomaly taxonomy
//!
//! All types in this layer are pure and easily testable.

pub mod cooldown;
pub mod error;
pub mod lookup;
pub mod message;
pub mod sender;
