//! Infrastructure layer - external adapters and integrations.
//!
//! This layer provides adapters for:
//! - Clock abstraction (system time vs mock)
//! - Key-value stores (in-memory, Redis)
//! - Anomaly reporting through `tracing`

pub mod clock;
pub mod sink;
pub mod storage;

#[cfg(feature = "redis-storage")]
pub mod redis_storage;

/// Mock implementations for testing.
///
/// This module is only available when the `test-helpers` feature is enabled,
/// or during test builds. It provides controllable test doubles for every
/// port.
///
/// The feature is on by default. With default features disabled, opt back in:
/// ```toml
/// [dev-dependencies]
/// lookup-throttle = { version = "*", features = ["test-helpers"] }
/// ```
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;
