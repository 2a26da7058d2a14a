//! Mock implementations for testing.
//!
//! This module provides test doubles for every port, enabling controlled
//! testing of the coalescer, the dispatcher and the gate.

pub mod clock;
pub mod layer;
pub mod lookup;
pub mod posting;
pub mod sink;
pub mod store;

pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use lookup::{MockItem, MockLookupService};
pub use posting::MockPostingService;
pub use sink::RecordingSink;
pub use store::MockStore;
