//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling deterministic
/// testing of cooldown expiry.
///
/// # Examples
///
/// ```
/// use lookup_throttle::infrastructure::mocks::MockClock;
/// use lookup_throttle::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::new(1_700_000_000);
/// assert_eq!(clock.now(), 1_700_000_000);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), 1_700_000_010);
///
/// clock.set(42);
/// assert_eq!(clock.now(), 42);
/// ```
///
/// # Thread Safety
///
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_time: Arc<Mutex<i64>>,
}

impl MockClock {
    /// Create a mock clock starting at `start` (Unix seconds).
    pub fn new(start: i64) -> Self {
        Self {
            current_time: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration, rounded down to whole seconds.
    pub fn advance(&self, duration: Duration) {
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time += duration.as_secs() as i64;
    }

    /// Set the clock to a specific timestamp.
    pub fn set(&self, timestamp: i64) {
        let mut time = self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time = timestamp;
    }
}

impl Clock for MockClock {
    fn now(&self) -> i64 {
        *self
            .current_time
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}
