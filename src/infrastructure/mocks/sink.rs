//! Recording anomaly sink for testing.

use crate::application::ports::AnomalySink;
use crate::domain::error::Anomaly;
use std::sync::{Mutex, MutexGuard};

/// Sink that keeps every reported anomaly.
#[derive(Debug, Default)]
pub struct RecordingSink {
    anomalies: Mutex<Vec<Anomaly>>,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All anomalies reported so far.
    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.lock().clone()
    }

    /// Kinds of all anomalies reported so far.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.lock().iter().map(Anomaly::kind).collect()
    }

    /// Check whether nothing was reported.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget everything reported so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Anomaly>> {
        self.anomalies
            .lock()
            .expect("RecordingSink mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl AnomalySink for RecordingSink {
    fn report(&self, anomaly: Anomaly) {
        self.lock().push(anomaly);
    }
}
