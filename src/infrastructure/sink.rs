//! Anomaly sink backed by `tracing`.

use crate::application::ports::AnomalySink;
use crate::domain::error::Anomaly;

/// Reports every anomaly as a `tracing` event.
///
/// Failed calls and infrastructure outages are logged at `ERROR`, everything
/// the core recovered from on its own at `WARN`. Each event carries an
/// `anomaly` field with [`Anomaly::kind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// Create a new tracing sink.
    pub fn new() -> Self {
        Self
    }
}

impl AnomalySink for TracingSink {
    fn report(&self, anomaly: Anomaly) {
        let kind = anomaly.kind();
        match anomaly {
            Anomaly::StoreUnavailable { .. }
            | Anomaly::SendFailed { .. }
            | Anomaly::ActionFailed { .. }
            | Anomaly::CallbackPanicked => {
                tracing::error!(anomaly = kind, "{}", anomaly);
            }
            _ => tracing::warn!(anomaly = kind, "{}", anomaly),
        }
    }
}
