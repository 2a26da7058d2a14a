//! Serialized, rate-gated outbound sends.
//!
//! Every outbound message goes through one unbounded FIFO channel drained by a
//! single task, so at most one send is in flight. Public messages consult the
//! posting gate first; a message arriving during a cooldown is dropped and the
//! loop moves on to the next one.

use crate::application::config::{DispatcherConfig, DisplayNames};
use crate::application::gate::RateLimitGate;
use crate::application::handle::TaskHandle;
use crate::application::metrics::Metrics;
use crate::application::ports::{AnomalySink, PostingService};
use crate::domain::error::{Anomaly, ServiceError};
use crate::domain::lookup::LookupKey;
use crate::domain::message::OutboundMessage;
use crate::domain::sender::Sender;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Error returned when a message cannot be queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher loop has stopped; the message is handed back.
    Closed(OutboundMessage),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Closed(_) => write!(f, "outbound dispatcher has stopped"),
        }
    }
}

impl std::error::Error for DispatchError {}

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The message was posted.
    Sent {
        /// This send ended a cooldown and the unlock action ran
        unlocked: bool,
    },
    /// A cooldown was active; the message was dropped without a send attempt.
    Skipped,
    /// The service rate limited the send; a cooldown now runs until `until`.
    RateLimited {
        /// End of the new cooldown
        until: i64,
    },
    /// The send failed for another reason and the message was dropped.
    Failed,
}

/// Producer side of the outbound queue.
///
/// Cheap to clone. Sending never waits.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl Outbox {
    /// Queue a message.
    ///
    /// # Errors
    /// Returns `DispatchError::Closed` if the dispatcher loop has stopped.
    pub fn send(&self, message: OutboundMessage) -> Result<(), DispatchError> {
        self.tx
            .send(message)
            .map_err(|e| DispatchError::Closed(e.0))
    }

    /// Queue a public post without a reply target.
    pub fn broadcast(&self, body: impl Into<String>) -> Result<(), DispatchError> {
        self.send(OutboundMessage::broadcast(body))
    }

    /// Queue a public reply to `to`.
    pub fn reply(&self, to: LookupKey, body: impl Into<String>) -> Result<(), DispatchError> {
        self.send(OutboundMessage::reply(to, body))
    }

    /// Queue the answer to `sender`, built the way that sender expects it.
    pub fn send_as(&self, sender: &Sender, text: &str) -> Result<(), DispatchError> {
        self.send(sender.message(text))
    }

    /// Check whether the dispatcher loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Single consumer of the outbound queue.
pub struct OutboundDispatcher {
    gate: RateLimitGate,
    service: Arc<dyn PostingService>,
    metrics: Metrics,
    config: DispatcherConfig,
}

impl fmt::Debug for OutboundDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundDispatcher")
            .field("gate", &self.gate)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing an [`OutboundDispatcher`].
pub struct OutboundDispatcherBuilder {
    service: Arc<dyn PostingService>,
    gate: RateLimitGate,
    metrics: Option<Metrics>,
    config: DispatcherConfig,
}

impl OutboundDispatcherBuilder {
    /// Switch display names when a cooldown starts and ends.
    pub fn with_display_names(mut self, names: DisplayNames) -> Self {
        self.config = self.config.with_display_names(names);
        self
    }

    /// Replace the whole dispatcher configuration.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a metrics tracker with other components.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the dispatcher.
    pub fn build(self) -> OutboundDispatcher {
        OutboundDispatcher {
            gate: self.gate,
            service: self.service,
            metrics: self.metrics.unwrap_or_default(),
            config: self.config,
        }
    }
}

impl OutboundDispatcher {
    /// Start building a dispatcher around a posting service and its gate.
    pub fn builder(
        service: Arc<dyn PostingService>,
        gate: RateLimitGate,
    ) -> OutboundDispatcherBuilder {
        OutboundDispatcherBuilder {
            service,
            gate,
            metrics: None,
            config: DispatcherConfig::default(),
        }
    }

    /// Get the metrics tracker.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Start the consumer loop.
    ///
    /// The loop runs until shutdown is requested through the returned handle
    /// or every [`Outbox`] clone has been dropped.
    pub fn spawn(self) -> (Outbox, TaskHandle) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = TaskHandle::spawn(move |mut shutdown| async move {
            loop {
                tokio::select! {
                    _ = shutdown.requested() => break,
                    message = rx.recv() => match message {
                        Some(message) => {
                            self.process(message).await;
                        }
                        None => break,
                    },
                }
            }

            tracing::debug!("outbound dispatcher stopped");
        });

        (Outbox { tx }, handle)
    }

    /// Send one message, honouring the posting gate.
    pub async fn process(&self, message: OutboundMessage) -> DispatchOutcome {
        if !message.is_rate_gated() {
            return self.send_ungated(&message).await;
        }

        let decision = self.gate.check_and_maybe_unlock().await;
        if !decision.can_proceed {
            tracing::info!(reply_to = ?message.reply_to(), "cooling down, dropping message");
            self.metrics.record_skipped();
            return DispatchOutcome::Skipped;
        }

        match self.service.post(&message).await {
            Ok(()) => {
                self.metrics.record_sent();
                if decision.just_unlocked {
                    if let Some(names) = &self.config.display_names {
                        self.apply_display_name(&names.normal).await;
                    }
                }
                DispatchOutcome::Sent {
                    unlocked: decision.just_unlocked,
                }
            }
            Err(ServiceError::RateLimited { reset_at }) => {
                self.metrics.record_failed();
                let until = self.gate.enter_cooldown(reset_at).await;
                self.metrics.record_cooldown();
                if let Some(names) = &self.config.display_names {
                    self.apply_display_name(&names.limited).await;
                }
                DispatchOutcome::RateLimited { until }
            }
            Err(error) => {
                self.metrics.record_failed();
                self.sink().report(Anomaly::SendFailed { error });
                DispatchOutcome::Failed
            }
        }
    }

    async fn send_ungated(&self, message: &OutboundMessage) -> DispatchOutcome {
        match self.service.post(message).await {
            Ok(()) => {
                self.metrics.record_sent();
                DispatchOutcome::Sent { unlocked: false }
            }
            Err(error) => {
                self.metrics.record_failed();
                self.sink().report(Anomaly::SendFailed { error });
                DispatchOutcome::Failed
            }
        }
    }

    async fn apply_display_name(&self, name: &str) {
        match self.service.set_display_name(name).await {
            Ok(()) => tracing::info!(display_name = name, "display name changed"),
            Err(error) => self.sink().report(Anomaly::ActionFailed {
                display_name: name.to_string(),
                error,
            }),
        }
    }

    fn sink(&self) -> &Arc<dyn AnomalySink> {
        self.gate.sink()
    }
}
