//! Observability metrics for lookups and outbound traffic.
//!
//! A single [`Metrics`] value can be shared by a coalescer and a dispatcher;
//! clones share the same counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters describing coalescer and dispatcher behaviour.
///
/// All metrics use atomic operations for thread-safe updates and reads.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Keys whose callbacks fired
    lookups_resolved: AtomicU64,
    /// Drained keys that got no item
    lookups_unresolved: AtomicU64,
    /// Ticks skipped because the previous tick was still running
    ticks_overlapped: AtomicU64,
    /// Ticks that left the pending set alone because of a cooldown
    ticks_deferred: AtomicU64,
    /// Messages delivered to the posting service
    messages_sent: AtomicU64,
    /// Messages dropped without a send attempt because of a cooldown
    messages_skipped: AtomicU64,
    /// Messages whose send attempt failed
    messages_failed: AtomicU64,
    /// Cooldowns written after a rate-limit response
    cooldowns_entered: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_resolved(&self, count: usize) {
        self.inner
            .lookups_resolved
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_unresolved(&self, count: usize) {
        self.inner
            .lookups_unresolved
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_overlap(&self) {
        self.inner.ticks_overlapped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_deferred(&self) {
        self.inner.ticks_deferred.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_sent(&self) {
        self.inner.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.inner.messages_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.inner.messages_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cooldown(&self) {
        self.inner.cooldowns_entered.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the number of resolved lookup keys.
    pub fn lookups_resolved(&self) -> u64 {
        self.inner.lookups_resolved.load(Ordering::Relaxed)
    }

    /// Get the number of drained keys that were not resolved.
    pub fn lookups_unresolved(&self) -> u64 {
        self.inner.lookups_unresolved.load(Ordering::Relaxed)
    }

    /// Get the number of overlapping ticks.
    pub fn ticks_overlapped(&self) -> u64 {
        self.inner.ticks_overlapped.load(Ordering::Relaxed)
    }

    /// Get the number of ticks deferred by a cooldown.
    pub fn ticks_deferred(&self) -> u64 {
        self.inner.ticks_deferred.load(Ordering::Relaxed)
    }

    /// Get the number of messages sent.
    pub fn messages_sent(&self) -> u64 {
        self.inner.messages_sent.load(Ordering::Relaxed)
    }

    /// Get the number of messages skipped during a cooldown.
    pub fn messages_skipped(&self) -> u64 {
        self.inner.messages_skipped.load(Ordering::Relaxed)
    }

    /// Get the number of messages whose send failed.
    pub fn messages_failed(&self) -> u64 {
        self.inner.messages_failed.load(Ordering::Relaxed)
    }

    /// Get the number of cooldowns entered.
    pub fn cooldowns_entered(&self) -> u64 {
        self.inner.cooldowns_entered.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            lookups_resolved: self.lookups_resolved(),
            lookups_unresolved: self.lookups_unresolved(),
            ticks_overlapped: self.ticks_overlapped(),
            ticks_deferred: self.ticks_deferred(),
            messages_sent: self.messages_sent(),
            messages_skipped: self.messages_skipped(),
            messages_failed: self.messages_failed(),
            cooldowns_entered: self.cooldowns_entered(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.lookups_resolved,
            &inner.lookups_unresolved,
            &inner.ticks_overlapped,
            &inner.ticks_deferred,
            &inner.messages_sent,
            &inner.messages_skipped,
            &inner.messages_failed,
            &inner.cooldowns_entered,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    /// Keys whose callbacks fired
    pub lookups_resolved: u64,
    /// Drained keys that got no item
    pub lookups_unresolved: u64,
    /// Ticks skipped because the previous tick was still running
    pub ticks_overlapped: u64,
    /// Ticks deferred by a cooldown
    pub ticks_deferred: u64,
    /// Messages delivered
    pub messages_sent: u64,
    /// Messages skipped during a cooldown
    pub messages_skipped: u64,
    /// Messages whose send failed
    pub messages_failed: u64,
    /// Cooldowns entered
    pub cooldowns_entered: u64,
}

impl MetricsSnapshot {
    /// Total number of drained lookup keys.
    pub fn total_lookups(&self) -> u64 {
        self.lookups_resolved.saturating_add(self.lookups_unresolved)
    }

    /// Ratio of resolved keys to drained keys (0.0 to 1.0).
    ///
    /// Returns 0.0 if nothing has been drained yet.
    pub fn resolution_rate(&self) -> f64 {
        let total = self.total_lookups();
        if total == 0 {
            0.0
        } else {
            self.lookups_resolved as f64 / total as f64
        }
    }

    /// Total number of messages taken off the outbound queue.
    pub fn total_messages(&self) -> u64 {
        self.messages_sent
            .saturating_add(self.messages_skipped)
            .saturating_add(self.messages_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initial_state() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_lookups() {
        let metrics = Metrics::new();
        metrics.record_resolved(3);
        metrics.record_unresolved(1);
        assert_eq!(metrics.lookups_resolved(), 3);
        assert_eq!(metrics.lookups_unresolved(), 1);
    }

    #[test]
    fn test_snapshot_resolution_rate() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().resolution_rate(), 0.0);

        metrics.record_resolved(1);
        metrics.record_unresolved(3);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_lookups(), 4);
        assert!((snapshot.resolution_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_snapshot_total_messages() {
        let metrics = Metrics::new();
        metrics.record_sent();
        metrics.record_sent();
        metrics.record_skipped();
        metrics.record_failed();
        assert_eq!(metrics.snapshot().total_messages(), 4);
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_overlap();
        metrics.record_deferred();
        metrics.record_cooldown();

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_metrics_clone_shares_counters() {
        let metrics1 = Metrics::new();
        metrics1.record_sent();

        let metrics2 = metrics1.clone();
        metrics2.record_sent();

        assert_eq!(metrics1.messages_sent(), 2);
        assert_eq!(metrics2.messages_sent(), 2);
    }

    #[test]
    fn test_concurrent_updates() {
        use std::thread;

        let metrics = Metrics::new();
        let mut handles = vec![];

        for _ in 0..10 {
            let m = metrics.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    m.record_resolved(1);
                    m.record_skipped();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.lookups_resolved(), 1000);
        assert_eq!(metrics.messages_skipped(), 1000);
    }
}
