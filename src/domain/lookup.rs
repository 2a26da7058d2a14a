//! Pending lookup registrations.
//!
//! A [`PendingLookups`] set is one *generation*: every key registered since the
//! last drain, each with the callbacks waiting for it. The coalescer swaps the
//! whole set out at the start of a tick and treats the old one as immutable
//! from then on.

use std::collections::HashMap;
use std::fmt;

/// Identifier of an item in the external service.
pub type LookupKey = i64;

/// Callback consuming one resolved item.
pub type Callback<T> = Box<dyn FnOnce(T) + Send + 'static>;

/// An item returned by the lookup service.
pub trait Keyed {
    /// Key this item resolves.
    fn key(&self) -> LookupKey;
}

/// Handle to a single registration, used to cancel it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration {
    /// Key the callback is waiting for
    pub key: LookupKey,
    /// Unique id of the callback within its coalescer
    pub id: u64,
}

/// One generation of pending registrations.
pub struct PendingLookups<T> {
    order: Vec<LookupKey>,
    entries: HashMap<LookupKey, Vec<(u64, Callback<T>)>, ahash::RandomState>,
}

impl<T> PendingLookups<T> {
    /// Create an empty generation.
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::default(),
        }
    }

    /// Add a callback for `key`, keeping per-key insertion order.
    pub fn register(&mut self, registration: Registration, callback: Callback<T>) {
        let order = &mut self.order;
        let callbacks = self.entries.entry(registration.key).or_insert_with(|| {
            order.push(registration.key);
            Vec::new()
        });
        callbacks.push((registration.id, callback));
    }

    /// Remove a single registration.
    ///
    /// Drops the key entirely once its last callback is gone, so every key
    /// left in the set still has someone waiting for it. Returns `false` if the
    /// registration is not in this generation.
    pub fn cancel(&mut self, registration: Registration) -> bool {
        let Some(callbacks) = self.entries.get_mut(&registration.key) else {
            return false;
        };

        let before = callbacks.len();
        callbacks.retain(|(id, _)| *id != registration.id);
        let removed = callbacks.len() != before;

        if callbacks.is_empty() {
            self.entries.remove(&registration.key);
            self.order.retain(|key| *key != registration.key);
        }

        removed
    }

    /// Keys in the order they were first registered.
    pub fn keys(&self) -> &[LookupKey] {
        &self.order
    }

    /// Check whether `key` has pending callbacks.
    pub fn contains(&self, key: LookupKey) -> bool {
        self.entries.contains_key(&key)
    }

    /// Number of callbacks registered for `key`.
    pub fn callback_count(&self, key: LookupKey) -> usize {
        self.entries.get(&key).map_or(0, Vec::len)
    }

    /// Take every callback registered for `key`.
    ///
    /// A second call for the same key returns nothing, which is what keeps
    /// dispatch at-most-once when the service returns an item twice.
    pub fn take_callbacks(&mut self, key: LookupKey) -> Vec<Callback<T>> {
        self.entries
            .remove(&key)
            .map(|callbacks| callbacks.into_iter().map(|(_, cb)| cb).collect())
            .unwrap_or_default()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Check whether the generation has no keys.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<T> Default for PendingLookups<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PendingLookups<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLookups")
            .field("keys", &self.order)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn reg(key: LookupKey, id: u64) -> Registration {
        Registration { key, id }
    }

    fn recorder(log: &Arc<Mutex<Vec<(u64, i32)>>>, id: u64) -> Callback<i32> {
        let log = Arc::clone(log);
        Box::new(move |item| log.lock().unwrap().push((id, item)))
    }

    #[test]
    fn test_register_keeps_key_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pending = PendingLookups::new();

        pending.register(reg(30, 1), recorder(&log, 1));
        pending.register(reg(10, 2), recorder(&log, 2));
        pending.register(reg(30, 3), recorder(&log, 3));
        pending.register(reg(20, 4), recorder(&log, 4));

        assert_eq!(pending.keys(), &[30, 10, 20]);
        assert_eq!(pending.len(), 3);
        assert_eq!(pending.callback_count(30), 2);
    }

    #[test]
    fn test_take_callbacks_preserves_order_and_is_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pending = PendingLookups::new();
        pending.register(reg(7, 1), recorder(&log, 1));
        pending.register(reg(7, 2), recorder(&log, 2));

        for cb in pending.take_callbacks(7) {
            cb(42);
        }
        assert!(pending.take_callbacks(7).is_empty());

        assert_eq!(*log.lock().unwrap(), vec![(1, 42), (2, 42)]);
    }

    #[test]
    fn test_cancel_last_callback_removes_key() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pending = PendingLookups::new();
        pending.register(reg(1, 1), recorder(&log, 1));
        pending.register(reg(2, 2), recorder(&log, 2));
        pending.register(reg(2, 3), recorder(&log, 3));

        assert!(pending.cancel(reg(2, 2)));
        assert!(pending.contains(2));
        assert_eq!(pending.callback_count(2), 1);

        assert!(pending.cancel(reg(2, 3)));
        assert!(!pending.contains(2));
        assert_eq!(pending.keys(), &[1]);
    }

    #[test]
    fn test_cancel_unknown_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pending = PendingLookups::new();
        pending.register(reg(1, 1), recorder(&log, 1));

        assert!(!pending.cancel(reg(1, 99)));
        assert!(!pending.cancel(reg(5, 1)));
        assert_eq!(pending.callback_count(1), 1);
    }

    #[test]
    fn test_take_leaves_fresh_generation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pending = PendingLookups::new();
        pending.register(reg(1, 1), recorder(&log, 1));

        let drained = std::mem::take(&mut pending);
        assert!(pending.is_empty());
        assert_eq!(drained.keys(), &[1]);
    }
}
