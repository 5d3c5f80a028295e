//! Ordered subscriber sets.

use super::types::{ChangeCallback, SubscriberId};

/// The subscribers of one query entry, in subscription order.
///
/// Notification order follows attach order, so the set is a vector rather
/// than a map.
#[derive(Default)]
pub struct Subscribers {
    entries: Vec<(SubscriberId, ChangeCallback)>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: SubscriberId, callback: ChangeCallback) {
        self.entries.push((id, callback));
    }

    /// Remove a subscriber. Returns false when it was already gone.
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(sub, _)| *sub != id);
        self.entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clone out the callbacks in subscription order, so they can be
    /// invoked after the cache lock is released.
    pub fn callbacks(&self) -> Vec<ChangeCallback> {
        self.entries.iter().map(|(_, cb)| cb.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn noop() -> ChangeCallback {
        Arc::new(|_| {})
    }

    #[test]
    fn test_add_remove() {
        let mut subs = Subscribers::new();
        subs.add(SubscriberId(1), noop());
        subs.add(SubscriberId(2), noop());
        assert_eq!(subs.len(), 2);

        assert!(subs.remove(SubscriberId(1)));
        assert!(!subs.remove(SubscriberId(1)));
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn test_notification_order_is_subscription_order() {
        use parking_lot::Mutex;

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscribers::new();

        for i in 0..3u64 {
            let order = order.clone();
            subs.add(
                SubscriberId(i),
                Arc::new(move |_| order.lock().push(i)),
            );
        }

        let state = crate::subscriptions::QueryState {
            data: crate::subscriptions::QueryData::Record(None),
            loading: true,
            error: None,
        };
        for cb in subs.callbacks() {
            (*cb)(state.clone());
        }

        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
