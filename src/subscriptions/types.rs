//! Subscription types for live query updates.

use crate::error::CacheError;
use crate::query::QueryId;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Unique identifier for one attached subscriber.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub u64);

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({})", self.0)
    }
}

/// Opaque handle representing one consumer's interest in one query.
///
/// Pass it back to `Cache::detach` when the consumer goes away. Detach is
/// idempotent; detaching after the entry is gone is a no-op.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    pub(crate) subscriber: SubscriberId,
    pub(crate) query: QueryId,
}

impl SubscriptionHandle {
    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber
    }

    pub fn query_id(&self) -> QueryId {
        self.query
    }
}

/// Callback invoked with a fresh state snapshot on every relevant change.
pub type ChangeCallback = Arc<dyn Fn(QueryState) + Send + Sync>;

/// Materialized query result data.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryData {
    /// Result of a get query.
    Record(Option<Value>),
    /// Result of a find query, in result order.
    Records(Vec<Value>),
}

impl QueryData {
    /// The single record of a get query, if loaded.
    pub fn record(&self) -> Option<&Value> {
        match self {
            QueryData::Record(record) => record.as_ref(),
            QueryData::Records(_) => None,
        }
    }

    /// The records of a find query; a get query yields its record as a
    /// one-element slice.
    pub fn records(&self) -> &[Value] {
        match self {
            QueryData::Record(Some(record)) => std::slice::from_ref(record),
            QueryData::Record(None) => &[],
            QueryData::Records(records) => records,
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

/// Snapshot of a query entry delivered to subscribers.
#[derive(Clone, Debug)]
pub struct QueryState {
    pub data: QueryData,
    pub loading: bool,
    pub error: Option<Arc<CacheError>>,
}

impl QueryState {
    /// Loaded without error.
    pub fn is_ready(&self) -> bool {
        !self.loading && self.error.is_none()
    }
}

/// Channel-backed subscription handle.
///
/// Each state change is delivered as a message; receive with `recv`,
/// `try_recv`, or `recv_timeout`.
pub struct WatchHandle {
    handle: SubscriptionHandle,
    receiver: crossbeam_channel::Receiver<QueryState>,
}

impl WatchHandle {
    pub(crate) fn new(
        handle: SubscriptionHandle,
        receiver: crossbeam_channel::Receiver<QueryState>,
    ) -> Self {
        Self { handle, receiver }
    }

    /// The underlying subscription, for `Cache::detach`.
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Receive the next state snapshot (blocking).
    pub fn recv(&self) -> Result<QueryState, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a snapshot (non-blocking).
    pub fn try_recv(&self) -> Result<QueryState, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<QueryState, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_data_accessors() {
        let one = QueryData::Record(Some(json!({"id": 1})));
        assert_eq!(one.record(), Some(&json!({"id": 1})));
        assert_eq!(one.records(), &[json!({"id": 1})]);
        assert_eq!(one.len(), 1);

        let none = QueryData::Record(None);
        assert_eq!(none.record(), None);
        assert!(none.is_empty());

        let many = QueryData::Records(vec![json!({"id": 1}), json!({"id": 2})]);
        assert_eq!(many.record(), None);
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn test_is_ready() {
        let loading = QueryState {
            data: QueryData::Record(None),
            loading: true,
            error: None,
        };
        assert!(!loading.is_ready());

        let failed = QueryState {
            data: QueryData::Record(None),
            loading: false,
            error: Some(Arc::new(CacheError::Transport("boom".into()))),
        };
        assert!(!failed.is_ready());

        let ready = QueryState {
            data: QueryData::Record(Some(json!({"id": 1}))),
            loading: false,
            error: None,
        };
        assert!(ready.is_ready());
    }
}
