//! Contract with the external transport/service client.
//!
//! The cache never performs network calls itself. The embedding application
//! supplies an implementation of [`Transport`] that knows how to fetch
//! records, perform mutations, and deliver realtime mutation events.

use crate::error::Result;
use crate::types::{EventKind, Id, MutationKind};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// What a fetch should retrieve.
#[derive(Clone, Debug)]
pub enum FetchTarget {
    /// A single record by id.
    Record(Id),
    /// All records matching the query params.
    Query(Value),
}

/// Successful fetch payload.
#[derive(Clone, Debug)]
pub enum FetchResponse {
    One(Value),
    Many(Vec<Value>),
}

impl FetchResponse {
    /// Flatten into a record list, preserving the returned ordering.
    pub fn into_records(self) -> Vec<Value> {
        match self {
            FetchResponse::One(record) => vec![record],
            FetchResponse::Many(records) => records,
        }
    }
}

/// One-shot completion callback handed to [`Transport::fetch`].
///
/// The transport may invoke it synchronously before `fetch` returns, or
/// later from its own delivery context.
pub type FetchCallback = Box<dyn FnOnce(Result<FetchResponse>) + Send>;

/// Handler registered for realtime mutation events. The payload is the
/// affected record, or its bare id for remove events.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Identifies a registered event handler for later removal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub u64);

impl fmt::Debug for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerId({})", self.0)
    }
}

/// The external service client the cache is built on.
pub trait Transport: Send + Sync {
    /// Retrieve records for a service. Must invoke `done` exactly once.
    fn fetch(&self, service: &str, target: FetchTarget, done: FetchCallback);

    /// Perform a mutation and return the resulting record (the removed
    /// record for [`MutationKind::Remove`]).
    fn mutate(
        &self,
        service: &str,
        kind: MutationKind,
        id: Option<&Id>,
        payload: Option<&Value>,
    ) -> Result<Value>;

    /// Register a handler for a realtime event kind on a service.
    fn on(&self, service: &str, event: EventKind, handler: EventHandler) -> HandlerId;

    /// Remove a previously registered handler.
    fn off(&self, service: &str, event: EventKind, handler: HandlerId);
}
