//! Fetch deduplication and sequence stamping.
//!
//! Tracks the single in-flight fetch per distinct query. Callers `begin` a
//! fetch before hitting the transport; a second `begin` for the same query
//! joins the pending fetch instead of issuing another network call.

use crate::query::QueryId;
use crate::types::Sequence;
use std::collections::HashMap;

/// Book-keeping for one in-flight fetch.
#[derive(Clone, Copy, Debug)]
pub struct PendingFetch {
    /// Clock value when the fetch was issued. Completions are checked
    /// against record writes stamped after this.
    pub issued: Sequence,
}

/// Deduplicates concurrent fetches per (service, descriptor).
#[derive(Default)]
pub struct FetchCoordinator {
    in_flight: HashMap<QueryId, PendingFetch>,
}

impl FetchCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the caller must issue a transport fetch; false
    /// joins the fetch already in flight for this query.
    pub fn begin(&mut self, query: QueryId, issued: Sequence) -> bool {
        use std::collections::hash_map::Entry;
        match self.in_flight.entry(query) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(PendingFetch { issued });
                true
            }
        }
    }

    /// Mark the query's fetch as resolved.
    pub fn complete(&mut self, query: &QueryId) -> Option<PendingFetch> {
        self.in_flight.remove(query)
    }

    pub fn is_in_flight(&self, query: &QueryId) -> bool {
        self.in_flight.contains_key(query)
    }

    /// Issue sequence of the oldest fetch still in flight, if any. Bounds
    /// how long record tombstones must be kept.
    pub fn oldest_issue(&self) -> Option<Sequence> {
        self.in_flight.values().map(|pending| pending.issued).min()
    }

    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn clear(&mut self) {
        self.in_flight.clear();
    }
}
