//! Incremental reconciliation of record mutations against active queries.
//!
//! Given a record change that has already been written to the record store,
//! updates the result of every affected query on that service without
//! issuing a fetch. The caller notifies the subscribers of the returned
//! query ids afterwards.

use crate::error::CacheError;
use crate::query::{matcher, QueryEntry, QueryId, QueryIndex, QueryKind, ResultSet};
use crate::types::Id;
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

/// A record store change to reconcile. `Written` covers create, update and
/// patch; `record` is the post-write snapshot.
pub enum RecordChange<'a> {
    Written { id: &'a Id, record: &'a Value },
    Removed { id: &'a Id },
}

/// Apply a change to every active query of `service`. Returns the ids of
/// the entries whose subscribers must be notified.
///
/// Applying the same change twice yields the same final state as applying
/// it once.
pub fn reconcile(queries: &mut QueryIndex, service: &str, change: &RecordChange) -> Vec<QueryId> {
    let mut changed = Vec::new();
    for query in queries.service_queries(service) {
        let Some(entry) = queries.get_mut(&query) else {
            continue;
        };
        if apply(entry, service, change) {
            changed.push(query);
        }
    }
    changed
}

fn apply(entry: &mut QueryEntry, service: &str, change: &RecordChange) -> bool {
    match change {
        RecordChange::Written { id, record } => {
            if entry.descriptor.is_find() {
                apply_written_find(entry, id, record)
            } else {
                apply_written_get(entry, id)
            }
        }
        RecordChange::Removed { id } => {
            if entry.descriptor.is_find() {
                entry.result.remove(id)
            } else {
                apply_removed_get(entry, service, id)
            }
        }
    }
}

/// Membership policy for find results: append newly matching ids at the
/// end, drop ids that stopped matching, keep the ordering otherwise. A
/// value change to a member also counts as a change, since the
/// materialized result differs.
fn apply_written_find(entry: &mut QueryEntry, id: &Id, record: &Value) -> bool {
    let matched = entry
        .descriptor
        .filter()
        .map_or(true, |filter| matcher::matches(filter, record));
    let present = entry.result.contains(id);

    match (matched, present) {
        (true, false) => {
            trace!(query = ?entry.descriptor.id(), %id, "record joined find result");
            entry.result.push(id.clone());
            true
        }
        (false, true) => {
            trace!(query = ?entry.descriptor.id(), %id, "record left find result");
            entry.result.remove(id);
            true
        }
        (true, true) => true,
        (false, false) => false,
    }
}

/// A write to the watched id surfaces through the store lookup; it also
/// recovers an entry that was in the removed/absent state.
fn apply_written_get(entry: &mut QueryEntry, id: &Id) -> bool {
    let QueryKind::Get { id: watched } = entry.descriptor.kind() else {
        return false;
    };
    if watched != id {
        return false;
    }

    entry.result = ResultSet::Single(Some(id.clone()));
    entry.error = None;
    true
}

fn apply_removed_get(entry: &mut QueryEntry, service: &str, id: &Id) -> bool {
    let QueryKind::Get { id: watched } = entry.descriptor.kind() else {
        return false;
    };
    if watched != id {
        return false;
    }

    entry.result = ResultSet::Single(None);
    entry.error = Some(Arc::new(CacheError::RecordRemoved {
        service: service.to_string(),
        id: id.clone(),
    }));
    true
}
