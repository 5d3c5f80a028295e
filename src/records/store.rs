//! Keyed record store with merge semantics.

use crate::error::{CacheError, Result};
use crate::types::{record_id, Id, Sequence};
use serde_json::Value;
use std::collections::HashMap;

/// A stored record plus the sequence of its last write.
#[derive(Clone, Debug)]
pub struct VersionedRecord {
    pub data: Value,
    pub version: Sequence,
}

#[derive(Default)]
struct ServiceRecords {
    records: HashMap<Id, VersionedRecord>,
    /// Removal sequences, kept while a fetch issued before the removal may
    /// still be in flight.
    tombstones: HashMap<Id, Sequence>,
}

/// Normalized mapping from (service, id) to the latest known record value.
///
/// Purely a keyed value store: no network access, no awareness of queries.
/// Records are replaced wholesale on upsert and shallow-merged on merge,
/// never mutated in place by callers.
#[derive(Default)]
pub struct RecordStore {
    services: HashMap<String, ServiceRecords>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write or overwrite the record at (service, record.id).
    ///
    /// Returns the record's id, or an error when the record carries no
    /// usable scalar id.
    pub fn upsert(&mut self, service: &str, record: Value, seq: Sequence) -> Result<Id> {
        let id = record_id(&record).ok_or_else(|| {
            CacheError::InvalidRecord(format!("record for service '{}' has no scalar id", service))
        })?;

        let svc = self.services.entry(service.to_string()).or_default();
        svc.tombstones.remove(&id);
        svc.records.insert(
            id.clone(),
            VersionedRecord {
                data: record,
                version: seq,
            },
        );
        Ok(id)
    }

    /// Shallow-merge `partial` fields into the existing record.
    ///
    /// Returns false without fabricating anything when the record does not
    /// exist — a patch for an unknown id is a no-op, not an error.
    pub fn merge(&mut self, service: &str, id: &Id, partial: &Value, seq: Sequence) -> bool {
        let Some(svc) = self.services.get_mut(service) else {
            return false;
        };
        let Some(existing) = svc.records.get_mut(id) else {
            return false;
        };

        if let (Some(target), Some(fields)) = (existing.data.as_object_mut(), partial.as_object()) {
            for (key, value) in fields {
                target.insert(key.clone(), value.clone());
            }
        }
        existing.version = seq;
        true
    }

    /// Delete the entry, leaving a tombstone stamped with `seq`.
    pub fn remove(&mut self, service: &str, id: &Id, seq: Sequence) -> bool {
        let svc = self.services.entry(service.to_string()).or_default();
        let removed = svc.records.remove(id).is_some();
        svc.tombstones.insert(id.clone(), seq);
        removed
    }

    pub fn get(&self, service: &str, id: &Id) -> Option<&Value> {
        self.services
            .get(service)
            .and_then(|svc| svc.records.get(id))
            .map(|rec| &rec.data)
    }

    /// Sequence of the record's last write, if it exists.
    pub fn version(&self, service: &str, id: &Id) -> Option<Sequence> {
        self.services
            .get(service)
            .and_then(|svc| svc.records.get(id))
            .map(|rec| rec.version)
    }

    /// Whether (service, id) was removed after the given sequence.
    ///
    /// A fetch issued before the removal must not resurrect the record.
    pub fn removed_after(&self, service: &str, id: &Id, seq: Sequence) -> bool {
        self.services
            .get(service)
            .and_then(|svc| svc.tombstones.get(id))
            .is_some_and(|tomb| *tomb > seq)
    }

    /// Drop tombstones no in-flight fetch can still observe.
    ///
    /// A tombstone only matters while a fetch issued before it is pending;
    /// with no fetch in flight all tombstones can go.
    pub fn prune_tombstones(&mut self, oldest_in_flight: Option<Sequence>) {
        for svc in self.services.values_mut() {
            match oldest_in_flight {
                Some(oldest) => svc.tombstones.retain(|_, tomb| *tomb > oldest),
                None => svc.tombstones.clear(),
            }
        }
    }

    pub fn record_count(&self) -> usize {
        self.services.values().map(|svc| svc.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }

    pub fn clear(&mut self) {
        self.services.clear();
    }
}
