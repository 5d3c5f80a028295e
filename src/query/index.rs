//! Live query index: one entry per distinct descriptor.

use super::descriptor::{QueryDescriptor, QueryId, QueryKind};
use crate::error::CacheError;
use crate::subscriptions::Subscribers;
use crate::types::Id;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// The current result of a query: a single id for gets, an ordered id
/// sequence for finds.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultSet {
    Single(Option<Id>),
    Ids(Vec<Id>),
}

impl ResultSet {
    pub fn contains(&self, id: &Id) -> bool {
        match self {
            ResultSet::Single(current) => current.as_ref() == Some(id),
            ResultSet::Ids(ids) => ids.contains(id),
        }
    }

    /// Append an id to a find result if absent. Newly matching records go
    /// at the end of the current ordering; server-side sort position is not
    /// reconstructed.
    pub fn push(&mut self, id: Id) {
        if let ResultSet::Ids(ids) = self {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    /// Remove an id from a find result, preserving the order of the rest.
    pub fn remove(&mut self, id: &Id) -> bool {
        if let ResultSet::Ids(ids) = self {
            if let Some(pos) = ids.iter().position(|existing| existing == id) {
                ids.remove(pos);
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        match self {
            ResultSet::Single(current) => usize::from(current.is_some()),
            ResultSet::Ids(ids) => ids.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One active query: descriptor, current result, loading/error state, and
/// the ordered subscriber set.
pub struct QueryEntry {
    pub descriptor: QueryDescriptor,
    pub result: ResultSet,
    pub loading: bool,
    pub error: Option<Arc<CacheError>>,
    pub subscribers: Subscribers,
}

impl QueryEntry {
    fn new(descriptor: QueryDescriptor) -> Self {
        let result = match descriptor.kind() {
            QueryKind::Get { .. } => ResultSet::Single(None),
            QueryKind::Find { .. } => ResultSet::Ids(Vec::new()),
        };
        Self {
            descriptor,
            result,
            loading: true,
            error: None,
            subscribers: Subscribers::new(),
        }
    }
}

/// All active query entries, indexed by descriptor digest and by service.
#[derive(Default)]
pub struct QueryIndex {
    entries: HashMap<QueryId, QueryEntry>,
    by_service: HashMap<String, HashSet<QueryId>>,
}

impl QueryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or create the entry for a descriptor. Returns the query id
    /// and whether the entry was newly created (with `loading = true`).
    pub fn attach_entry(&mut self, descriptor: &QueryDescriptor) -> (QueryId, bool) {
        let query = descriptor.id();
        let created = !self.entries.contains_key(&query);
        if created {
            self.entries.insert(query, QueryEntry::new(descriptor.clone()));
            self.by_service
                .entry(descriptor.service().to_string())
                .or_default()
                .insert(query);
        }
        (query, created)
    }

    pub fn get(&self, query: &QueryId) -> Option<&QueryEntry> {
        self.entries.get(query)
    }

    pub fn get_mut(&mut self, query: &QueryId) -> Option<&mut QueryEntry> {
        self.entries.get_mut(query)
    }

    /// Remove an entry, maintaining the per-service index.
    pub fn remove(&mut self, query: &QueryId) -> Option<QueryEntry> {
        let entry = self.entries.remove(query)?;
        let service = entry.descriptor.service();
        if let Some(set) = self.by_service.get_mut(service) {
            set.remove(query);
            if set.is_empty() {
                self.by_service.remove(service);
            }
        }
        Some(entry)
    }

    /// Ids of every active query on a service.
    pub fn service_queries(&self, service: &str) -> Vec<QueryId> {
        self.by_service
            .get(service)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.by_service.contains_key(service)
    }

    pub fn query_count(&self) -> usize {
        self.entries.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.entries
            .values()
            .map(|entry| entry.subscribers.len())
            .sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_service.clear();
    }
}
