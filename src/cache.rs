//! Main Cache struct tying all components together.

use crate::error::{CacheError, Result};
use crate::fetch::FetchCoordinator;
use crate::query::{matcher, QueryDescriptor, QueryId, QueryIndex, QueryKind, ResultSet};
use crate::reconcile::{reconcile, RecordChange};
use crate::records::RecordStore;
use crate::subscriptions::{
    ChangeCallback, QueryData, QueryState, SubscriberId, SubscriptionHandle, WatchHandle,
};
use crate::transport::{EventHandler, FetchCallback, FetchResponse, FetchTarget, HandlerId, Transport};
use crate::types::{record_id, CacheStats, EventKind, Id, MutationKind, Sequence};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{hash_map, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

/// Cache configuration.
#[derive(Clone, Default)]
pub struct CacheConfig {
    /// The transport/service client. Required; construction refuses to
    /// proceed without one.
    pub transport: Option<Arc<dyn Transport>>,
}

impl fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheConfig")
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

/// Interior state guarded by one lock: mutate under the lock, notify after
/// releasing it.
#[derive(Default)]
struct CacheState {
    records: RecordStore,
    queries: QueryIndex,
    fetches: FetchCoordinator,
    /// Registered transport handlers per service, one per event kind.
    handlers: HashMap<String, Vec<(EventKind, HandlerId)>>,
}

struct CacheShared {
    transport: Arc<dyn Transport>,
    state: RwLock<CacheState>,
    /// Logical write clock; stamps record writes and fetch issues.
    clock: AtomicU64,
    next_subscriber: AtomicU64,
}

/// The reactive record cache.
///
/// Provides a unified interface for:
/// - Subscribing to get and find queries (`get`, `find`, `watch_get`,
///   `watch_find`)
/// - Performing mutations that write through the cache
/// - Reconciling realtime mutation events into every active query result
///
/// State is in-memory and process-scoped; dropping the cache (or calling
/// [`Cache::teardown`]) unregisters every transport handler and clears all
/// maps.
pub struct Cache {
    shared: Arc<CacheShared>,
}

impl Cache {
    /// Create a cache from a configuration. Fails fast when no transport
    /// collaborator is supplied.
    pub fn new(config: CacheConfig) -> Result<Self> {
        let transport = config.transport.ok_or(CacheError::MissingTransport)?;
        Ok(Self::with_transport(transport))
    }

    /// Create a cache directly from a transport client.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                transport,
                state: RwLock::new(CacheState::default()),
                clock: AtomicU64::new(0),
                next_subscriber: AtomicU64::new(1),
            }),
        }
    }

    // --- Subscriptions ---

    /// Subscribe to a single record by id.
    ///
    /// The callback fires immediately with the entry's current state (a
    /// loading snapshot for a fresh query), then synchronously after every
    /// relevant change.
    pub fn get(
        &self,
        service: &str,
        id: impl Into<Id>,
        on_change: impl Fn(QueryState) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.attach(QueryDescriptor::get(service, id.into()), Arc::new(on_change))
    }

    /// Subscribe to the records matching `params`.
    pub fn find(
        &self,
        service: &str,
        params: Value,
        on_change: impl Fn(QueryState) + Send + Sync + 'static,
    ) -> Result<SubscriptionHandle> {
        Ok(self.attach(QueryDescriptor::find(service, params)?, Arc::new(on_change)))
    }

    /// Channel-backed variant of [`Cache::get`].
    pub fn watch_get(&self, service: &str, id: impl Into<Id>) -> WatchHandle {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = self.get(service, id, move |state| {
            let _ = sender.send(state);
        });
        WatchHandle::new(handle, receiver)
    }

    /// Channel-backed variant of [`Cache::find`].
    pub fn watch_find(&self, service: &str, params: Value) -> Result<WatchHandle> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let handle = self.find(service, params, move |state| {
            let _ = sender.send(state);
        })?;
        Ok(WatchHandle::new(handle, receiver))
    }

    /// Detach a subscriber. Idempotent; detaching after the entry is gone
    /// is a no-op. The last detach removes the query entry, and the last
    /// entry of a service unregisters the service's event handlers.
    pub fn detach(&self, handle: &SubscriptionHandle) {
        let mut unregister: Option<(String, Vec<(EventKind, HandlerId)>)> = None;
        {
            let mut state = self.shared.state.write();
            let Some(entry) = state.queries.get_mut(&handle.query) else {
                return;
            };
            if !entry.subscribers.remove(handle.subscriber) {
                return;
            }
            if entry.subscribers.is_empty() {
                let service = entry.descriptor.service().to_string();
                state.queries.remove(&handle.query);
                debug!(service = %service, query = ?handle.query, "query entry removed");
                if !state.queries.has_service(&service) {
                    if let Some(ids) = state.handlers.remove(&service) {
                        unregister = Some((service, ids));
                    }
                }
            }
        }
        if let Some((service, ids)) = unregister {
            for (kind, id) in ids {
                self.shared.transport.off(&service, kind, id);
            }
            debug!(service = %service, "service event handlers unregistered");
        }
    }

    /// Current state snapshot for a subscription, if its entry still
    /// exists.
    pub fn query_state(&self, handle: &SubscriptionHandle) -> Option<QueryState> {
        let state = self.shared.state.read();
        snapshot(&state, &handle.query)
    }

    /// Re-issue the fetch for a subscription's query, e.g. after a fetch
    /// error. Joins any fetch already in flight.
    pub fn refetch(&self, handle: &SubscriptionHandle) {
        let issued = self.shared.tick();
        let mut issue: Option<(String, QueryDescriptor)> = None;
        let notifications = {
            let mut state = self.shared.state.write();
            let Some(entry) = state.queries.get_mut(&handle.query) else {
                return;
            };
            entry.loading = true;
            entry.error = None;
            let descriptor = entry.descriptor.clone();
            if state.fetches.begin(handle.query, issued) {
                issue = Some((descriptor.service().to_string(), descriptor));
            }
            plan_notifications(&state, &[handle.query])
        };
        dispatch(notifications);
        if let Some((service, descriptor)) = issue {
            self.issue_fetch(&service, &descriptor, handle.query, issued);
        }
    }

    // --- Mutations ---

    /// Create a record through the transport and write the result through
    /// the cache, so bindings update without waiting for the realtime echo.
    pub fn create(&self, service: &str, payload: Value) -> Result<Value> {
        let record =
            self.shared
                .transport
                .mutate(service, MutationKind::Create, None, Some(&payload))?;
        apply_event(&self.shared, service, EventKind::Created, record.clone());
        Ok(record)
    }

    /// Patch a record. The transport returns the full patched record,
    /// which is applied wholesale.
    pub fn patch(&self, service: &str, id: impl Into<Id>, payload: Value) -> Result<Value> {
        let id = id.into();
        let record =
            self.shared
                .transport
                .mutate(service, MutationKind::Patch, Some(&id), Some(&payload))?;
        apply_event(&self.shared, service, EventKind::Updated, record.clone());
        Ok(record)
    }

    /// Replace a record.
    pub fn update(&self, service: &str, id: impl Into<Id>, payload: Value) -> Result<Value> {
        let id = id.into();
        let record =
            self.shared
                .transport
                .mutate(service, MutationKind::Update, Some(&id), Some(&payload))?;
        apply_event(&self.shared, service, EventKind::Updated, record.clone());
        Ok(record)
    }

    /// Remove a record.
    pub fn remove(&self, service: &str, id: impl Into<Id>) -> Result<Value> {
        let id = id.into();
        let record = self
            .shared
            .transport
            .mutate(service, MutationKind::Remove, Some(&id), None)?;
        let payload = if record_id(&record).is_some() {
            record.clone()
        } else {
            id.to_value()
        };
        apply_event(&self.shared, service, EventKind::Removed, payload);
        Ok(record)
    }

    // --- Introspection ---

    pub fn stats(&self) -> CacheStats {
        let state = self.shared.state.read();
        CacheStats {
            record_count: state.records.record_count(),
            query_count: state.queries.query_count(),
            subscriber_count: state.queries.subscriber_count(),
            in_flight_fetches: state.fetches.len(),
        }
    }

    /// Unregister every transport handler and clear all state. Runs on
    /// drop as well; safe to call more than once.
    pub fn teardown(&self) {
        let handlers: Vec<(String, Vec<(EventKind, HandlerId)>)> = {
            let mut state = self.shared.state.write();
            state.queries.clear();
            state.records.clear();
            state.fetches.clear();
            state.handlers.drain().collect()
        };
        for (service, ids) in handlers {
            for (kind, id) in ids {
                self.shared.transport.off(&service, kind, id);
            }
        }
    }

    // --- Internals ---

    fn attach(&self, descriptor: QueryDescriptor, callback: ChangeCallback) -> SubscriptionHandle {
        let subscriber = SubscriberId(self.shared.next_subscriber.fetch_add(1, Ordering::SeqCst));
        let service = descriptor.service().to_string();
        let issued = self.shared.tick();

        let (query, need_handlers, need_fetch, immediate) = {
            let mut state = self.shared.state.write();
            let need_handlers = match state.handlers.entry(service.clone()) {
                hash_map::Entry::Vacant(slot) => {
                    // Reserve the slot; handler ids land after registration.
                    slot.insert(Vec::new());
                    true
                }
                hash_map::Entry::Occupied(_) => false,
            };
            let (query, created) = state.queries.attach_entry(&descriptor);
            if let Some(entry) = state.queries.get_mut(&query) {
                entry.subscribers.add(subscriber, callback.clone());
            }
            let need_fetch = created && state.fetches.begin(query, issued);
            let immediate = snapshot(&state, &query);
            (query, need_handlers, need_fetch, immediate)
        };

        if need_handlers {
            self.register_service(&service);
        }
        // Late joiners see the entry's current data instead of a stale
        // spinner; fresh entries see their loading state.
        if let Some(current) = immediate {
            (*callback)(current);
        }
        if need_fetch {
            self.issue_fetch(&service, &descriptor, query, issued);
        }

        SubscriptionHandle { subscriber, query }
    }

    /// Register one handler per event kind with the transport, shared by
    /// every descriptor on the service. Handlers hold a weak reference so
    /// a dropped cache cannot be revived by a late event.
    fn register_service(&self, service: &str) {
        let mut ids = Vec::with_capacity(EventKind::ALL.len());
        for kind in EventKind::ALL {
            let weak: Weak<CacheShared> = Arc::downgrade(&self.shared);
            let event_service = service.to_string();
            let handler: EventHandler = Arc::new(move |payload: Value| {
                if let Some(shared) = weak.upgrade() {
                    apply_event(&shared, &event_service, kind, payload);
                }
            });
            let id = self.shared.transport.on(service, kind, handler);
            ids.push((kind, id));
        }
        debug!(service, "service event handlers registered");

        let leftover = {
            let mut state = self.shared.state.write();
            match state.handlers.get_mut(service) {
                Some(slot) if slot.is_empty() => {
                    *slot = ids;
                    None
                }
                // The service's queries vanished while registering; undo.
                _ => Some(ids),
            }
        };
        if let Some(ids) = leftover {
            for (kind, id) in ids {
                self.shared.transport.off(service, kind, id);
            }
        }
    }

    fn issue_fetch(
        &self,
        service: &str,
        descriptor: &QueryDescriptor,
        query: QueryId,
        issued: Sequence,
    ) {
        let target = match descriptor.kind() {
            QueryKind::Get { id } => FetchTarget::Record(id.clone()),
            QueryKind::Find { params } => FetchTarget::Query(params.clone()),
        };
        let weak: Weak<CacheShared> = Arc::downgrade(&self.shared);
        let done_service = service.to_string();
        let done: FetchCallback = Box::new(move |outcome| {
            if let Some(shared) = weak.upgrade() {
                complete_fetch(&shared, &done_service, query, issued, outcome);
            }
        });
        trace!(service, query = ?query, ?issued, "issuing fetch");
        self.shared.transport.fetch(service, target, done);
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl CacheShared {
    fn tick(&self) -> Sequence {
        Sequence(self.clock.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Route one inbound mutation event: write the record store, reconcile
/// every affected query, then notify outside the lock.
fn apply_event(shared: &Arc<CacheShared>, service: &str, kind: EventKind, payload: Value) {
    let seq = shared.tick();
    trace!(service, %kind, ?seq, "applying mutation event");

    let notifications = {
        let mut state = shared.state.write();
        let CacheState {
            records, queries, ..
        } = &mut *state;

        let changed: Vec<QueryId> = match kind {
            EventKind::Created | EventKind::Updated => match records.upsert(service, payload, seq)
            {
                Ok(id) => match records.get(service, &id) {
                    Some(record) => {
                        reconcile(queries, service, &RecordChange::Written { id: &id, record })
                    }
                    None => Vec::new(),
                },
                Err(err) => {
                    warn!(service, %err, "ignoring malformed record event");
                    Vec::new()
                }
            },
            EventKind::Patched => match record_id(&payload) {
                Some(id) => {
                    if records.merge(service, &id, &payload, seq) {
                        match records.get(service, &id) {
                            Some(record) => reconcile(
                                queries,
                                service,
                                &RecordChange::Written { id: &id, record },
                            ),
                            None => Vec::new(),
                        }
                    } else {
                        trace!(service, %id, "patch for unknown record ignored");
                        Vec::new()
                    }
                }
                None => {
                    warn!(service, "ignoring patched event without id");
                    Vec::new()
                }
            },
            EventKind::Removed => {
                // The payload is the removed record or its bare id.
                match record_id(&payload).or_else(|| Id::from_value(&payload)) {
                    Some(id) => {
                        records.remove(service, &id, seq);
                        reconcile(queries, service, &RecordChange::Removed { id: &id })
                    }
                    None => {
                        warn!(service, "ignoring removed event without id");
                        Vec::new()
                    }
                }
            }
        };

        plan_notifications(&state, &changed)
    };

    dispatch(notifications);
}

/// Apply a resolved fetch under the sequence guard: a record whose store
/// version or tombstone is newer than the fetch's issue sequence keeps the
/// mutation's effect.
fn complete_fetch(
    shared: &Arc<CacheShared>,
    service: &str,
    query: QueryId,
    issued: Sequence,
    outcome: crate::error::Result<FetchResponse>,
) {
    let notifications = {
        let mut state = shared.state.write();
        state.fetches.complete(&query);

        let changed: Vec<QueryId> = match outcome {
            Err(err) => {
                debug!(service, query = ?query, %err, "fetch failed");
                match state.queries.get_mut(&query) {
                    Some(entry) => {
                        entry.loading = false;
                        entry.error = Some(Arc::new(err));
                        vec![query]
                    }
                    None => Vec::new(),
                }
            }
            Ok(response) => {
                let CacheState {
                    records, queries, ..
                } = &mut *state;

                // Store writes happen even with zero remaining subscribers;
                // the records are still globally useful.
                let mut fetched: Vec<Id> = Vec::new();
                for record in response.into_records() {
                    let Some(id) = record_id(&record) else {
                        warn!(service, "ignoring fetched record without id");
                        continue;
                    };
                    if records.removed_after(service, &id, issued) {
                        trace!(service, %id, "fetched record was removed after issue");
                        continue;
                    }
                    let newer = records
                        .version(service, &id)
                        .is_some_and(|version| version > issued);
                    if !newer {
                        let _ = records.upsert(service, record, issued);
                    }
                    if !fetched.contains(&id) {
                        fetched.push(id);
                    }
                }

                match queries.get_mut(&query) {
                    None => {
                        trace!(service, query = ?query, "fetch resolved with no remaining subscribers");
                        Vec::new()
                    }
                    Some(entry) => {
                        let kind = entry.descriptor.kind().clone();
                        match kind {
                            QueryKind::Get { id } => {
                                if records.removed_after(service, &id, issued) {
                                    // The reconciler already put the entry
                                    // into its absent state.
                                } else if fetched.contains(&id) {
                                    entry.result = ResultSet::Single(Some(id));
                                    entry.error = None;
                                } else {
                                    entry.result = ResultSet::Single(None);
                                    entry.error = Some(Arc::new(CacheError::RecordNotFound {
                                        service: service.to_string(),
                                        id,
                                    }));
                                }
                            }
                            QueryKind::Find { .. } => {
                                let filter = entry.descriptor.filter().cloned();
                                let prior: Vec<Id> = match &entry.result {
                                    ResultSet::Ids(ids) => ids.clone(),
                                    ResultSet::Single(_) => Vec::new(),
                                };

                                let mut ids: Vec<Id> = Vec::new();
                                for id in fetched {
                                    let newer = records
                                        .version(service, &id)
                                        .is_some_and(|version| version > issued);
                                    if newer {
                                        // Mutated after issue: membership
                                        // follows the current snapshot, not
                                        // the server's stale view.
                                        let still_matches =
                                            records.get(service, &id).is_some_and(|record| {
                                                filter
                                                    .as_ref()
                                                    .map_or(true, |f| matcher::matches(f, record))
                                            });
                                        if !still_matches {
                                            continue;
                                        }
                                    }
                                    ids.push(id);
                                }
                                // Members that joined via mutation events
                                // the server snapshot predates.
                                for id in prior {
                                    let newer = records
                                        .version(service, &id)
                                        .is_some_and(|version| version > issued);
                                    if newer && !ids.contains(&id) {
                                        ids.push(id);
                                    }
                                }
                                entry.result = ResultSet::Ids(ids);
                                entry.error = None;
                            }
                        }
                        entry.loading = false;
                        vec![query]
                    }
                }
            }
        };

        let oldest = state.fetches.oldest_issue();
        state.records.prune_tombstones(oldest);
        plan_notifications(&state, &changed)
    };

    dispatch(notifications);
}

/// Materialize the current state of a query entry from the record store.
fn snapshot(state: &CacheState, query: &QueryId) -> Option<QueryState> {
    let entry = state.queries.get(query)?;
    let service = entry.descriptor.service();
    let data = match &entry.result {
        ResultSet::Single(id) => QueryData::Record(
            id.as_ref()
                .and_then(|id| state.records.get(service, id).cloned()),
        ),
        ResultSet::Ids(ids) => QueryData::Records(
            ids.iter()
                .filter_map(|id| state.records.get(service, id).cloned())
                .collect(),
        ),
    };
    Some(QueryState {
        data,
        loading: entry.loading,
        error: entry.error.clone(),
    })
}

type PlannedNotification = (Vec<ChangeCallback>, QueryState);

/// Snapshot states and clone callbacks under the lock, so notification can
/// happen after it is released.
fn plan_notifications(state: &CacheState, changed: &[QueryId]) -> Vec<PlannedNotification> {
    changed
        .iter()
        .filter_map(|query| {
            let entry = state.queries.get(query)?;
            let current = snapshot(state, query)?;
            Some((entry.subscribers.callbacks(), current))
        })
        .collect()
}

fn dispatch(notifications: Vec<PlannedNotification>) {
    for (callbacks, current) in notifications {
        for callback in callbacks {
            (*callback)(current.clone());
        }
    }
}
