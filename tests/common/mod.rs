//! Shared mock transport for integration tests.
#![allow(dead_code)]

use parking_lot::Mutex;
use ripple::{
    matches, record_id, Cache, CacheConfig, CacheError, EventHandler, EventKind, FetchCallback,
    FetchResponse, FetchTarget, HandlerId, Id, MutationKind, QueryState, Transport, WatchHandle,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory service backend with manual event emission and optional
/// deferred fetch completion.
pub struct MockTransport {
    data: Mutex<HashMap<String, Vec<Value>>>,
    handlers: Mutex<HashMap<(String, EventKind), Vec<(HandlerId, EventHandler)>>>,
    pending: Mutex<Vec<(String, FetchTarget, FetchCallback)>>,
    deferred: AtomicBool,
    failing: Mutex<HashSet<String>>,
    fetch_calls: AtomicU64,
    next_handler: AtomicU64,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            data: Mutex::new(HashMap::new()),
            handlers: Mutex::new(HashMap::new()),
            pending: Mutex::new(Vec::new()),
            deferred: AtomicBool::new(false),
            failing: Mutex::new(HashSet::new()),
            fetch_calls: AtomicU64::new(0),
            next_handler: AtomicU64::new(1),
        })
    }

    /// Replace the backing records of a service.
    pub fn seed(&self, service: &str, records: Vec<Value>) {
        self.data.lock().insert(service.to_string(), records);
    }

    /// Hold fetch completions until [`MockTransport::flush`].
    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.store(deferred, Ordering::SeqCst);
    }

    /// Make fetches for a service fail.
    pub fn fail_fetches(&self, service: &str) {
        self.failing.lock().insert(service.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Complete every held fetch against the current backing data.
    pub fn flush(&self) {
        let drained: Vec<(String, FetchTarget, FetchCallback)> =
            self.pending.lock().drain(..).collect();
        for (service, target, done) in drained {
            let outcome = self.resolve(&service, &target);
            done(outcome);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Total registered realtime handlers across services and event kinds.
    pub fn handler_count(&self) -> usize {
        self.handlers.lock().values().map(|v| v.len()).sum()
    }

    /// Deliver a realtime event: update the backing data, then invoke every
    /// registered handler for (service, kind).
    pub fn emit(&self, service: &str, kind: EventKind, payload: Value) {
        self.apply_to_backend(service, kind, &payload);
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .get(&(service.to_string(), kind))
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        for handler in handlers {
            (*handler)(payload.clone());
        }
    }

    fn apply_to_backend(&self, service: &str, kind: EventKind, payload: &Value) {
        let mut data = self.data.lock();
        let records = data.entry(service.to_string()).or_default();
        match kind {
            EventKind::Created | EventKind::Updated => {
                if let Some(id) = record_id(payload) {
                    records.retain(|rec| record_id(rec) != Some(id.clone()));
                    records.push(payload.clone());
                }
            }
            EventKind::Patched => {
                if let Some(id) = record_id(payload) {
                    if let Some(existing) = records
                        .iter_mut()
                        .find(|rec| record_id(rec) == Some(id.clone()))
                    {
                        if let (Some(target), Some(fields)) =
                            (existing.as_object_mut(), payload.as_object())
                        {
                            for (key, value) in fields {
                                target.insert(key.clone(), value.clone());
                            }
                        }
                    }
                }
            }
            EventKind::Removed => {
                if let Some(id) = record_id(payload).or_else(|| Id::from_value(payload)) {
                    records.retain(|rec| record_id(rec) != Some(id.clone()));
                }
            }
        }
    }

    fn resolve(&self, service: &str, target: &FetchTarget) -> Result<FetchResponse, CacheError> {
        if self.failing.lock().contains(service) {
            return Err(CacheError::Transport(format!(
                "fetch for '{}' failed",
                service
            )));
        }
        let data = self.data.lock();
        let records = data.get(service).cloned().unwrap_or_default();
        match target {
            FetchTarget::Record(id) => records
                .iter()
                .find(|rec| record_id(rec).as_ref() == Some(id))
                .cloned()
                .map(FetchResponse::One)
                .ok_or_else(|| {
                    CacheError::Transport(format!("no record {}/{}", service, id))
                }),
            FetchTarget::Query(params) => Ok(FetchResponse::Many(
                records
                    .iter()
                    .filter(|rec| matches(params, rec))
                    .cloned()
                    .collect(),
            )),
        }
    }
}

impl Transport for MockTransport {
    fn fetch(&self, service: &str, target: FetchTarget, done: FetchCallback) {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.deferred.load(Ordering::SeqCst) {
            self.pending.lock().push((service.to_string(), target, done));
        } else {
            let outcome = self.resolve(service, &target);
            done(outcome);
        }
    }

    fn mutate(
        &self,
        service: &str,
        kind: MutationKind,
        id: Option<&Id>,
        payload: Option<&Value>,
    ) -> Result<Value, CacheError> {
        let mut data = self.data.lock();
        let records = data.entry(service.to_string()).or_default();
        match kind {
            MutationKind::Create => {
                let mut record = payload.cloned().unwrap_or(json!({}));
                if record_id(&record).is_none() {
                    let next = records
                        .iter()
                        .filter_map(|rec| match record_id(rec) {
                            Some(Id::Int(n)) => Some(n),
                            _ => None,
                        })
                        .max()
                        .unwrap_or(0)
                        + 1;
                    if let Some(obj) = record.as_object_mut() {
                        obj.insert("id".into(), json!(next));
                    }
                }
                let id = record_id(&record);
                records.retain(|rec| record_id(rec) != id);
                records.push(record.clone());
                Ok(record)
            }
            MutationKind::Patch => {
                let id = id.expect("patch needs an id");
                let existing = records
                    .iter_mut()
                    .find(|rec| record_id(rec).as_ref() == Some(id))
                    .ok_or_else(|| {
                        CacheError::Transport(format!("no record {}/{}", service, id))
                    })?;
                if let (Some(target), Some(fields)) = (
                    existing.as_object_mut(),
                    payload.and_then(|p| p.as_object()),
                ) {
                    for (key, value) in fields {
                        target.insert(key.clone(), value.clone());
                    }
                }
                Ok(existing.clone())
            }
            MutationKind::Update => {
                let id = id.expect("update needs an id");
                let mut record = payload.cloned().unwrap_or(json!({}));
                if record_id(&record).is_none() {
                    if let Some(obj) = record.as_object_mut() {
                        obj.insert("id".into(), id.to_value());
                    }
                }
                records.retain(|rec| record_id(rec).as_ref() != Some(id));
                records.push(record.clone());
                Ok(record)
            }
            MutationKind::Remove => {
                let id = id.expect("remove needs an id");
                let pos = records
                    .iter()
                    .position(|rec| record_id(rec).as_ref() == Some(id))
                    .ok_or_else(|| {
                        CacheError::Transport(format!("no record {}/{}", service, id))
                    })?;
                Ok(records.remove(pos))
            }
        }
    }

    fn on(&self, service: &str, event: EventKind, handler: EventHandler) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Ordering::SeqCst));
        self.handlers
            .lock()
            .entry((service.to_string(), event))
            .or_default()
            .push((id, handler));
        id
    }

    fn off(&self, service: &str, event: EventKind, handler: HandlerId) {
        if let Some(list) = self
            .handlers
            .lock()
            .get_mut(&(service.to_string(), event))
        {
            list.retain(|(id, _)| *id != handler);
        }
    }
}

// --- Test helpers ---

pub fn cache_with(transport: &Arc<MockTransport>) -> Cache {
    let client: Arc<dyn Transport> = transport.clone();
    Cache::new(CacheConfig {
        transport: Some(client),
    })
    .unwrap()
}

pub fn note(id: i64, content: &str) -> Value {
    json!({ "id": id, "content": content })
}

pub fn tagged(id: i64, content: &str, tag: &str) -> Value {
    json!({ "id": id, "content": content, "tag": tag })
}

/// Receive the next state notification, failing loudly if none arrives.
pub fn next(watch: &WatchHandle) -> QueryState {
    watch
        .recv_timeout(Duration::from_millis(250))
        .expect("expected a state notification")
}

pub fn assert_no_update(watch: &WatchHandle) {
    assert!(
        watch.try_recv().is_err(),
        "expected no further notifications"
    );
}

/// Contents of the `content` field across a result, in result order.
pub fn contents(state: &QueryState) -> Vec<String> {
    state
        .data
        .records()
        .iter()
        .filter_map(|rec| rec.get("content").and_then(|c| c.as_str()))
        .map(str::to_string)
        .collect()
}
