//! # Reactive Record Cache
//!
//! A client-side cache that keeps live query results consistent with a
//! stream of realtime mutation events, without refetching or manual
//! merging.
//!
//! ## Core Concepts
//!
//! - **Records**: a normalized (service, id) → record map, written before
//!   any query result that references it
//! - **Queries**: get-by-id and find-with-filter subscriptions, cached once
//!   per distinct descriptor with at most one fetch in flight
//! - **Reconciliation**: create/update/patch/remove events incrementally
//!   update every affected query result
//! - **Subscriptions**: synchronous change notification in subscription
//!   order, with leak-free detach
//!
//! ## Example
//!
//! ```ignore
//! use ripple::{Cache, CacheConfig};
//! use serde_json::json;
//!
//! let cache = Cache::new(CacheConfig {
//!     transport: Some(client),
//! })?;
//!
//! // Subscribe to a filtered collection; the callback fires on load and
//! // after every realtime mutation that affects the result.
//! let notes = cache.find("notes", json!({ "tag": "idea" }), |state| {
//!     if state.is_ready() {
//!         render(state.data.records());
//!     }
//! })?;
//!
//! // Mutations write through the cache.
//! cache.patch("notes", 1, json!({ "content": "updated" }))?;
//!
//! // Detach when the consumer goes away.
//! cache.detach(&notes);
//! ```

pub mod cache;
pub mod error;
pub mod fetch;
pub mod query;
pub mod reconcile;
pub mod records;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use cache::{Cache, CacheConfig};
pub use error::{CacheError, Result};
pub use fetch::{FetchCoordinator, PendingFetch};
pub use query::{matches, QueryDescriptor, QueryEntry, QueryId, QueryIndex, QueryKind, ResultSet};
pub use records::{RecordStore, VersionedRecord};
pub use reconcile::{reconcile, RecordChange};
pub use subscriptions::{
    ChangeCallback, QueryData, QueryState, SubscriberId, Subscribers, SubscriptionHandle,
    WatchHandle,
};
pub use transport::{
    EventHandler, FetchCallback, FetchResponse, FetchTarget, HandlerId, Transport,
};
pub use types::{record_id, CacheStats, EventKind, Id, MutationKind, Sequence};
