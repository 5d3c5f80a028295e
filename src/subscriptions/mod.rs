//! Subscription primitives for live query results.
//!
//! Consumers attach to a query with a change callback and receive a fresh
//! [`QueryState`] snapshot synchronously after every relevant state change,
//! in subscription order. A channel-backed [`WatchHandle`] is layered on
//! top for consumers without their own event loop.
//!
//! # Example
//!
//! ```ignore
//! let notes = cache.watch_find("notes", json!({ "tag": "idea" }))?;
//!
//! loop {
//!     let state = notes.recv()?;
//!     if state.is_ready() {
//!         render(state.data.records());
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::Subscribers;
pub use types::{
    ChangeCallback, QueryData, QueryState, SubscriberId, SubscriptionHandle, WatchHandle,
};
