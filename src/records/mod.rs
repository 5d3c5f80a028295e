//! Normalized record storage.
//!
//! Records are held in a keyed (service, id) map with merge semantics and
//! version stamps. The store knows nothing about queries.

mod store;

pub use store::{RecordStore, VersionedRecord};
