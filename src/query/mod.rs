//! Query descriptors, filter matching, and the live query index.
//!
//! A descriptor canonicalizes a query's parameters into a digest so that
//! identical queries share one cache entry. The index holds the current
//! result ids, loading/error state, and subscribers for every active query.

mod descriptor;
mod index;
pub mod matcher;

pub use descriptor::{QueryDescriptor, QueryId, QueryKind};
pub use index::{QueryEntry, QueryIndex, ResultSet};
pub use matcher::matches;
