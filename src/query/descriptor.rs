//! Query descriptors and their canonical digests.

use crate::error::{CacheError, Result};
use crate::types::Id;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Digest identifying a distinct query (SHA-256 of its canonical form).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub [u8; 32]);

impl QueryId {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryId({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// The shape of a query: a single record by id, or a filtered collection.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryKind {
    Get { id: Id },
    Find { params: Value },
}

/// A canonicalized query against one service.
///
/// Two descriptors with equal serialized params always produce the same
/// [`QueryId`] and therefore share one query index entry.
#[derive(Clone, Debug)]
pub struct QueryDescriptor {
    service: String,
    kind: QueryKind,
}

impl QueryDescriptor {
    /// Descriptor for a get-by-id query.
    pub fn get(service: impl Into<String>, id: Id) -> Self {
        Self {
            service: service.into(),
            kind: QueryKind::Get { id },
        }
    }

    /// Descriptor for a find query. Params must be a JSON object; null is
    /// accepted as the empty query.
    pub fn find(service: impl Into<String>, params: Value) -> Result<Self> {
        let params = match params {
            Value::Null => Value::Object(serde_json::Map::new()),
            obj @ Value::Object(_) => obj,
            other => {
                return Err(CacheError::InvalidQuery(format!(
                    "find params must be an object, got {}",
                    other
                )))
            }
        };
        Ok(Self {
            service: service.into(),
            kind: QueryKind::Find { params },
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn kind(&self) -> &QueryKind {
        &self.kind
    }

    pub fn is_find(&self) -> bool {
        matches!(self.kind, QueryKind::Find { .. })
    }

    /// Filter params for find queries; get queries have no filter.
    pub fn filter(&self) -> Option<&Value> {
        match &self.kind {
            QueryKind::Find { params } => Some(params),
            QueryKind::Get { .. } => None,
        }
    }

    /// Deterministic serialized form of this descriptor.
    ///
    /// serde_json object keys serialize in sorted order, so equal params
    /// canonicalize identically regardless of construction order. (This
    /// relies on serde_json's default map; the `preserve_order` feature
    /// must stay off.)
    pub fn canonical(&self) -> String {
        match &self.kind {
            QueryKind::Get { id } => format!("get:{}:{}", self.service, id.to_value()),
            QueryKind::Find { params } => format!("find:{}:{}", self.service, params),
        }
    }

    /// The cache key for this descriptor.
    pub fn id(&self) -> QueryId {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        QueryId(hasher.finalize().into())
    }
}
