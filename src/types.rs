//! Core types for the cache.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar record identifier.
///
/// Services address records by a single scalar id, either numeric or string.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    Str(String),
}

impl Id {
    /// Extract an id from a JSON scalar. Non-scalar values have no id.
    pub fn from_value(value: &serde_json::Value) -> Option<Id> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Id::Int),
            serde_json::Value::String(s) => Some(Id::Str(s.clone())),
            _ => None,
        }
    }

    /// The JSON representation of this id.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            Id::Int(n) => serde_json::Value::from(*n),
            Id::Str(s) => serde_json::Value::from(s.clone()),
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(n) => write!(f, "Id({})", n),
            Id::Str(s) => write!(f, "Id({:?})", s),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(n) => write!(f, "{}", n),
            Id::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Int(n)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::Str(s.to_string())
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::Str(s)
    }
}

/// Extract the scalar id from a record object.
pub fn record_id(record: &serde_json::Value) -> Option<Id> {
    record.get("id").and_then(Id::from_value)
}

/// Position in the cache's logical write order.
///
/// Every record write and every fetch issue is stamped with a sequence drawn
/// from a monotonically increasing per-cache clock, so a fetch response can
/// be checked against writes that happened after it was issued.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Sequence(pub u64);

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seq({})", self.0)
    }
}

impl Sequence {
    pub fn next(self) -> Self {
        Sequence(self.0 + 1)
    }
}

/// Realtime mutation event kinds delivered by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Updated,
    Patched,
    Removed,
}

impl EventKind {
    /// Every event kind the bridge registers for.
    pub const ALL: [EventKind; 4] = [
        EventKind::Created,
        EventKind::Updated,
        EventKind::Patched,
        EventKind::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Created => "created",
            EventKind::Updated => "updated",
            EventKind::Patched => "patched",
            EventKind::Removed => "removed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation operations the cache can ask the transport to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Create,
    Patch,
    Update,
    Remove,
}

impl MutationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Patch => "patch",
            MutationKind::Update => "update",
            MutationKind::Remove => "remove",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache statistics.
#[derive(Clone, Debug, Default)]
pub struct CacheStats {
    pub record_count: usize,
    pub query_count: usize,
    pub subscriber_count: usize,
    pub in_flight_fetches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_from_value() {
        assert_eq!(Id::from_value(&json!(7)), Some(Id::Int(7)));
        assert_eq!(Id::from_value(&json!("abc")), Some(Id::Str("abc".into())));
        assert_eq!(Id::from_value(&json!(null)), None);
        assert_eq!(Id::from_value(&json!({"id": 1})), None);
    }

    #[test]
    fn test_record_id() {
        assert_eq!(record_id(&json!({"id": 1, "content": "x"})), Some(Id::Int(1)));
        assert_eq!(record_id(&json!({"content": "x"})), None);
        assert_eq!(record_id(&json!("not an object")), None);
    }

    #[test]
    fn test_id_roundtrip() {
        let id = Id::Str("note-1".into());
        assert_eq!(Id::from_value(&id.to_value()), Some(id));
    }

    #[test]
    fn test_sequence_ordering() {
        let seq = Sequence(5);
        assert_eq!(seq.next(), Sequence(6));
        assert!(Sequence(6) > Sequence(5));
    }
}
