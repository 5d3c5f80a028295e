//! Filter predicate evaluation for find queries.
//!
//! Evaluates a record against query params the way the remote service
//! would, so mutation events can be reconciled into cached results without
//! refetching. Supports top-level field equality plus the common operator
//! subset: `$in`, `$nin`, `$lt`, `$lte`, `$gt`, `$gte`, `$ne`, `$or`,
//! `$and`. Evaluation is pure and side-effect-free.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use tracing::warn;

/// Query keys that control pagination/projection rather than matching.
/// They distinguish descriptors but are ignored by the predicate.
const RESERVED_KEYS: [&str; 4] = ["$limit", "$skip", "$sort", "$select"];

/// Whether `record` satisfies the filter params.
pub fn matches(filter: &Value, record: &Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        // A non-object filter constrains nothing.
        return true;
    };

    conditions.iter().all(|(key, expected)| match key.as_str() {
        "$or" => expected
            .as_array()
            .is_some_and(|alts| alts.iter().any(|alt| matches(alt, record))),
        "$and" => expected
            .as_array()
            .is_some_and(|alts| alts.iter().all(|alt| matches(alt, record))),
        key if RESERVED_KEYS.contains(&key) => true,
        key => field_matches(record.get(key), expected),
    })
}

fn field_matches(actual: Option<&Value>, expected: &Value) -> bool {
    if let Some(operators) = operator_object(expected) {
        operators
            .iter()
            .all(|(op, operand)| apply_operator(actual, op, operand))
    } else {
        actual.is_some_and(|value| value == expected)
    }
}

/// An expected value is an operator object when any key starts with `$`.
fn operator_object(expected: &Value) -> Option<&Map<String, Value>> {
    expected
        .as_object()
        .filter(|map| map.keys().any(|key| key.starts_with('$')))
}

fn apply_operator(actual: Option<&Value>, op: &str, operand: &Value) -> bool {
    match op {
        "$in" => operand
            .as_array()
            .is_some_and(|set| actual.is_some_and(|value| set.contains(value))),
        "$nin" => operand
            .as_array()
            .is_some_and(|set| actual.map_or(true, |value| !set.contains(value))),
        "$ne" => actual.map_or(true, |value| value != operand),
        "$lt" => compare(actual, operand) == Some(Ordering::Less),
        "$lte" => matches!(compare(actual, operand), Some(Ordering::Less | Ordering::Equal)),
        "$gt" => compare(actual, operand) == Some(Ordering::Greater),
        "$gte" => matches!(
            compare(actual, operand),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        other => {
            warn!(operator = other, "unsupported query operator matches nothing");
            false
        }
    }
}

/// Order numbers numerically and strings lexically; mixed or missing
/// operands do not compare.
fn compare(actual: Option<&Value>, operand: &Value) -> Option<Ordering> {
    match (actual?, operand) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
