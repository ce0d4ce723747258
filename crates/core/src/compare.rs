//! Strict structural equality over record values.
//!
//! The comparator never collapses "effectively empty" values; that policy
//! belongs to the differ. `Null` equals only `Null`, and a missing field
//! equals only another missing field.

use crate::value::{Record, Value};

/// Deep equality. Sequences compare in order, records by key set and
/// per-key values, and mismatched variants are never equal.
pub fn equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) | (Value::Delete, Value::Delete) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Decimal(x), Value::Decimal(y)) => x == y,
        (Value::Text(x), Value::Text(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| equal(l, r))
        }
        (Value::Record(x), Value::Record(y)) => records_equal(x, y),
        _ => false,
    }
}

/// Equality of two records: same keys, recursively equal values.
pub fn records_equal(a: &Record, b: &Record) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .all(|(key, value)| b.get(key).is_some_and(|other| equal(value, other)))
}

/// Equality where either side may be absent. Absence equals only absence.
pub fn equal_opt(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => equal(a, b),
        _ => false,
    }
}
