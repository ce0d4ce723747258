//! Record values shared by snapshots, working state and patches.
//!
//! Absence is never a value: a field that is not set is simply missing from
//! its [`Record`]. [`Value::Delete`] is the explicit marker a working record
//! uses to ask for a field's removal on the next persist.

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::compare;
use crate::error::{PathError, ValueError};
use crate::path::{FieldPath, Segment};

/// JSON key of the deletion marker object, `{"$delete": true}`.
///
/// The key is reserved: a JSON object whose only entry is `"$delete": true`
/// always reads back as [`Value::Delete`], never as a nested record.
pub const DELETE_MARKER_KEY: &str = "$delete";

// ──────────────────────────────────────────────
// Value
// ──────────────────────────────────────────────

/// A field value. Equality is structural, see [`compare::equal`].
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    List(Vec<Value>),
    Record(Record),
    /// Explicit request to remove the field when persisting.
    Delete,
}

impl Value {
    /// Human-readable variant name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Decimal(_) => "Decimal",
            Value::Text(_) => "Text",
            Value::List(_) => "List",
            Value::Record(_) => "Record",
            Value::Delete => "Delete",
        }
    }

    /// Falsy values: `Null`, `false`, zero, the empty string, and `Delete`.
    pub fn is_falsy(&self) -> bool {
        match self {
            Value::Null | Value::Delete => true,
            Value::Bool(b) => !*b,
            Value::Int(i) => *i == 0,
            Value::Decimal(d) => d.is_zero(),
            Value::Text(s) => s.is_empty(),
            Value::List(_) | Value::Record(_) => false,
        }
    }

    /// A value that counts as "selected" for dependency purposes.
    /// `Null` and `Delete` do not.
    pub fn is_set(&self) -> bool {
        !matches!(self, Value::Null | Value::Delete)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Convert from JSON. `{"$delete": true}` becomes [`Value::Delete`]
    /// (see [`DELETE_MARKER_KEY`]); any other object, including one that
    /// carries `$delete` next to other keys, is a `Record`. Integral
    /// numbers become `Int`, everything else numeric `Decimal`.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, ValueError> {
        Ok(match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => {
                    let raw = n.to_string();
                    let d = Decimal::from_str(&raw)
                        .or_else(|_| Decimal::from_scientific(&raw))
                        .map_err(|_| ValueError::UnsupportedNumber(raw))?;
                    Value::Decimal(d)
                }
            },
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(
                items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<_, _>>()?,
            ),
            serde_json::Value::Object(map) => {
                if map.len() == 1 && map.get(DELETE_MARKER_KEY) == Some(&serde_json::Value::Bool(true))
                {
                    Value::Delete
                } else {
                    Value::Record(Record::from_json_map(map)?)
                }
            }
        })
    }

    /// Convert to JSON. Decimals become JSON numbers where representable
    /// and strings otherwise.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Decimal(d) => {
                let raw = d.normalize().to_string();
                serde_json::Number::from_str(&raw)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::String(raw))
            }
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(record) => record.to_json(),
            Value::Delete => {
                let mut marker = serde_json::Map::new();
                marker.insert(DELETE_MARKER_KEY.to_string(), serde_json::Value::Bool(true));
                serde_json::Value::Object(marker)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        compare::equal(self, other)
    }
}

impl Eq for Value {}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Value::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Value::from_json(&json).map_err(serde::de::Error::custom)
    }
}

// ──────────────────────────────────────────────
// Record
// ──────────────────────────────────────────────

/// A keyed mapping from field name to value. Key order never matters.
///
/// Field names may be anything, but a record holding only `$delete: true`
/// cannot round-trip through JSON; it is read back as [`Value::Delete`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Builder-style insert, handy for fixtures.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Keep only the given top-level keys.
    pub fn restrict<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Record {
        let mut out = Record::new();
        for key in keys {
            if let Some(value) = self.0.get(key) {
                out.0.insert(key.to_string(), value.clone());
            }
        }
        out
    }

    // ── Path access ───────────────────────────────────────────────────────────

    /// Read the value at `path`, if every segment resolves.
    pub fn get_path(&self, path: &FieldPath) -> Option<&Value> {
        let (first, rest) = path.segments().split_first()?;
        let Segment::Key(key) = first else {
            return None;
        };
        let mut current = self.0.get(key)?;
        for segment in rest {
            current = match (segment, current) {
                (Segment::Key(k), Value::Record(r)) => r.0.get(k)?,
                (Segment::Index(i), Value::List(items)) => items.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// True if the value at `path` exists and is neither `Null` nor `Delete`.
    pub fn is_set(&self, path: &FieldPath) -> bool {
        self.get_path(path).is_some_and(Value::is_set)
    }

    /// Write `value` at `path`, creating intermediate records (or an empty
    /// list for an index segment) where the path runs through a missing or
    /// null field. A list index must address an existing element or the
    /// append position. Returns the replaced value.
    pub fn set_path(&mut self, path: &FieldPath, value: Value) -> Result<Option<Value>, PathError> {
        let Some((Segment::Key(key), rest)) = path.segments().split_first() else {
            return Err(PathError::Invalid {
                path: path.to_string(),
                message: "path must start with a key".to_string(),
            });
        };
        if rest.is_empty() {
            return Ok(self.0.insert(key.clone(), value));
        }
        let slot = self.0.entry(key.clone()).or_insert(Value::Null);
        set_in(slot, rest, value, path)
    }

    /// Remove the value at `path`. Removing a list element shifts the
    /// elements after it.
    pub fn remove_path(&mut self, path: &FieldPath) -> Option<Value> {
        let (last, parents) = path.segments().split_last()?;
        if parents.is_empty() {
            return match last {
                Segment::Key(key) => self.0.remove(key),
                Segment::Index(_) => None,
            };
        }
        let parent = self.get_segments_mut(parents)?;
        match (last, parent) {
            (Segment::Key(key), Value::Record(record)) => record.0.remove(key),
            (Segment::Index(i), Value::List(items)) if *i < items.len() => Some(items.remove(*i)),
            _ => None,
        }
    }

    fn get_segments_mut(&mut self, segments: &[Segment]) -> Option<&mut Value> {
        let (first, rest) = segments.split_first()?;
        let Segment::Key(key) = first else {
            return None;
        };
        let mut current = self.0.get_mut(key)?;
        for segment in rest {
            current = match (segment, current) {
                (Segment::Key(k), Value::Record(r)) => r.0.get_mut(k)?,
                (Segment::Index(i), Value::List(items)) => items.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    // ── JSON ──────────────────────────────────────────────────────────────────

    pub fn from_json(json: &serde_json::Value) -> Result<Self, ValueError> {
        match json {
            serde_json::Value::Object(map) => Record::from_json_map(map),
            serde_json::Value::Null => Err(ValueError::NotARecord("null")),
            serde_json::Value::Bool(_) => Err(ValueError::NotARecord("bool")),
            serde_json::Value::Number(_) => Err(ValueError::NotARecord("number")),
            serde_json::Value::String(_) => Err(ValueError::NotARecord("string")),
            serde_json::Value::Array(_) => Err(ValueError::NotARecord("array")),
        }
    }

    fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Result<Self, ValueError> {
        let mut record = Record::new();
        for (key, value) in map {
            record.0.insert(key.clone(), Value::from_json(value)?);
        }
        Ok(record)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

fn set_in(
    slot: &mut Value,
    segments: &[Segment],
    value: Value,
    full: &FieldPath,
) -> Result<Option<Value>, PathError> {
    let Some((head, tail)) = segments.split_first() else {
        return Ok(Some(std::mem::replace(slot, value)));
    };

    if matches!(slot, Value::Null | Value::Delete) {
        *slot = match head {
            Segment::Key(_) => Value::Record(Record::new()),
            Segment::Index(_) => Value::List(Vec::new()),
        };
    }

    match (head, slot) {
        (Segment::Key(key), Value::Record(record)) => {
            if tail.is_empty() {
                return Ok(record.0.insert(key.clone(), value));
            }
            let child = record.0.entry(key.clone()).or_insert(Value::Null);
            set_in(child, tail, value, full)
        }
        (Segment::Index(i), Value::List(items)) => {
            let len = items.len();
            if *i < len {
                set_in(&mut items[*i], tail, value, full)
            } else if *i == len && tail.is_empty() {
                items.push(value);
                Ok(None)
            } else {
                Err(PathError::IndexOutOfBounds {
                    path: full.to_string(),
                    index: *i,
                    len,
                })
            }
        }
        (_, other) => Err(PathError::TypeMismatch {
            path: full.to_string(),
            found: other.type_name(),
        }),
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record(iter.into_iter().collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        Record::from_json(&json).map_err(serde::de::Error::custom)
    }
}
