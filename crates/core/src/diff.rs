//! Snapshot diffing: the sparse patch between a persisted record and its
//! working copy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::compare;
use crate::path::FieldPath;
use crate::value::{Record, Value};

// ──────────────────────────────────────────────
// Patch
// ──────────────────────────────────────────────

/// The top-level fields whose working value differs from the snapshot.
///
/// A patch is computed on demand and handed to the store; it is never
/// kept as state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Record);

impl Patch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Fields the patch asks the store to remove.
    pub fn deletions(&self) -> impl Iterator<Item = &String> {
        self.0
            .iter()
            .filter(|(_, v)| matches!(v, Value::Delete))
            .map(|(k, _)| k)
    }

    pub fn as_record(&self) -> &Record {
        &self.0
    }

    pub fn into_record(self) -> Record {
        self.0
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.0.to_json()
    }

    /// One line per field, `key: value`, for logs and debugging.
    pub fn to_text(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| {
                let rendered = serde_json::to_string(&value.to_json()).unwrap_or_default();
                format!("{}: {}", key, rendered)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl From<Record> for Patch {
    fn from(record: Record) -> Self {
        Patch(record)
    }
}

// ──────────────────────────────────────────────
// DiffPolicy
// ──────────────────────────────────────────────

/// Rules for edits that are "effectively unchanged".
///
/// Form controls tend to default to `""` or `[]` rather than leaving a
/// field untouched; such values must not produce patches or dirty flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffPolicy {
    /// A blank (empty or whitespace-only) string over an absent or falsy
    /// original is not an edit.
    pub suppress_blank_text: bool,
    /// An empty list over an absent or empty original is not an edit.
    pub suppress_empty_lists: bool,
}

impl Default for DiffPolicy {
    fn default() -> Self {
        DiffPolicy {
            suppress_blank_text: true,
            suppress_empty_lists: true,
        }
    }
}

impl DiffPolicy {
    /// Strict policy: every structural difference is a change.
    pub fn strict() -> Self {
        DiffPolicy {
            suppress_blank_text: false,
            suppress_empty_lists: false,
        }
    }

    /// True if `current` should not count as an edit over `original`
    /// even though the two are not structurally equal.
    pub fn is_effectively_unchanged(&self, original: Option<&Value>, current: &Value) -> bool {
        match current {
            Value::Text(s) if self.suppress_blank_text => {
                s.trim().is_empty() && original.map_or(true, Value::is_falsy)
            }
            Value::List(items) if self.suppress_empty_lists => {
                items.is_empty()
                    && match original {
                        None => true,
                        Some(Value::List(prev)) => prev.is_empty(),
                        Some(_) => false,
                    }
            }
            // Deleting something that was never there.
            Value::Delete => original.is_none(),
            _ => false,
        }
    }

    fn is_change(&self, original: Option<&Value>, current: &Value) -> bool {
        !compare::equal_opt(original, Some(current))
            && !self.is_effectively_unchanged(original, current)
    }
}

// ──────────────────────────────────────────────
// Diffing
// ──────────────────────────────────────────────

/// Diff with the default policy.
pub fn diff(original: &Record, current: &Record) -> Patch {
    diff_with(&DiffPolicy::default(), original, current)
}

/// Compare every key of `current` against `original` and stage the ones
/// that changed. Keys present only in `original` are not inspected; a
/// removal must be requested with [`Value::Delete`].
pub fn diff_with(policy: &DiffPolicy, original: &Record, current: &Record) -> Patch {
    diff_keys(policy, original, current, current.keys().map(String::as_str))
}

/// Like [`diff_with`], restricted to the top-level fields the given paths
/// live under.
pub fn diff_fields(
    policy: &DiffPolicy,
    original: &Record,
    current: &Record,
    fields: &[FieldPath],
) -> Patch {
    diff_keys(policy, original, current, fields.iter().map(FieldPath::root))
}

fn diff_keys<'a>(
    policy: &DiffPolicy,
    original: &Record,
    current: &Record,
    keys: impl IntoIterator<Item = &'a str>,
) -> Patch {
    let mut patch = Record::new();
    for key in keys {
        if patch.contains_key(key) {
            continue;
        }
        let Some(value) = current.get(key) else {
            continue;
        };
        if policy.is_change(original.get(key), value) {
            patch.insert(key, value.clone());
        }
    }
    Patch(patch)
}

/// Leaf-level paths whose value changed, for per-field dirty indicators.
///
/// A top-level field is inspected only if [`diff_with`] would stage it, so
/// the result is empty exactly when the patch is. Inside a changed field,
/// records are compared key by key (keys present on either side) and lists
/// of equal length element by element, with strict equality.
pub fn changed_paths(policy: &DiffPolicy, original: &Record, current: &Record) -> Vec<FieldPath> {
    let mut out = Vec::new();
    for (key, value) in current.iter() {
        let before = original.get(key);
        if !policy.is_change(before, value) {
            continue;
        }
        let at = FieldPath::key(key.clone());
        let found = out.len();
        collect_changes(&at, before, Some(value), &mut out);
        if out.len() == found {
            out.push(at);
        }
    }
    out
}

fn collect_changes(
    at: &FieldPath,
    original: Option<&Value>,
    current: Option<&Value>,
    out: &mut Vec<FieldPath>,
) {
    match (original, current) {
        (Some(Value::Record(before)), Some(Value::Record(after))) => {
            let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
            for key in keys {
                collect_changes(&at.child(key.clone()), before.get(key), after.get(key), out);
            }
        }
        (Some(Value::List(before)), Some(Value::List(after))) if before.len() == after.len() => {
            for (i, (b, a)) in before.iter().zip(after).enumerate() {
                collect_changes(&at.index(i), Some(b), Some(a), out);
            }
        }
        _ => {
            if !compare::equal_opt(original, current) {
                out.push(at.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(json: serde_json::Value) -> Record {
        Record::from_json(&json).unwrap()
    }

    #[test]
    fn stages_only_changed_keys() {
        let original = rec(json!({ "firstName": "Jo", "lastName": "Bloggs", "hours": 10 }));
        let current = rec(json!({ "firstName": "Jo", "lastName": "Blogs", "hours": 10 }));
        let patch = diff(&original, &current);
        assert_eq!(patch.to_json(), json!({ "lastName": "Blogs" }));
    }

    #[test]
    fn blank_text_over_absent_or_falsy_is_suppressed() {
        assert!(diff(&rec(json!({})), &rec(json!({ "name": "" }))).is_empty());
        assert!(diff(&rec(json!({})), &rec(json!({ "name": "   " }))).is_empty());
        assert!(diff(&rec(json!({ "name": null })), &rec(json!({ "name": "" }))).is_empty());
        assert!(diff(&rec(json!({ "n": 0 })), &rec(json!({ "n": "" }))).is_empty());
    }

    #[test]
    fn blank_text_over_real_value_is_a_removal() {
        let patch = diff(&rec(json!({ "name": "x" })), &rec(json!({ "name": "" })));
        assert_eq!(patch.to_json(), json!({ "name": "" }));
    }

    #[test]
    fn empty_list_suppression() {
        assert!(diff(&rec(json!({})), &rec(json!({ "skills": [] }))).is_empty());
        assert!(diff(&rec(json!({ "skills": [] })), &rec(json!({ "skills": [] }))).is_empty());
        let patch = diff(&rec(json!({ "skills": ["a"] })), &rec(json!({ "skills": [] })));
        assert_eq!(patch.len(), 1);
        // Null is a value, not absence.
        let patch = diff(&rec(json!({ "skills": null })), &rec(json!({ "skills": [] })));
        assert_eq!(patch.len(), 1);
    }

    #[test]
    fn strict_policy_keeps_blank_edits() {
        let patch = diff_with(&DiffPolicy::strict(), &rec(json!({})), &rec(json!({ "name": "" })));
        assert_eq!(patch.len(), 1);
    }

    #[test]
    fn keys_only_in_original_are_ignored() {
        let patch = diff(&rec(json!({ "a": 1, "b": 2 })), &rec(json!({ "a": 1 })));
        assert!(patch.is_empty());
    }

    #[test]
    fn delete_marker_is_a_change_only_when_original_has_the_key() {
        let mut current = Record::new();
        current.insert("legacyId", Value::Delete);

        let patch = diff(&rec(json!({ "legacyId": "L-1" })), &current);
        assert_eq!(patch.deletions().collect::<Vec<_>>(), vec!["legacyId"]);

        assert!(diff(&rec(json!({})), &current).is_empty());
    }

    #[test]
    fn nested_changes_stage_the_whole_top_level_field() {
        let original = rec(json!({ "emergencyContact": { "name": "Al", "phone": "1" } }));
        let current = rec(json!({ "emergencyContact": { "name": "Al", "phone": "2" } }));
        let patch = diff(&original, &current);
        assert_eq!(
            patch.to_json(),
            json!({ "emergencyContact": { "name": "Al", "phone": "2" } })
        );
    }

    #[test]
    fn diff_fields_restricts_to_step_fields() {
        let original = rec(json!({ "firstName": "Jo", "stateId": "NSW-1" }));
        let current = rec(json!({ "firstName": "Joanne", "stateId": "VIC-1" }));
        let fields = vec![FieldPath::parse("stateId").unwrap()];
        let patch = diff_fields(&DiffPolicy::default(), &original, &current, &fields);
        assert_eq!(patch.to_json(), json!({ "stateId": "VIC-1" }));
    }

    #[test]
    fn diff_fields_uses_root_of_nested_paths_once() {
        let original = rec(json!({ "contact": { "phone": "1", "email": "a@b" } }));
        let current = rec(json!({ "contact": { "phone": "2", "email": "a@b" } }));
        let fields = vec![
            FieldPath::parse("contact.phone").unwrap(),
            FieldPath::parse("contact.email").unwrap(),
        ];
        let patch = diff_fields(&DiffPolicy::default(), &original, &current, &fields);
        assert_eq!(patch.len(), 1);
        assert!(patch.contains_key("contact"));
    }

    #[test]
    fn changed_paths_reports_leaves() {
        let original = rec(json!({
            "contact": { "phone": "1", "email": "a@b" },
            "skills": ["a", "b"],
            "notes": ""
        }));
        let current = rec(json!({
            "contact": { "phone": "2", "email": "a@b", "fax": "" },
            "skills": ["a", "c"],
            "notes": "",
            "nickname": " ",
            "hours": 4
        }));
        let paths: Vec<String> = changed_paths(&DiffPolicy::default(), &original, &current)
            .iter()
            .map(ToString::to_string)
            .collect();
        // Blank text is only suppressed for a whole top-level field.
        assert_eq!(paths, vec!["contact.fax", "contact.phone", "hours", "skills[1]"]);
    }

    #[test]
    fn changed_paths_reports_nested_removals() {
        let original = rec(json!({ "contact": { "phone": "1", "fax": "9" } }));
        let current = rec(json!({ "contact": { "phone": "1" } }));
        let paths = changed_paths(&DiffPolicy::default(), &original, &current);
        assert_eq!(paths, vec![FieldPath::parse("contact.fax").unwrap()]);
        assert!(!diff(&original, &current).is_empty());
    }

    #[test]
    fn changed_paths_agrees_with_diff() {
        let original = rec(json!({
            "contact": { "phone": "1", "fax": "9" },
            "tags": [],
            "notes": null
        }));
        let cases = [
            json!({ "contact": { "phone": "1" } }),
            json!({ "contact": { "phone": "1", "fax": "9", "email": "" } }),
            json!({ "contact": { "phone": "1", "fax": "9" }, "tags": [], "notes": "" }),
            json!({ "notes": [] }),
            json!({ "tags": ["a"] }),
            json!({ "title": "   " }),
            json!({ "contact": { "$delete": true } }),
        ];
        for case in cases {
            let current = rec(case.clone());
            let patch = diff(&original, &current);
            let paths = changed_paths(&DiffPolicy::default(), &original, &current);
            assert_eq!(patch.is_empty(), paths.is_empty(), "{case}");
        }
    }

    #[test]
    fn patch_text_rendering() {
        let patch = diff(&rec(json!({})), &rec(json!({ "a": 1, "b": "x" })));
        assert_eq!(patch.to_text(), "a: 1\nb: \"x\"");
    }
}
