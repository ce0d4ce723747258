//! The persisted baseline of an edited entity and its working copy.

use crate::compare;
use crate::diff::{self, DiffPolicy, Patch};
use crate::error::PathError;
use crate::path::FieldPath;
use crate::value::{Record, Value};

// ──────────────────────────────────────────────
// Snapshot
// ──────────────────────────────────────────────

/// The last record known to be persisted.
///
/// A snapshot is never mutated. After a successful persist the owner
/// replaces it wholesale with [`Snapshot::rebase`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    record: Record,
}

impl Snapshot {
    pub fn new(record: Record) -> Self {
        Snapshot { record }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        self.record.get_path(path)
    }

    /// Seed a working copy from this snapshot.
    pub fn fork(&self) -> WorkingState {
        WorkingState::new(self.record.clone())
    }

    /// The next baseline after `patch` was persisted and the store answered
    /// with `persisted`. Fields the patch deleted are dropped; every field
    /// the store returned is authoritative and overwrites.
    pub fn rebase(&self, patch: &Patch, persisted: &Record) -> Snapshot {
        let mut next = self.record.clone();
        for (key, value) in patch.iter().chain(persisted.iter()) {
            match value {
                Value::Delete => {
                    next.remove(key);
                }
                other => {
                    next.insert(key.clone(), other.clone());
                }
            }
        }
        Snapshot::new(next)
    }
}

// ──────────────────────────────────────────────
// WorkingState
// ──────────────────────────────────────────────

/// The in-progress edit buffer for one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingState {
    record: Record,
}

impl WorkingState {
    pub fn new(record: Record) -> Self {
        WorkingState { record }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn into_record(self) -> Record {
        self.record
    }

    pub fn get(&self, path: &FieldPath) -> Option<&Value> {
        self.record.get_path(path)
    }

    pub fn is_set(&self, path: &FieldPath) -> bool {
        self.record.is_set(path)
    }

    pub fn set(&mut self, path: &FieldPath, value: Value) -> Result<Option<Value>, PathError> {
        self.record.set_path(path, value)
    }

    /// Remove the field entirely.
    pub fn unset(&mut self, path: &FieldPath) -> Option<Value> {
        self.record.remove_path(path)
    }

    /// The working record restricted to the top-level fields the given
    /// paths live under.
    pub fn restrict(&self, fields: &[FieldPath]) -> Record {
        self.record.restrict(fields.iter().map(FieldPath::root))
    }

    /// Patch of this working copy against `snapshot`.
    pub fn diff(&self, policy: &DiffPolicy, snapshot: &Snapshot) -> Patch {
        diff::diff_with(policy, snapshot.record(), &self.record)
    }

    /// Leaf paths that differ from `snapshot`.
    pub fn dirty_fields(&self, policy: &DiffPolicy, snapshot: &Snapshot) -> Vec<FieldPath> {
        diff::changed_paths(policy, snapshot.record(), &self.record)
    }

    /// Take in the store's answer for a persisted patch. `previous` is the
    /// snapshot the patch was computed against.
    ///
    /// Applied `Delete` markers are dropped. For every patched key whose
    /// working value is still what was sent, the persisted value replaces
    /// it (server-side normalisation). Returned keys outside the patch
    /// (audit fields, server-computed values) replace the working value
    /// when it still matches `previous`. Keys edited since are left alone.
    pub fn adopt(&mut self, patch: &Patch, persisted: &Record, previous: &Snapshot) {
        for (key, sent) in patch.iter() {
            let unchanged = self
                .record
                .get(key)
                .is_some_and(|current| compare::equal(current, sent));
            if !unchanged {
                continue;
            }
            match (sent, persisted.get(key)) {
                (Value::Delete, _) | (_, Some(Value::Delete)) => {
                    self.record.remove(key);
                }
                (_, Some(stored)) => {
                    self.record.insert(key.clone(), stored.clone());
                }
                (_, None) => {}
            }
        }

        for (key, stored) in persisted.iter() {
            if patch.contains_key(key)
                || !compare::equal_opt(self.record.get(key), previous.record().get(key))
            {
                continue;
            }
            match stored {
                Value::Delete => {
                    self.record.remove(key);
                }
                other => {
                    self.record.insert(key.clone(), other.clone());
                }
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
    fn fork_then_diff_is_empty() {
        let snapshot = Snapshot::new(rec(json!({ "a": 1, "b": ["x"] })));
        let working = snapshot.fork();
        assert!(working.diff(&DiffPolicy::default(), &snapshot).is_empty());
    }

    #[test]
    fn rebase_applies_patch_and_persisted_fields() {
        let snapshot = Snapshot::new(rec(json!({ "a": 1, "b": 2, "legacy": "x" })));
        let patch = Patch::from(rec(json!({ "a": 5, "legacy": { "$delete": true } })));
        let persisted = rec(json!({ "a": 5, "updatedBy": "coordinator" }));

        let next = snapshot.rebase(&patch, &persisted);
        assert_eq!(
            next.record().to_json(),
            json!({ "a": 5, "b": 2, "updatedBy": "coordinator" })
        );
        // The old baseline is untouched.
        assert_eq!(snapshot.record().get("legacy"), Some(&Value::from("x")));
    }

    #[test]
    fn adopt_takes_normalised_values_for_untouched_keys() {
        let mut working = WorkingState::new(rec(json!({
            "phone": "0400000000",
            "suburb": "newtown",
            "legacy": { "$delete": true }
        })));
        let patch = Patch::from(rec(json!({
            "phone": "0400000000",
            "suburb": "newtwn",
            "legacy": { "$delete": true }
        })));
        let persisted = rec(json!({ "phone": "0400 000 000", "suburb": "NEWTWN" }));

        working.adopt(&patch, &persisted, &Snapshot::default());
        assert_eq!(
            working.record().to_json(),
            // suburb was edited again after the patch was taken
            json!({ "phone": "0400 000 000", "suburb": "newtown" })
        );
    }

    #[test]
    fn adopt_takes_returned_fields_outside_the_patch() {
        let previous = Snapshot::new(rec(json!({
            "firstName": "Jo",
            "updatedAt": "t1",
            "revision": 3,
            "note": "old"
        })));
        let mut working = previous.fork();
        working.set(&FieldPath::key("firstName"), Value::from("Sam")).unwrap();
        working.set(&FieldPath::key("note"), Value::from("mine")).unwrap();
        let patch = working.diff(&DiffPolicy::default(), &previous);
        let persisted = rec(json!({
            "firstName": "Sam",
            "updatedAt": "t2",
            "revision": { "$delete": true },
            "note": "theirs"
        }));

        let next = previous.rebase(&patch, &persisted);
        working.adopt(&patch, &persisted, &previous);
        // note was patched and is now what the store returned.
        assert_eq!(
            working.record().to_json(),
            json!({ "firstName": "Sam", "updatedAt": "t2", "note": "theirs" })
        );
        assert!(working.diff(&DiffPolicy::default(), &next).is_empty());
        assert!(working.dirty_fields(&DiffPolicy::default(), &next).is_empty());
    }

    #[test]
    fn adopt_keeps_local_edits_to_returned_fields() {
        let previous = Snapshot::new(rec(json!({ "firstName": "Jo", "status": "draft" })));
        let mut working = previous.fork();
        working.set(&FieldPath::key("firstName"), Value::from("Sam")).unwrap();
        let patch = working.diff(&DiffPolicy::default(), &previous);
        // Edited after the patch was taken.
        working.set(&FieldPath::key("status"), Value::from("ready")).unwrap();

        let persisted = rec(json!({ "firstName": "Sam", "status": "submitted" }));
        working.adopt(&patch, &persisted, &previous);
        assert_eq!(working.get(&FieldPath::key("status")), Some(&Value::from("ready")));
    }

    #[test]
    fn dirty_fields_lists_leaf_paths() {
        let snapshot = Snapshot::new(rec(json!({ "contact": { "phone": "1" } })));
        let mut working = snapshot.fork();
        working
            .set(&FieldPath::parse("contact.phone").unwrap(), Value::from("2"))
            .unwrap();
        let dirty = working.dirty_fields(&DiffPolicy::default(), &snapshot);
        assert_eq!(dirty, vec![FieldPath::parse("contact.phone").unwrap()]);
    }
}
