//! In-process [`RecordStore`].

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use formsync_core::{Patch, Record, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::traits::RecordStore;

type Normaliser = Box<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// One `persist` call as the store received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistCall {
    pub entity_id: String,
    pub patch: Patch,
}

#[derive(Default)]
struct Inner {
    records: BTreeMap<String, Record>,
    versions: BTreeMap<String, u64>,
    calls: Vec<PersistCall>,
    failures: VecDeque<StorageError>,
}

/// A [`RecordStore`] backed by a map in memory.
///
/// Besides plain storage it records every `persist` call, can be told to
/// fail the next calls, and can normalise written values the way a real
/// backend would.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    normaliser: Option<Normaliser>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewrite every written value with `f(key, value)` before storing it.
    pub fn with_normaliser(
        mut self,
        f: impl Fn(&str, &Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.normaliser = Some(Box::new(f));
        self
    }

    /// Seed a stored record without going through `persist`.
    pub async fn insert(&self, entity_id: impl Into<String>, record: Record) {
        let entity_id = entity_id.into();
        let mut inner = self.inner.lock().await;
        *inner.versions.entry(entity_id.clone()).or_insert(0) += 1;
        inner.records.insert(entity_id, record);
    }

    /// Make the next `persist` call fail with `error`. Queued failures are
    /// consumed in order.
    pub async fn fail_next(&self, error: StorageError) {
        self.inner.lock().await.failures.push_back(error);
    }

    /// Every `persist` call so far, failed ones included.
    pub async fn persist_calls(&self) -> Vec<PersistCall> {
        self.inner.lock().await.calls.clone()
    }

    /// Number of successful writes to `entity_id`, seeding included.
    pub async fn version(&self, entity_id: &str) -> u64 {
        self.inner
            .lock()
            .await
            .versions
            .get(entity_id)
            .copied()
            .unwrap_or(0)
    }

    /// The stored record, if any.
    pub async fn get(&self, entity_id: &str) -> Option<Record> {
        self.inner.lock().await.records.get(entity_id).cloned()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn load(&self, entity_id: &str) -> Result<Record, StorageError> {
        self.inner
            .lock()
            .await
            .records
            .get(entity_id)
            .cloned()
            .ok_or_else(|| StorageError::EntityNotFound {
                entity_id: entity_id.to_string(),
            })
    }

    async fn persist(&self, entity_id: &str, patch: &Patch) -> Result<Record, StorageError> {
        let mut inner = self.inner.lock().await;
        inner.calls.push(PersistCall {
            entity_id: entity_id.to_string(),
            patch: patch.clone(),
        });
        if let Some(err) = inner.failures.pop_front() {
            debug!(target: "formsync.storage", entity_id, error = %err, "injected persist failure");
            return Err(err);
        }

        let mut written = Record::new();
        for (key, value) in patch.iter() {
            let stored = match (value, &self.normaliser) {
                (Value::Delete, _) => Value::Delete,
                (v, Some(normalise)) => normalise(key, v),
                (v, None) => v.clone(),
            };
            written.insert(key.clone(), stored);
        }

        let record = inner.records.entry(entity_id.to_string()).or_default();
        for (key, value) in written.iter() {
            if matches!(value, Value::Delete) {
                record.remove(key);
            } else {
                record.insert(key.clone(), value.clone());
            }
        }
        let version = inner.versions.entry(entity_id.to_string()).or_insert(0);
        *version += 1;

        debug!(
            target: "formsync.storage",
            entity_id,
            fields = written.len(),
            version = *version,
            "persisted patch"
        );
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn memory_store_conformance() {
        let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
        assert!(report.failed == 0, "{report}");
        assert!(report.total > 0);
    }

    #[tokio::test]
    async fn injected_failures_write_nothing() {
        let store = MemoryStore::new();
        store
            .fail_next(StorageError::Unavailable {
                message: "connection reset".into(),
            })
            .await;

        let patch = Patch::from(Record::new().with("firstName", "Jo"));
        let err = store.persist("p-1", &patch).await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable { .. }));
        assert!(store.get("p-1").await.is_none());
        assert_eq!(store.version("p-1").await, 0);

        // The queue is drained; the retry goes through.
        store.persist("p-1", &patch).await.unwrap();
        assert_eq!(store.version("p-1").await, 1);
        assert_eq!(store.persist_calls().await.len(), 2);
    }

    #[tokio::test]
    async fn normaliser_rewrites_written_values() {
        let store = MemoryStore::new().with_normaliser(|key, value| match (key, value) {
            ("suburb", Value::Text(s)) => Value::from(s.to_uppercase()),
            (_, v) => v.clone(),
        });
        let patch = Patch::from(
            Record::new()
                .with("suburb", "newtown")
                .with("postcode", "2042"),
        );
        let written = store.persist("p-1", &patch).await.unwrap();
        assert_eq!(written.get("suburb"), Some(&Value::from("NEWTOWN")));
        assert_eq!(written.get("postcode"), Some(&Value::from("2042")));
        assert_eq!(
            store.load("p-1").await.unwrap().get("suburb"),
            Some(&Value::from("NEWTOWN"))
        );
    }
}
