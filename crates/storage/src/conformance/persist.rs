use std::future::Future;

use formsync_core::Value;

use super::{expect_field, patch, TestResult};
use crate::RecordStore;

pub(super) async fn run_persist_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "persist",
            "persist_creates_unknown_entity",
            persist_creates_unknown_entity(factory).await,
        ),
        TestResult::from_result(
            "persist",
            "persist_merges_with_existing_fields",
            persist_merges_with_existing_fields(factory).await,
        ),
        TestResult::from_result(
            "persist",
            "delete_marker_removes_field",
            delete_marker_removes_field(factory).await,
        ),
        TestResult::from_result(
            "persist",
            "persist_returns_written_fields",
            persist_returns_written_fields(factory).await,
        ),
        TestResult::from_result(
            "persist",
            "last_write_wins",
            last_write_wins(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

/// Persisting to an id the store has never seen creates the entity.
async fn persist_creates_unknown_entity<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.persist("participant-1", &patch(&[("stateId", Value::from("NSW-1"))]))
        .await
        .map_err(|e| format!("persist: {e}"))?;
    s.load("participant-1")
        .await
        .map(|_| ())
        .map_err(|e| format!("load after persist: {e}"))
}

/// Keys outside the patch keep their stored values.
async fn persist_merges_with_existing_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.persist(
        "participant-1",
        &patch(&[
            ("firstName", Value::from("Jo")),
            ("lastName", Value::from("Bloggs")),
        ]),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.persist("participant-1", &patch(&[("lastName", Value::from("Blogs"))]))
        .await
        .map_err(|e| e.to_string())?;

    let record = s.load("participant-1").await.map_err(|e| e.to_string())?;
    expect_field(&record, "firstName", &Value::from("Jo"))?;
    expect_field(&record, "lastName", &Value::from("Blogs"))?;
    Ok(())
}

/// A Delete marker removes the key from the stored record.
async fn delete_marker_removes_field<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.persist(
        "participant-1",
        &patch(&[
            ("regionId", Value::from("R-1")),
            ("suburbId", Value::from("S-1")),
        ]),
    )
    .await
    .map_err(|e| e.to_string())?;
    s.persist("participant-1", &patch(&[("suburbId", Value::Delete)]))
        .await
        .map_err(|e| e.to_string())?;

    let record = s.load("participant-1").await.map_err(|e| e.to_string())?;
    if record.contains_key("suburbId") {
        return Err(format!(
            "expected suburbId to be removed, got {}",
            record.to_json()
        ));
    }
    expect_field(&record, "regionId", &Value::from("R-1"))
}

/// The returned record names every patched key.
async fn persist_returns_written_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let written = s
        .persist(
            "participant-1",
            &patch(&[
                ("firstName", Value::from("Jo")),
                ("legacyId", Value::Delete),
            ]),
        )
        .await
        .map_err(|e| e.to_string())?;

    for key in ["firstName", "legacyId"] {
        if !written.contains_key(key) {
            return Err(format!(
                "returned fields missing '{key}': {}",
                written.to_json()
            ));
        }
    }
    Ok(())
}

/// Two sequential writes to the same key keep the second.
async fn last_write_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for value in ["VIC-1", "NSW-1"] {
        s.persist("participant-1", &patch(&[("stateId", Value::from(value))]))
            .await
            .map_err(|e| e.to_string())?;
    }
    let record = s.load("participant-1").await.map_err(|e| e.to_string())?;
    expect_field(&record, "stateId", &Value::from("NSW-1"))
}
