use std::future::Future;

use formsync_core::Value;

use super::{expect_field, patch, TestResult};
use crate::{RecordStore, StorageError};

pub(super) async fn run_load_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "load",
            "load_unknown_entity_not_found",
            load_unknown_entity_not_found(factory).await,
        ),
        TestResult::from_result(
            "load",
            "load_returns_persisted_fields",
            load_returns_persisted_fields(factory).await,
        ),
        TestResult::from_result(
            "load",
            "entities_are_isolated",
            entities_are_isolated(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

/// Loading an id that was never persisted is EntityNotFound with that id.
async fn load_unknown_entity_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.load("participant-404").await {
        Err(StorageError::EntityNotFound { entity_id }) if entity_id == "participant-404" => Ok(()),
        Err(other) => Err(format!("expected EntityNotFound, got {other}")),
        Ok(record) => Err(format!("expected EntityNotFound, got {}", record.to_json())),
    }
}

/// Fields persisted in one call come back from load.
async fn load_returns_persisted_fields<S, F, Fut>(factory: &F) -> Result<(), String>
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
            ("hours", Value::Int(12)),
            ("skills", Value::from(vec!["first aid"])),
        ]),
    )
    .await
    .map_err(|e| e.to_string())?;

    let record = s.load("participant-1").await.map_err(|e| e.to_string())?;
    expect_field(&record, "firstName", &Value::from("Jo"))?;
    expect_field(&record, "hours", &Value::Int(12))?;
    expect_field(&record, "skills", &Value::from(vec!["first aid"]))?;
    Ok(())
}

/// A write to one entity is invisible to another.
async fn entities_are_isolated<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.persist("participant-1", &patch(&[("firstName", Value::from("Jo"))]))
        .await
        .map_err(|e| e.to_string())?;
    s.persist("participant-2", &patch(&[("firstName", Value::from("Sam"))]))
        .await
        .map_err(|e| e.to_string())?;

    let one = s.load("participant-1").await.map_err(|e| e.to_string())?;
    let two = s.load("participant-2").await.map_err(|e| e.to_string())?;
    expect_field(&one, "firstName", &Value::from("Jo"))?;
    expect_field(&two, "firstName", &Value::from("Sam"))?;
    Ok(())
}
