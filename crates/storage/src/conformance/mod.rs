//! Conformance test suite for `RecordStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `RecordStore`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Load**: unknown entities, reading back what was persisted
//! - **Persist**: creation, key-wise merge, delete markers, returned fields
//! - **Isolation**: entities never see each other's writes
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use formsync_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn http_store_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_http_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod load;
mod persist;

use std::fmt;
use std::future::Future;

use formsync_core::{Patch, Record, Value};

use crate::RecordStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "load", "persist").
    pub category: String,
    /// Test name (e.g. "persist_creates_unknown_entity").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: RecordStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(load::run_load_tests(&factory).await);
    results.extend(persist::run_persist_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn patch(fields: &[(&str, Value)]) -> Patch {
    Patch::from(
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<Record>(),
    )
}

fn expect_field(record: &Record, key: &str, expected: &Value) -> Result<(), String> {
    match record.get(key) {
        Some(actual) if actual == expected => Ok(()),
        Some(actual) => Err(format!(
            "field '{key}': expected {}, got {}",
            expected.to_json(),
            actual.to_json()
        )),
        None => Err(format!("field '{key}': expected {}, got nothing", expected.to_json())),
    }
}
