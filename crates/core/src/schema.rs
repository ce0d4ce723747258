//! Entity schema configuration.
//!
//! A schema declares, once per entity type, the field dependency edges, the
//! wizard steps with the fields they edit, and the diff/cascade policies.
//!
//! # Example
//!
//! ```toml
//! [entity]
//! name = "participant_profile"
//!
//! [[dependencies]]
//! field = "stateId"
//! dependents = ["regionId"]
//!
//! [[dependencies]]
//! field = "regionId"
//! dependents = ["serviceAreaId", "suburbId"]
//!
//! [[steps]]
//! id = "details"
//! fields = ["firstName", "lastName"]
//! required = ["firstName"]
//!
//! [[steps]]
//! id = "location"
//! fields = ["stateId", "regionId", "serviceAreaId", "suburbId"]
//! required = ["stateId", "regionId"]
//!
//! [cascade]
//! clear = "unset"
//!
//! [diff]
//! suppress_blank_text = true
//! suppress_empty_lists = true
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::diff::DiffPolicy;
use crate::error::{GraphError, SchemaError};
use crate::graph::{DependencyEdge, DependencyGraph};
use crate::path::FieldPath;

// ── Types ─────────────────────────────────────────────────────────────────────

/// Top-level entity schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySchema {
    pub entity: EntitySettings,
    #[serde(default)]
    pub dependencies: Vec<DependencyEdge>,
    #[serde(default)]
    pub steps: Vec<StepSchema>,
    #[serde(default)]
    pub cascade: CascadeSettings,
    #[serde(default)]
    pub diff: DiffPolicy,
}

/// `[entity]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySettings {
    pub name: String,
}

/// One `[[steps]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSchema {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Fields edited on this step.
    pub fields: Vec<FieldPath>,
    /// Fields that must be set before leaving the step. Must be a subset
    /// of `fields`.
    #[serde(default)]
    pub required: Vec<FieldPath>,
}

/// `[cascade]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSettings {
    #[serde(default)]
    pub clear: ClearPolicy,
}

/// What happens to a dependent field's value when an upstream changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearPolicy {
    /// Remove the value from the working record. An untouched dependent
    /// then stays out of the next patch.
    #[default]
    Unset,
    /// Replace the value with a deletion marker so the removal is
    /// persisted too.
    Delete,
}

// ── Functions ─────────────────────────────────────────────────────────────────

impl EntitySchema {
    /// Parse and validate a schema from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SchemaError> {
        let schema: EntitySchema = toml::from_str(content)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Build the dependency graph this schema declares.
    pub fn graph(&self) -> Result<DependencyGraph, GraphError> {
        DependencyGraph::new(self.dependencies.iter().cloned())
    }

    pub fn step(&self, id: &str) -> Option<&StepSchema> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Checks:
    /// - the dependency graph is acyclic,
    /// - step ids are unique and non-empty,
    /// - every step edits at least one field,
    /// - every required field is one of the step's fields.
    pub fn validate(&self) -> Result<(), SchemaError> {
        self.graph()?;

        let mut errors = Vec::new();
        let mut ids = BTreeSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                errors.push("step with an empty id".to_string());
            } else if !ids.insert(step.id.as_str()) {
                errors.push(format!("duplicate step id '{}'", step.id));
            }
            if step.fields.is_empty() {
                errors.push(format!("step '{}' declares no fields", step.id));
            }
            for required in &step.required {
                if !step.fields.iter().any(|f| f.is_prefix_of(required)) {
                    errors.push(format!(
                        "step '{}' requires '{}' which is not one of its fields",
                        step.id, required
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(SchemaError::Invalid(errors))
        }
    }
}

/// Read and validate a schema TOML file from `path`.
pub fn read_schema(path: &Path) -> Result<EntitySchema, SchemaError> {
    let content = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    EntitySchema::from_toml_str(&content)
}
