//! formsync-core: record values, structural diffing and field dependency
//! graphs.
//!
//! This crate holds the pure, synchronous half of formsync. It has no
//! notion of stores, option sources or wizard navigation; those live in
//! `formsync-storage` and `formsync-session`.
//!
//! # Public API
//!
//! - [`Value`] / [`Record`] -- field values; absence is a missing key
//! - [`FieldPath`] -- dotted/indexed paths into a record
//! - [`compare::equal`] -- strict structural equality
//! - [`diff()`] / [`diff_with`] / [`diff_fields`] -- sparse [`Patch`]es
//! - [`Snapshot`] / [`WorkingState`] -- persisted baseline and edit buffer
//! - [`DependencyGraph`] -- validated, acyclic field dependencies
//! - [`EntitySchema`] -- TOML configuration per entity type

pub mod compare;
pub mod diff;
pub mod error;
pub mod graph;
pub mod path;
pub mod schema;
pub mod snapshot;
pub mod value;

// ── Convenience re-exports ───────────────────────────────────────────

pub use diff::{changed_paths, diff, diff_fields, diff_with, DiffPolicy, Patch};
pub use error::{GraphError, PathError, SchemaError, ValueError};
pub use graph::{DependencyEdge, DependencyGraph};
pub use path::{FieldPath, Segment};
pub use schema::{
    read_schema, CascadeSettings, ClearPolicy, EntitySchema, EntitySettings, StepSchema,
};
pub use snapshot::{Snapshot, WorkingState};
pub use value::{Record, Value, DELETE_MARKER_KEY};
