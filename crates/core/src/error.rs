use std::path::PathBuf;

/// Errors raised while parsing or walking a [`FieldPath`](crate::FieldPath).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// The path string could not be parsed.
    #[error("invalid field path '{path}': {message}")]
    Invalid { path: String, message: String },

    /// A path segment addressed a value of the wrong shape
    /// (a key into a list, an index into a record, anything into a primitive).
    #[error("field path '{path}' crosses a {found} value")]
    TypeMismatch { path: String, found: &'static str },

    /// A list index was neither an existing element nor the append position.
    #[error("field path '{path}': index {index} out of bounds for list of length {len}")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },
}

/// Errors converting external JSON into record values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// A JSON number that fits neither `i64` nor a decimal.
    #[error("unsupported number literal: {0}")]
    UnsupportedNumber(String),

    /// A record was expected at the top level.
    #[error("expected a JSON object for a record, got {0}")]
    NotARecord(&'static str),
}

/// Dependency graph construction errors.
///
/// These are configuration errors: a graph that fails to build is a
/// startup failure, never a runtime condition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A field lists itself as its own dependent.
    #[error("field '{field}' cannot depend on itself")]
    SelfDependency { field: String },

    /// The declared edges contain a cycle. `path` lists the fields on the
    /// cycle, starting and ending with the same field.
    #[error("dependency cycle: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },
}

/// Errors loading an entity schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("could not read '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse schema: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Structural problems in the step declarations.
    #[error("invalid schema: {}", .0.join("; "))]
    Invalid(Vec<String>),
}
