//! Option-list sources for dependent fields.
//!
//! A dependent field (region, suburb) offers a list of choices that depends
//! on the values of its upstream fields. An [`OptionSource`] fetches that
//! list; the [`CascadingFieldController`](crate::CascadingFieldController)
//! decides when to ask and whether the answer is still wanted.

pub mod static_source;

use std::fmt;

use async_trait::async_trait;
use formsync_core::{FieldPath, Record, Value};
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// OptionItem
// ──────────────────────────────────────────────

/// One selectable choice: the value written into the record and the label
/// shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionItem {
    pub value: Value,
    pub label: String,
}

impl OptionItem {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        OptionItem {
            value: value.into(),
            label: label.into(),
        }
    }
}

// ──────────────────────────────────────────────
// OptionError
// ──────────────────────────────────────────────

/// Errors an option source can report. Always recoverable: the field is
/// blocked with this error until options are requested again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// The source does not serve options for this field.
    NotFound { field: String },
    /// The fetch itself failed (network, upstream service, bad payload).
    FetchFailed { field: String, message: String },
}

impl fmt::Display for OptionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionError::NotFound { field } => {
                write!(f, "no option source for field '{}'", field)
            }
            OptionError::FetchFailed { field, message } => {
                write!(f, "fetching options for '{}' failed: {}", field, message)
            }
        }
    }
}

impl std::error::Error for OptionError {}

// ──────────────────────────────────────────────
// OptionSource trait
// ──────────────────────────────────────────────

/// Fetches the option list for ONE field given the values of its direct
/// upstream fields.
///
/// `upstream` holds exactly the field's direct upstreams, keyed by their
/// path string, each set to its current working value.
#[async_trait]
pub trait OptionSource: Send + Sync {
    async fn fetch_options(
        &self,
        field: &FieldPath,
        upstream: &Record,
    ) -> Result<Vec<OptionItem>, OptionError>;
}
