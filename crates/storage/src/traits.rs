use async_trait::async_trait;
use formsync_core::{Patch, Record};

use crate::error::StorageError;

/// The persistence trait for formsync backends.
///
/// A `RecordStore` holds one [`Record`] per entity id and accepts sparse
/// [`Patch`]es against it.
///
/// ## Patch Semantics
///
/// `persist` merges the patch into the stored record key by key:
///
/// - a regular value replaces the stored value for that key,
/// - a [`Value::Delete`](formsync_core::Value::Delete) marker removes the key,
/// - keys not named in the patch are left untouched.
///
/// Persisting to an entity id the store has never seen creates it.
///
/// ## Returned Fields
///
/// On success `persist` returns the fields as written. A backend that
/// normalises values (trimming, canonical casing, formatting) returns the
/// normalised value, and may add fields it maintains itself (audit columns,
/// computed fields). Deleted keys come back as `Delete` markers. Callers
/// treat every returned field as authoritative.
///
/// ## Failure
///
/// A failed `persist` writes nothing. The caller keeps its edits and may
/// retry with the same patch.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` so a store can be shared behind an
/// `Arc` by every session editing entities of one type.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read the full stored record.
    ///
    /// Returns `Err(StorageError::EntityNotFound)` if nothing was ever
    /// persisted for `entity_id`.
    async fn load(&self, entity_id: &str) -> Result<Record, StorageError>;

    /// Merge `patch` into the stored record and return the written fields.
    async fn persist(&self, entity_id: &str, patch: &Patch) -> Result<Record, StorageError>;
}
