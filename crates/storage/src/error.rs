/// All errors that can be returned by a RecordStore implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// No record exists for the given entity id.
    #[error("entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    /// The store refused the patch (server-side validation, permissions).
    /// Nothing was written.
    #[error("persist rejected for {entity_id}: {reason}")]
    Rejected { entity_id: String, reason: String },

    /// The store could not be reached. The caller may retry.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
