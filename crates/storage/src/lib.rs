//! formsync-storage: the persistence seam.
//!
//! [`RecordStore`] is the only way edits leave the process. [`MemoryStore`]
//! is a complete in-process implementation used by tests and demos, and
//! [`conformance`] checks any backend against the expected semantics.

pub mod conformance;
mod error;
mod memory;
mod traits;

pub use error::StorageError;
pub use memory::{MemoryStore, PersistCall};
pub use traits::RecordStore;
