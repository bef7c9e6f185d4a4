//! Public error taxonomy for the snippet store.
//!
//! Every operation that cannot complete its full contract returns one of these;
//! the presentation layer can tell "nothing found" apart from "operation
//! failed". `IndexStale` is the one deliberately non-fatal variant: the row
//! write stands, only the search index entry is pending repair.

use crate::database::DatabaseError;
use crate::indexer::IndexerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed or missing required input; the caller must fix the input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation targeted an id that does not exist.
    #[error("snippet not found: {id}")]
    NotFound { id: String },

    /// Contract violation on caller-supplied arguments (e.g. page/limit < 1).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The caller dropped or timed out the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying persistence failure. Not retried automatically.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Index write failed after the row write succeeded. The row is retained
    /// and flagged for repair via `reindex_all`; treat as a warning.
    #[error("search index write failed for snippet {id}; row retained, entry marked stale")]
    IndexStale { id: String },
}

impl From<DatabaseError> for StoreError {
    fn from(e: DatabaseError) -> Self {
        StoreError::Storage(e.to_string())
    }
}

impl From<IndexerError> for StoreError {
    fn from(e: IndexerError) -> Self {
        StoreError::Storage(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
