//! Storage engine error types
//!
//! Defines all errors that can occur in the storage layer.

use crate::storage::types::ValueKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur in the event store
#[derive(Error, Debug)]
pub enum StoreError {
    /// I/O operation failed
    #[error("IO error during {op} on {path:?}: {source}")]
    Io {
        path: PathBuf,
        op: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Stored text could not be converted back to its typed value
    #[error("Parse error in {path:?}: {text:?} is not a valid {kind}")]
    Parse {
        path: PathBuf,
        kind: &'static str,
        text: String,
    },

    /// Event id outside the assigned range
    #[error("Event not found: {0}")]
    NotFound(u64),

    /// A value's kind conflicts with the field's established type tag
    #[error("Type mismatch on field '{field}': established as {established}, got {attempted}")]
    TypeMismatch {
        field: String,
        established: ValueKind,
        attempted: ValueKind,
    },

    /// Average over a field with no numeric rows
    #[error("No numeric rows to aggregate for field '{0}'")]
    EmptyAggregate(String),

    /// Field name cannot be mapped to a column file
    #[error("Invalid field name {field:?}: {reason}")]
    InvalidField { field: String, reason: &'static str },

    /// Value cannot be written without breaking row boundaries
    #[error("Value for field '{field}' cannot be stored: {reason}")]
    UnencodableValue { field: String, reason: &'static str },

    /// Structural inconsistency detected in a log
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// A failed save could not be undone; saves are refused until reopen
    #[error("Store must be reopened: {0}")]
    Poisoned(String),

    /// Operation attempted after close
    #[error("Store is closed")]
    Closed,
}

impl StoreError {
    /// Build a `map_err` adapter that tags an I/O error with its path and operation
    pub fn io(path: &Path, op: &'static str) -> impl FnOnce(std::io::Error) -> StoreError {
        let path = path.to_path_buf();
        move |source| StoreError::Io { path, op, source }
    }
}

/// Result type alias for storage operations
pub type StoreResult<T> = Result<T, StoreError>;
