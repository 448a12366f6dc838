//! Filter parsing errors

use thiserror::Error;

/// Errors that can occur while parsing a filter expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Expression is not valid syntax
    #[error("Parse error: {0}")]
    Parse(String),

    /// The same field appears in two conditions
    #[error("Field '{0}' is filtered more than once")]
    DuplicateField(String),
}

/// Result type for query parsing
pub type QueryResult<T> = Result<T, QueryError>;
