//! Error types for the push-down scan pipeline.
//!
//! Errors fall into four groups:
//! - configuration problems, surfaced before any remote call is made
//! - remote failures (connection, query execution, unload protocol violations)
//! - row conversion failures while decoding staged records
//! - staging I/O failures while listing or reading staged objects
//!
//! A zero-row unload is never an error.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ConnectorError>;

/// Top-level error for relation, scan and unload operations.
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Invalid or missing configuration (source reference, columns, schema).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Opening or closing the remote connection failed.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A statement was rejected or failed on the remote engine.
    #[error("Query failed: {message}")]
    Query { message: String },

    /// The unload confirmation did not have the expected shape.
    #[error("Unload protocol violation: {0}")]
    Protocol(String),

    /// A staged record could not be converted into a typed row.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Listing or opening staged objects failed.
    #[error("Staging error: {0}")]
    Staging(String),

    /// I/O error while reading staged data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error while assembling record batches.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// The scan was cancelled by the caller.
    #[error("Scan was cancelled")]
    Cancelled,
}

impl ConnectorError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query {
            message: msg.into(),
        }
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// Whether this error was caused by malformed staged data rather than
    /// by the remote engine or the configuration.
    pub fn is_conversion(&self) -> bool {
        matches!(self, Self::Conversion(_))
    }
}

/// Errors raised while turning a staged record into a typed row.
///
/// `row` is the zero-based record index within the partition being read,
/// `column` the zero-based field index within the schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The record has a different number of fields than the schema.
    #[error("Row {row}: expected {expected} fields, found {actual}")]
    FieldCount {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// A null sentinel appeared in a non-nullable field.
    #[error("Row {row}, column {column}: NULL value in non-nullable column '{name}'")]
    NullValue {
        row: usize,
        column: usize,
        name: String,
    },

    /// The field text is not a valid literal of the declared type.
    #[error("Row {row}, column {column}: {message}")]
    InvalidValue {
        row: usize,
        column: usize,
        message: String,
    },

    /// A quoted field was never closed.
    #[error("Row {row}: unclosed quote in staged record")]
    UnclosedQuote { row: usize },

    /// The schema declares a type the converter cannot produce.
    #[error("Column '{column}': unsupported data type {data_type}")]
    UnsupportedType { column: String, data_type: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_error_display() {
        let err = ConversionError::InvalidValue {
            row: 3,
            column: 1,
            message: "Invalid integer value 'abc'".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Row 3, column 1: Invalid integer value 'abc'"
        );
    }

    #[test]
    fn test_conversion_error_wraps_transparently() {
        let err: ConnectorError = ConversionError::UnclosedQuote { row: 7 }.into();
        assert!(err.is_conversion());
        assert_eq!(err.to_string(), "Row 7: unclosed quote in staged record");
    }

    #[test]
    fn test_constructors() {
        assert!(matches!(
            ConnectorError::protocol("bad shape"),
            ConnectorError::Protocol(_)
        ));
        assert_eq!(
            ConnectorError::query("boom").to_string(),
            "Query failed: boom"
        );
        assert!(!ConnectorError::Cancelled.is_conversion());
    }
}
