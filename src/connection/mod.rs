//! Remote connection abstraction.
//!
//! The connector never talks to a network driver directly. A
//! [`ConnectionFactory`] hands out [`RemoteConnection`]s, and every use of a
//! connection goes through [`scope::with_connection`], which guarantees the
//! connection is closed on success, failure and cancellation.

pub mod scope;

use async_trait::async_trait;

use crate::error::Result;
use crate::query::select::{build_describe_query, TableSource};

pub use scope::{blocking_runtime, with_connection, ConnectionOp};

/// Metadata of one result column as reported by the remote driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMetadata {
    pub name: String,
    /// Remote type name without parameters, e.g. `NUMBER` or `TIMESTAMP_LTZ`.
    pub type_name: String,
    pub precision: Option<u8>,
    pub scale: Option<i8>,
    pub nullable: bool,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            precision: None,
            scale: None,
            nullable: true,
        }
    }

    #[must_use]
    pub fn with_precision(mut self, precision: u8, scale: i8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// A fully materialized query result in text form.
///
/// Only small results (metadata probes, unload confirmations, counts) travel
/// through this type; bulk data goes through staging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnMetadata>, rows: Vec<Vec<Option<String>>>) -> Self {
        Self { columns, rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// The text of a cell, `None` for SQL NULL or out-of-range indices.
    pub fn value(&self, row: usize, column: usize) -> Option<&str> {
        self.rows.get(row)?.get(column)?.as_deref()
    }
}

/// An open session on the remote engine.
#[async_trait]
pub trait RemoteConnection: Send {
    /// Executes a statement whose result is not needed.
    async fn execute(&mut self, sql: &str) -> Result<()>;

    /// Executes a statement and returns its result.
    async fn execute_query(&mut self, sql: &str) -> Result<ResultSet>;

    /// Releases the session. Called exactly once per connection.
    async fn close(&mut self) -> Result<()>;

    /// Reads the column metadata of `source` with a zero-row probe.
    async fn describe(&mut self, source: &TableSource) -> Result<Vec<ColumnMetadata>> {
        let result = self.execute_query(&build_describe_query(source)).await?;
        Ok(result.columns)
    }
}

/// Opens new remote connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RemoteConnection>>;
}
