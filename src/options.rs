//! Options of a staged relation.

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};
use crate::export::staging::StagingArea;
use crate::query::select::TableSource;
use crate::query::unload::{Compression, DEFAULT_MAX_FILE_SIZE};
use crate::reader::partition::DEFAULT_BATCH_SIZE;

/// Options for reading a remote relation through staging.
///
/// Exactly one of `table` and `query` must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorOptions {
    /// Table to read (optionally qualified, used verbatim)
    pub table: Option<String>,
    /// Query to read, used as a sub-query
    pub query: Option<String>,
    /// Gzip staged files (default: true)
    pub compress: bool,
    /// Upper bound for one staged file in bytes (default: 10_000_000)
    pub max_file_size: u64,
    /// Keep column names as given instead of upper-casing them (default: false)
    pub keep_column_case: bool,
    /// `;`-separated statements run before the main statement; `%s` is
    /// replaced by the table name or sub-query
    pub pre_actions: String,
    /// `;`-separated statements run after the main statement
    pub post_actions: String,
    /// Pin the session output formats before unloading (default: true)
    pub use_session_prologue: bool,
    /// Number of rows per RecordBatch (default: 1024)
    pub batch_size: usize,
    /// Root URI below which each scan stages its files
    pub staging_root: Option<String>,
}

impl Default for ConnectorOptions {
    fn default() -> Self {
        Self {
            table: None,
            query: None,
            compress: true,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            keep_column_case: false,
            pre_actions: String::new(),
            post_actions: String::new(),
            use_session_prologue: true,
            batch_size: DEFAULT_BATCH_SIZE,
            staging_root: None,
        }
    }
}

impl ConnectorOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads from a table.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Reads from the result of a query.
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    #[must_use]
    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    #[must_use]
    pub fn with_keep_column_case(mut self, keep: bool) -> Self {
        self.keep_column_case = keep;
        self
    }

    #[must_use]
    pub fn with_pre_actions(mut self, actions: impl Into<String>) -> Self {
        self.pre_actions = actions.into();
        self
    }

    #[must_use]
    pub fn with_post_actions(mut self, actions: impl Into<String>) -> Self {
        self.post_actions = actions.into();
        self
    }

    #[must_use]
    pub fn with_session_prologue(mut self, enabled: bool) -> Self {
        self.use_session_prologue = enabled;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_staging_root(mut self, root: impl Into<String>) -> Self {
        self.staging_root = Some(root.into());
        self
    }

    /// The relation's source.
    ///
    /// # Errors
    /// `ConnectorError::Config` unless exactly one of `table` and `query` is set
    /// and non-blank.
    pub fn source(&self) -> Result<TableSource> {
        let source = match (&self.table, &self.query) {
            (Some(table), None) => TableSource::Table(table.clone()),
            (None, Some(query)) => TableSource::Query(query.clone()),
            (Some(_), Some(_)) => {
                return Err(ConnectorError::config(
                    "only one of 'table' and 'query' may be set",
                ))
            }
            (None, None) => {
                return Err(ConnectorError::config(
                    "a table name or a query must be provided",
                ))
            }
        };
        source.validate()?;
        Ok(source)
    }

    /// The staging area scans unload into.
    ///
    /// # Errors
    /// `ConnectorError::Config` if no staging root is configured.
    pub fn staging_area(&self) -> Result<StagingArea> {
        let root = self
            .staging_root
            .as_deref()
            .ok_or_else(|| ConnectorError::config("'staging_root' is required for staged scans"))?;
        StagingArea::new(root)
    }

    pub fn compression(&self) -> Compression {
        Compression::from_flag(self.compress)
    }

    /// Validates option values that do not depend on the remote.
    pub fn validate(&self) -> Result<()> {
        self.source()?;
        if self.batch_size == 0 {
            return Err(ConnectorError::config("'batch_size' must be positive"));
        }
        if self.max_file_size == 0 {
            return Err(ConnectorError::config("'max_file_size' must be positive"));
        }
        Ok(())
    }
}
