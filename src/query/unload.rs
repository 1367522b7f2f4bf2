//! Unload query builder for generating COPY INTO statements.
//!
//! The file format clause is fixed: the record converter in
//! [`crate::reader::record`] parses exactly this dialect (pipe-delimited,
//! optionally double-quoted fields, unquoted empty field as NULL).

use crate::export::staging::StorageCredentials;

/// Field delimiter written by the remote engine.
pub const FIELD_DELIMITER: char = '|';

/// Quote character used for fields that need enclosing.
pub const FIELD_QUOTE: char = '"';

/// Default upper bound for a single staged file, in bytes.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10_000_000;

/// Compression applied to staged files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Gzip compression (.gz extension)
    #[default]
    Gzip,
    /// No compression
    None,
}

impl Compression {
    /// Get the SQL representation of the compression type.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::None => "none",
        }
    }

    /// Get the file extension for the compression type.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::Gzip => ".gz",
            Compression::None => "",
        }
    }

    pub fn from_flag(compress: bool) -> Self {
        if compress {
            Compression::Gzip
        } else {
            Compression::None
        }
    }
}

/// Builder for constructing COPY INTO unload statements.
///
/// Building is pure: the same inputs always yield the same text.
#[derive(Debug, Clone)]
pub struct UnloadQuery {
    /// SELECT whose result is unloaded.
    query: String,
    /// Staging URI the files are written to.
    location: String,
    /// Credentials clause source (optional).
    credentials: Option<StorageCredentials>,
    /// Compression type.
    compression: Compression,
    /// Maximum size of one staged file, in bytes.
    max_file_size: u64,
}

impl UnloadQuery {
    /// Create an unload statement for the given SELECT.
    ///
    /// # Arguments
    ///
    /// * `query` - The SQL query whose results to unload.
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            location: String::new(),
            credentials: None,
            compression: Compression::default(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    /// Set the staging URI the remote engine writes into.
    #[must_use]
    pub fn to_location(mut self, uri: &str) -> Self {
        self.location = uri.to_string();
        self
    }

    /// Set the credentials clause. `None` omits the clause.
    #[must_use]
    pub fn credentials(mut self, credentials: Option<StorageCredentials>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set the compression type.
    #[must_use]
    pub fn compressed(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Set the maximum size of a single staged file.
    #[must_use]
    pub fn max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Build the COPY INTO statement, including any secrets.
    pub fn build(&self) -> String {
        self.render(self.credentials.as_ref().map(ToString::to_string))
    }

    /// Build the statement with credential secrets masked, for logging.
    pub fn build_redacted(&self) -> String {
        self.render(self.credentials.as_ref().map(StorageCredentials::redacted))
    }

    fn render(&self, credentials: Option<String>) -> String {
        let mut sql = String::new();

        sql.push_str("COPY INTO '");
        sql.push_str(&self.location);
        sql.push_str("' FROM (");
        sql.push_str(&self.query);
        sql.push(')');

        if let Some(clause) = credentials {
            sql.push(' ');
            sql.push_str(&clause);
        }

        sql.push_str(" FILE_FORMAT=(TYPE=CSV COMPRESSION='");
        sql.push_str(self.compression.as_sql());
        sql.push_str("' FIELD_DELIMITER='");
        sql.push(FIELD_DELIMITER);
        sql.push_str("' FIELD_OPTIONALLY_ENCLOSED_BY='");
        sql.push(FIELD_QUOTE);
        sql.push_str("' NULL_IF=())");

        sql.push_str(" MAX_FILE_SIZE=");
        sql.push_str(&self.max_file_size.to_string());

        sql
    }
}
