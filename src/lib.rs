//! # stagescan
//!
//! Push-down scan connector that reads remote SQL tables through bulk
//! object-storage unloads.
//!
//! Instead of streaming a result set over the wire, a scan asks the remote
//! engine to unload the projected and filtered rows as delimited files into a
//! staging area, then decodes those files into Apache Arrow record batches,
//! one partition per staged file.
//!
//! ## Features
//!
//! - **Projection push-down**: only the requested columns are unloaded
//! - **Filter push-down**: supported predicates become a WHERE clause; the
//!   rest are reported back for local evaluation
//! - **Count fast path**: column-less scans run a single `count(*)`
//! - **Partitioned reads**: every staged file is decoded lazily and
//!   independently, gzip or plain
//! - **Cancellation**: an in-flight remote statement is abandoned and its
//!   connection closed when the scan is cancelled
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stagescan::{
//!     ConnectionFactory, ConnectorOptions, LocalStagedFiles, Predicate, ScanRequest,
//!     StagedRelation, Value,
//! };
//!
//! # async fn example(factory: Arc<dyn ConnectionFactory>) -> Result<(), Box<dyn std::error::Error>> {
//! let options = ConnectorOptions::new()
//!     .with_table("SALES.ORDERS")
//!     .with_staging_root("file:///var/stage");
//! let files = Arc::new(LocalStagedFiles::new("file:///var/stage", "/var/stage"));
//!
//! let relation = StagedRelation::builder(options, factory, files).build()?;
//!
//! let request = ScanRequest::columns(["ID", "AMOUNT"])
//!     .with_filter(Predicate::gt("AMOUNT", Value::Int64(100)));
//! let scan = relation.build_scan(&request).await?;
//!
//! for index in 0..scan.num_partitions() {
//!     let mut rows = scan.open_partition(index).await?;
//!     while let Some(batch) = rows.next_batch().await? {
//!         println!("Rows: {}", batch.num_rows());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

// Module declarations
pub mod connection;
pub mod error;
pub mod export;
pub mod options;
pub mod query;
pub mod reader;
pub mod relation;
pub mod types;

// =============================================================================
// Relation
// =============================================================================

/// Re-export the scan entry point.
pub use relation::{
    ScanDiagnostics, ScanKind, ScanRequest, ScanResult, SchemaResolver, StagedRelation,
    StagedRelationBuilder,
};

/// Re-export connector options.
pub use options::ConnectorOptions;

// =============================================================================
// Connections
// =============================================================================

pub use connection::{
    with_connection, ColumnMetadata, ConnectionFactory, RemoteConnection, ResultSet,
};

// =============================================================================
// Error Types
// =============================================================================

/// Re-export error types for convenient error handling.
pub use error::{ConnectorError, ConversionError, Result};

// =============================================================================
// Type System
// =============================================================================

pub use types::{RemoteType, TypeMapper, TypedRow, Value};

// =============================================================================
// Query Builder Types
// =============================================================================

/// Predicates and the SQL built from them.
///
/// # Unload Query Example
///
/// ```
/// use stagescan::query::{Compression, UnloadQuery};
///
/// let sql = UnloadQuery::new("SELECT \"ID\" FROM ORDERS")
///     .to_location("s3://bucket/stage/0001/")
///     .compressed(Compression::None)
///     .build();
/// assert!(sql.starts_with("COPY INTO 's3://bucket/stage/0001/'"));
/// ```
pub use query::{Compression, Predicate, TableSource, UnloadQuery, WhereClause};

// =============================================================================
// Staging
// =============================================================================

pub use export::{
    CredentialProvider, StagingArea, StagingLocation, StaticCredentials, StorageCredentials,
};
pub use reader::{LocalStagedFiles, PartitionReader, RowStream, StagedFileSource, StagedPartition};

/// Tokio runtime used by the blocking entry points.
pub use connection::blocking_runtime;
