//! The scan entry point: a remote relation read through staging.
//!
//! # Scan flow
//!
//! 1. Resolve the relation schema (cached per relation)
//! 2. Split the filters into pushable and unhandled ones
//! 3. With no required columns, run a COUNT and return column-less rows
//! 4. Otherwise unload the projection into a fresh staging location
//! 5. Zero unloaded rows short-circuit to an empty scan; otherwise every
//!    staged file becomes one lazily decoded partition

pub mod schema;

use std::fmt;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Schema, SchemaRef};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connection::{blocking_runtime, with_connection, ConnectionFactory};
use crate::error::{ConnectorError, Result};
use crate::export::staging::{CredentialProvider, StagingLocation, StaticCredentials};
use crate::export::unload::{parse_actions, run_count, run_unload, SessionActions};
use crate::options::ConnectorOptions;
use crate::query::filter::{build_where_clause, unhandled_filters, FilterDialect};
use crate::query::predicate::{lookup_column, Predicate};
use crate::query::select::{build_count_query, build_projection_query, TableSource};
use crate::query::unload::UnloadQuery;
use crate::reader::partition::RowStream;
use crate::reader::source::{StagedFileSource, StagedPartition};
use crate::types::TypedRow;

pub use schema::{schema_from_columns, validate_schema, SchemaResolver};

/// What a scan must produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    /// Output columns, in output order. Empty means only rows are counted.
    pub required_columns: Vec<String>,
    /// Conjunctive filters.
    pub filters: Vec<Predicate>,
}

impl ScanRequest {
    pub fn new(required_columns: Vec<String>, filters: Vec<Predicate>) -> Self {
        Self {
            required_columns,
            filters,
        }
    }

    /// A request for the given columns without filters.
    pub fn columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_columns: columns.into_iter().map(Into::into).collect(),
            filters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }
}

/// Statements a scan ran, for inspection and logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanDiagnostics {
    /// The SELECT (or COUNT) pushed to the remote.
    pub select_sql: String,
    /// The unload statement with secrets masked; `None` for count scans.
    pub unload_sql: Option<String>,
    /// Rows unloaded or counted.
    pub row_count: u64,
}

/// Shape of a scan's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanKind {
    /// Nothing was unloaded; no staged files were listed.
    Empty,
    /// Column-less rows from a count query.
    Count { rows: u64 },
    /// Staged files, one partition each.
    Staged {
        location: StagingLocation,
        partitions: Vec<StagedPartition>,
    },
}

/// A planned scan whose partitions can be read independently.
pub struct ScanResult {
    schema: SchemaRef,
    kind: ScanKind,
    residual_filters: Vec<Predicate>,
    diagnostics: ScanDiagnostics,
    files: Arc<dyn StagedFileSource>,
    batch_size: usize,
}

impl fmt::Debug for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanResult")
            .field("schema", &self.schema)
            .field("kind", &self.kind)
            .field("residual_filters", &self.residual_filters)
            .field("diagnostics", &self.diagnostics)
            .finish_non_exhaustive()
    }
}

impl ScanResult {
    /// Schema of the produced rows (the required columns, in request order).
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    pub fn kind(&self) -> &ScanKind {
        &self.kind
    }

    pub fn diagnostics(&self) -> &ScanDiagnostics {
        &self.diagnostics
    }

    /// Filters that were not pushed down and still have to be applied to the
    /// returned rows.
    pub fn residual_filters(&self) -> &[Predicate] {
        &self.residual_filters
    }

    /// The staged files backing this scan; empty for count and empty scans.
    pub fn partitions(&self) -> &[StagedPartition] {
        match &self.kind {
            ScanKind::Staged { partitions, .. } => partitions.as_slice(),
            ScanKind::Empty | ScanKind::Count { .. } => &[],
        }
    }

    pub fn num_partitions(&self) -> usize {
        match &self.kind {
            ScanKind::Empty => 0,
            ScanKind::Count { .. } => 1,
            ScanKind::Staged { partitions, .. } => partitions.len(),
        }
    }

    /// Opens partition `index` for reading.
    ///
    /// Partitions share no state; each may be opened (and re-opened) on its
    /// own task.
    pub async fn open_partition(&self, index: usize) -> Result<RowStream> {
        match &self.kind {
            ScanKind::Count { rows } if index == 0 => Ok(RowStream::counted(
                Arc::clone(&self.schema),
                *rows,
                self.batch_size,
            )),
            ScanKind::Staged { partitions, .. } if index < partitions.len() => {
                let input = self.files.open(&partitions[index]).await?;
                Ok(RowStream::staged(
                    input,
                    Arc::clone(&self.schema),
                    self.batch_size,
                ))
            }
            _ => Err(ConnectorError::config(format!(
                "partition {index} out of range ({} partitions)",
                self.num_partitions()
            ))),
        }
    }

    /// Reads every partition in order into memory.
    pub async fn collect_rows(&self) -> Result<Vec<TypedRow>> {
        let mut rows = Vec::new();
        for index in 0..self.num_partitions() {
            rows.extend(self.open_partition(index).await?.collect_rows().await?);
        }
        Ok(rows)
    }

    /// Reads every partition in order as record batches.
    pub async fn collect_batches(&self) -> Result<Vec<RecordBatch>> {
        let mut batches = Vec::new();
        for index in 0..self.num_partitions() {
            let mut stream = self.open_partition(index).await?;
            while let Some(batch) = stream.next_batch().await? {
                batches.push(batch);
            }
        }
        Ok(batches)
    }
}

/// A remote table or query exposed as a scannable relation.
pub struct StagedRelation {
    source: TableSource,
    options: ConnectorOptions,
    factory: Arc<dyn ConnectionFactory>,
    credentials: Arc<dyn CredentialProvider>,
    files: Arc<dyn StagedFileSource>,
    resolver: SchemaResolver,
}

impl StagedRelation {
    pub fn builder(
        options: ConnectorOptions,
        factory: Arc<dyn ConnectionFactory>,
        files: Arc<dyn StagedFileSource>,
    ) -> StagedRelationBuilder {
        StagedRelationBuilder {
            options,
            factory,
            files,
            credentials: None,
            schema: None,
        }
    }

    pub fn source(&self) -> &TableSource {
        &self.source
    }

    pub fn options(&self) -> &ConnectorOptions {
        &self.options
    }

    /// The relation schema, resolved on first use.
    pub async fn schema(&self) -> Result<SchemaRef> {
        self.resolver.resolve(&CancellationToken::new()).await
    }

    /// Filters that cannot be pushed down to the remote.
    pub async fn unhandled_filters(&self, filters: &[Predicate]) -> Result<Vec<Predicate>> {
        let schema = self.schema().await?;
        Ok(unhandled_filters(&schema, filters, self.filter_dialect()))
    }

    pub async fn build_scan(&self, request: &ScanRequest) -> Result<ScanResult> {
        self.build_scan_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Plans and executes the remote side of a scan.
    ///
    /// When `cancel` fires, the in-flight remote call is abandoned, the
    /// connection is closed and `ConnectorError::Cancelled` is returned.
    pub async fn build_scan_with_cancel(
        &self,
        request: &ScanRequest,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        let schema = self.resolver.resolve(cancel).await?;
        let projected = Arc::new(project(&schema, &request.required_columns)?);

        let keep_case = self.options.keep_column_case;
        let dialect = self.filter_dialect();
        let where_clause = build_where_clause(&schema, &request.filters, dialect);
        let residual_filters = unhandled_filters(&schema, &request.filters, dialect);
        debug!(
            pushed = where_clause.conditions().len(),
            residual = residual_filters.len(),
            "Translated scan filters"
        );

        let actions = SessionActions {
            prologue: self.options.use_session_prologue,
            pre: parse_actions(&self.options.pre_actions, &self.source),
            post: parse_actions(&self.options.post_actions, &self.source),
        };

        if projected.fields().is_empty() {
            let count_sql = build_count_query(&self.source, &where_clause);
            debug!(sql = %count_sql, "Counting rows without staging");

            let sql = count_sql.clone();
            let rows = with_connection(self.factory.as_ref(), cancel, move |conn| {
                Box::pin(async move { run_count(conn, &sql, &actions).await })
            })
            .await?;

            return Ok(self.result(
                projected,
                ScanKind::Count { rows },
                residual_filters,
                ScanDiagnostics {
                    select_sql: count_sql,
                    unload_sql: None,
                    row_count: rows,
                },
            ));
        }

        let columns: Vec<String> = projected
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        let select_sql =
            build_projection_query(&self.source, &columns, &where_clause, keep_case)?;
        debug!(sql = %select_sql, "Built projection query");

        let location = self.options.staging_area()?.allocate();
        let credentials = self.credentials.credentials(&location).await?;
        let unload = UnloadQuery::new(&select_sql)
            .to_location(&location.uri)
            .credentials(credentials)
            .compressed(self.options.compression())
            .max_file_size(self.options.max_file_size);
        let unload_sql = unload.build_redacted();

        let result = with_connection(self.factory.as_ref(), cancel, move |conn| {
            Box::pin(async move { run_unload(conn, &unload, &actions).await })
        })
        .await?;
        info!(
            rows_unloaded = result.rows_unloaded,
            location = %location.uri,
            "Unloaded scan into staging"
        );

        let diagnostics = ScanDiagnostics {
            select_sql,
            unload_sql: Some(unload_sql),
            row_count: result.rows_unloaded,
        };

        if result.rows_unloaded == 0 {
            return Ok(self.result(projected, ScanKind::Empty, residual_filters, diagnostics));
        }

        if cancel.is_cancelled() {
            return Err(ConnectorError::Cancelled);
        }
        let partitions = self.files.list_partitions(&location).await?;
        if partitions.is_empty() {
            return Err(ConnectorError::staging(format!(
                "{} rows were unloaded but no staged files were found at {}",
                result.rows_unloaded, location.uri
            )));
        }

        Ok(self.result(
            projected,
            ScanKind::Staged {
                location,
                partitions,
            },
            residual_filters,
            diagnostics,
        ))
    }

    /// Blocking variant of [`build_scan`](Self::build_scan) for non-async callers.
    ///
    /// Must not be called from within a tokio runtime.
    pub fn blocking_build_scan(&self, request: &ScanRequest) -> Result<ScanResult> {
        blocking_runtime()?.block_on(self.build_scan(request))
    }

    /// Blocking variant of [`schema`](Self::schema).
    pub fn blocking_schema(&self) -> Result<SchemaRef> {
        blocking_runtime()?.block_on(self.schema())
    }

    /// Zoned timestamps are only pushed when the prologue pins the session
    /// time zone to UTC.
    fn filter_dialect(&self) -> FilterDialect {
        FilterDialect {
            keep_column_case: self.options.keep_column_case,
            utc_session: self.options.use_session_prologue,
        }
    }

    fn result(
        &self,
        schema: SchemaRef,
        kind: ScanKind,
        residual_filters: Vec<Predicate>,
        diagnostics: ScanDiagnostics,
    ) -> ScanResult {
        ScanResult {
            schema,
            kind,
            residual_filters,
            diagnostics,
            files: Arc::clone(&self.files),
            batch_size: self.options.batch_size,
        }
    }
}

/// Builder for [`StagedRelation`].
pub struct StagedRelationBuilder {
    options: ConnectorOptions,
    factory: Arc<dyn ConnectionFactory>,
    files: Arc<dyn StagedFileSource>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    schema: Option<SchemaRef>,
}

impl StagedRelationBuilder {
    /// Sets the credential provider. Without one, unload statements carry no
    /// credentials clause.
    #[must_use]
    pub fn credentials(mut self, provider: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Sets an explicit schema; the remote is then never asked for one.
    #[must_use]
    pub fn schema(mut self, schema: SchemaRef) -> Self {
        self.schema = Some(schema);
        self
    }

    /// # Errors
    /// `ConnectorError::Config` for invalid options or an unsupported schema.
    pub fn build(self) -> Result<StagedRelation> {
        self.options.validate()?;
        let source = self.options.source()?;
        let resolver = SchemaResolver::new(source.clone(), Arc::clone(&self.factory), self.schema)?;
        let credentials: Arc<dyn CredentialProvider> = match self.credentials {
            Some(provider) => provider,
            None => Arc::new(StaticCredentials::none()),
        };

        Ok(StagedRelation {
            source,
            options: self.options,
            factory: self.factory,
            credentials,
            files: self.files,
            resolver,
        })
    }
}

/// Selects `columns` from `schema`, in the requested order.
fn project(schema: &Schema, columns: &[String]) -> Result<Schema> {
    let fields = columns
        .iter()
        .map(|name| {
            lookup_column(schema, name)
                .map(|(_, field)| field.clone())
                .ok_or_else(|| {
                    ConnectorError::config(format!("column '{name}' does not exist in relation"))
                })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(fields))
}
