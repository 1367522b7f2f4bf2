//! Schema resolution for a staged relation.

use std::sync::Arc;

use arrow::datatypes::{Field, Schema, SchemaRef};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::connection::{with_connection, ColumnMetadata, ConnectionFactory};
use crate::error::{ConnectorError, Result};
use crate::query::select::TableSource;
use crate::types::{RemoteType, TypeMapper};

/// Resolves and memoises the schema of one relation.
///
/// A schema supplied by the caller is authoritative and the remote is never
/// contacted. Otherwise the first call probes the remote with a zero-row
/// query; later calls return the cached result. A failed probe is not cached.
pub struct SchemaResolver {
    source: TableSource,
    factory: Arc<dyn ConnectionFactory>,
    user_schema: Option<SchemaRef>,
    resolved: OnceCell<SchemaRef>,
}

impl SchemaResolver {
    /// # Errors
    /// `ConnectorError::Config` if the supplied schema has a field the record
    /// converter cannot produce.
    pub fn new(
        source: TableSource,
        factory: Arc<dyn ConnectionFactory>,
        user_schema: Option<SchemaRef>,
    ) -> Result<Self> {
        if let Some(schema) = &user_schema {
            validate_schema(schema)?;
        }
        Ok(Self {
            source,
            factory,
            user_schema,
            resolved: OnceCell::new(),
        })
    }

    pub async fn resolve(&self, cancel: &CancellationToken) -> Result<SchemaRef> {
        if let Some(schema) = &self.user_schema {
            return Ok(Arc::clone(schema));
        }

        let schema = self
            .resolved
            .get_or_try_init(|| async {
                let source = self.source.clone();
                let columns = with_connection(self.factory.as_ref(), cancel, move |conn| {
                    Box::pin(async move { conn.describe(&source).await })
                })
                .await?;
                let schema = schema_from_columns(&columns)?;
                debug!(fields = schema.fields().len(), "Resolved remote schema");
                Ok::<_, ConnectorError>(Arc::new(schema))
            })
            .await?;

        Ok(Arc::clone(schema))
    }
}

/// Maps remote column metadata onto an Arrow schema.
///
/// Every field carries its remote type as metadata under
/// [`crate::types::REMOTE_TYPE_METADATA_KEY`].
pub fn schema_from_columns(columns: &[ColumnMetadata]) -> Result<Schema> {
    if columns.is_empty() {
        return Err(ConnectorError::config("remote relation has no columns"));
    }

    let fields = columns
        .iter()
        .map(|column| {
            let remote_type =
                RemoteType::from_type_name(&column.type_name, column.precision, column.scale)?;
            Ok(Field::new(
                column.name.clone(),
                TypeMapper::remote_to_arrow(&remote_type),
                column.nullable,
            )
            .with_metadata(TypeMapper::create_field_metadata(&remote_type)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Schema::new(fields))
}

/// Checks that every field of a supplied schema can be produced.
pub fn validate_schema(schema: &Schema) -> Result<()> {
    for field in schema.fields() {
        TypeMapper::ensure_supported(field.name(), field.data_type())
            .map_err(|e| ConnectorError::config(e.to_string()))?;
    }
    Ok(())
}
