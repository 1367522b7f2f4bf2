//! Lazy, per-partition decoding of staged records.

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{ConversionError, Result};
use crate::query::unload::{FIELD_DELIMITER, FIELD_QUOTE};
use crate::reader::batch::{count_batch, rows_to_batch};
use crate::reader::record::{convert_row, split_record, QuoteTracker};
use crate::reader::source::PartitionInput;
use crate::types::TypedRow;

/// Default number of rows per record batch.
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Streaming reader that converts one staged file into typed rows.
///
/// Rows are produced in the order they appear in the file. Records whose
/// quoted fields contain line breaks span several lines and are joined before
/// conversion. The first conversion error ends the partition: the error is
/// returned once, and every later call yields `None`.
pub struct PartitionReader<R> {
    reader: R,
    schema: SchemaRef,
    batch_size: usize,
    current_row: usize,
    finished: bool,
}

impl<R: AsyncBufRead + Unpin> PartitionReader<R> {
    pub fn new(reader: R, schema: SchemaRef, batch_size: usize) -> Self {
        Self {
            reader,
            schema,
            batch_size: batch_size.max(1),
            current_row: 0,
            finished: false,
        }
    }

    /// Returns the Arrow schema.
    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        SchemaRef::clone(&self.schema)
    }

    /// Number of rows decoded so far.
    pub fn rows_read(&self) -> usize {
        self.current_row
    }

    /// Reads and converts the next row.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(row))` - The next typed row
    /// * `Ok(None)` - The partition is exhausted (or ended by an earlier error)
    /// * `Err(e)` - The record could not be read or converted
    pub async fn next_row(&mut self) -> Result<Option<TypedRow>> {
        if self.finished {
            return Ok(None);
        }
        match self.read_row().await {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                Err(e)
            }
        }
    }

    /// Reads up to `batch_size` rows into a RecordBatch.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        let mut rows: Vec<TypedRow> = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            match self.next_row().await? {
                Some(row) => rows.push(row),
                None => break,
            }
        }

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows_to_batch(&self.schema, &rows)?))
    }

    async fn read_row(&mut self) -> Result<Option<TypedRow>> {
        let Some(record) = self.read_record().await? else {
            return Ok(None);
        };
        let row = self.current_row;
        let fields = split_record(&record, FIELD_DELIMITER, FIELD_QUOTE, row)?;
        let typed = convert_row(&self.schema, &fields, FIELD_QUOTE, row)?;
        self.current_row += 1;
        Ok(Some(typed))
    }

    /// Reads one logical record, joining physical lines while a quoted field
    /// is still open.
    async fn read_record(&mut self) -> Result<Option<String>> {
        let mut record = String::new();
        let mut tracker = QuoteTracker::new(FIELD_DELIMITER, FIELD_QUOTE);
        let mut line = Vec::new();

        loop {
            line.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut line).await?;

            if bytes_read == 0 {
                if !record.is_empty() {
                    return Err(ConversionError::UnclosedQuote {
                        row: self.current_row,
                    }
                    .into());
                }
                return Ok(None);
            }

            let text = match std::str::from_utf8(&line) {
                Ok(text) => text,
                Err(e) => {
                    let valid = &line[..e.valid_up_to()];
                    tracker.feed(&String::from_utf8_lossy(valid));
                    return Err(ConversionError::InvalidValue {
                        row: self.current_row,
                        column: tracker.column(),
                        message: format!(
                            "invalid UTF-8 at byte {}",
                            record.len() + e.valid_up_to()
                        ),
                    }
                    .into());
                }
            };

            tracker.feed(text);
            record.push_str(text);

            if !tracker.is_open() {
                if record.ends_with('\n') {
                    record.pop();
                }
                if record.ends_with('\r') {
                    record.pop();
                }
                return Ok(Some(record));
            }
        }
    }
}

/// Rows of one scan partition.
pub enum RowStream {
    /// Rows decoded from a staged file.
    Staged(PartitionReader<PartitionInput>),
    /// Column-less rows of a count-only scan.
    Counted {
        schema: SchemaRef,
        remaining: u64,
        batch_size: usize,
    },
}

impl RowStream {
    pub fn staged(input: PartitionInput, schema: SchemaRef, batch_size: usize) -> Self {
        RowStream::Staged(PartitionReader::new(input, schema, batch_size))
    }

    pub fn counted(schema: SchemaRef, rows: u64, batch_size: usize) -> Self {
        RowStream::Counted {
            schema,
            remaining: rows,
            batch_size: batch_size.max(1),
        }
    }

    #[must_use]
    pub fn schema(&self) -> SchemaRef {
        match self {
            RowStream::Staged(reader) => reader.schema(),
            RowStream::Counted { schema, .. } => SchemaRef::clone(schema),
        }
    }

    pub async fn next_row(&mut self) -> Result<Option<TypedRow>> {
        match self {
            RowStream::Staged(reader) => reader.next_row().await,
            RowStream::Counted { remaining, .. } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                *remaining -= 1;
                Ok(Some(Vec::new()))
            }
        }
    }

    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        match self {
            RowStream::Staged(reader) => reader.next_batch().await,
            RowStream::Counted {
                schema,
                remaining,
                batch_size,
            } => {
                if *remaining == 0 {
                    return Ok(None);
                }
                let take = (*batch_size as u64).min(*remaining);
                *remaining -= take;
                Ok(Some(count_batch(schema, take as usize)?))
            }
        }
    }

    /// Drains the stream into a single vector of rows.
    pub async fn collect_rows(mut self) -> Result<Vec<TypedRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await? {
            rows.push(row);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectorError;
    use crate::types::Value;
    use arrow::array::Array;
    use arrow::datatypes::{DataType, Field, Schema};
    use std::io::Cursor;
    use std::sync::Arc;

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("ID", DataType::Int64, false),
            Field::new("NOTE", DataType::Utf8, true),
        ]))
    }

    fn reader(text: &str) -> PartitionReader<Cursor<Vec<u8>>> {
        PartitionReader::new(Cursor::new(text.as_bytes().to_vec()), schema(), 2)
    }

    #[tokio::test]
    async fn test_rows_in_encounter_order() {
        let mut r = reader("1|a\n2|\n3|\"\"\n");
        assert_eq!(
            r.next_row().await.unwrap(),
            Some(vec![Value::Int64(1), Value::Utf8("a".into())])
        );
        assert_eq!(
            r.next_row().await.unwrap(),
            Some(vec![Value::Int64(2), Value::Null])
        );
        assert_eq!(
            r.next_row().await.unwrap(),
            Some(vec![Value::Int64(3), Value::Utf8(String::new())])
        );
        assert_eq!(r.next_row().await.unwrap(), None);
        assert_eq!(r.rows_read(), 3);
    }

    #[tokio::test]
    async fn test_multiline_quoted_record() {
        let mut r = reader("1|\"line one\nline two\"\n2|x\r\n");
        assert_eq!(
            r.next_row().await.unwrap(),
            Some(vec![Value::Int64(1), Value::Utf8("line one\nline two".into())])
        );
        assert_eq!(
            r.next_row().await.unwrap(),
            Some(vec![Value::Int64(2), Value::Utf8("x".into())])
        );
    }

    #[tokio::test]
    async fn test_unclosed_quote_at_eof() {
        let mut r = reader("1|\"never closed\n");
        let err = r.next_row().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Conversion(ConversionError::UnclosedQuote { row: 0 })
        ));
    }

    #[tokio::test]
    async fn test_error_ends_partition() {
        let mut r = reader("1|a\nnope|b\n3|c\n");
        assert!(r.next_row().await.unwrap().is_some());
        let err = r.next_row().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Conversion(ConversionError::InvalidValue { row: 1, column: 0, .. })
        ));
        assert_eq!(r.next_row().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_conversion_error() {
        let bytes = b"1|a\n2|\xff\n3|c\n".to_vec();
        let mut r = PartitionReader::new(Cursor::new(bytes), schema(), 2);
        assert!(r.next_row().await.unwrap().is_some());
        let err = r.next_row().await.unwrap_err();
        assert!(matches!(
            err,
            ConnectorError::Conversion(ConversionError::InvalidValue { row: 1, column: 1, .. })
        ));
        assert_eq!(r.next_row().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_long_multiline_value_joined() {
        let body: Vec<String> = (0..500).map(|i| format!("line {i}")).collect();
        let text = format!("1|\"{}\"\n2|x\n", body.join("\n"));
        let mut r = reader(&text);
        assert_eq!(
            r.next_row().await.unwrap(),
            Some(vec![Value::Int64(1), Value::Utf8(body.join("\n"))])
        );
        assert_eq!(r.rows_read(), 1);
    }

    #[tokio::test]
    async fn test_next_batch_respects_batch_size() {
        let mut r = reader("1|a\n2|b\n3|c\n");
        assert_eq!(r.next_batch().await.unwrap().unwrap().num_rows(), 2);
        assert_eq!(r.next_batch().await.unwrap().unwrap().num_rows(), 1);
        assert!(r.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_counted_stream() {
        let mut stream = RowStream::counted(Arc::new(Schema::empty()), 5, 2);
        let mut total = 0;
        while let Some(batch) = stream.next_batch().await.unwrap() {
            assert_eq!(batch.num_columns(), 0);
            total += batch.num_rows();
        }
        assert_eq!(total, 5);

        let rows = RowStream::counted(Arc::new(Schema::empty()), 3, 10)
            .collect_rows()
            .await
            .unwrap();
        assert_eq!(rows, vec![Vec::<Value>::new(); 3]);
    }

    #[tokio::test]
    async fn test_single_column_null_rows() {
        let schema = Arc::new(Schema::new(vec![Field::new("N", DataType::Int64, true)]));
        let mut r = PartitionReader::new(Cursor::new(b"1\n\n2\n".to_vec()), schema, 10);
        let batch = r.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(batch.column(0).null_count(), 1);
    }
}
