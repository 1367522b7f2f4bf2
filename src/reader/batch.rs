//! Assembly of typed rows into Arrow record batches.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BinaryBuilder, BooleanBuilder, Date32Builder, Decimal128Builder, Float64Builder,
    Int64Builder, RecordBatch, RecordBatchOptions, StringBuilder, Time64MicrosecondBuilder,
    TimestampMicrosecondBuilder,
};
use arrow::datatypes::{DataType, SchemaRef, TimeUnit};
use arrow::error::ArrowError;

use crate::error::Result;
use crate::types::{TypedRow, Value};

/// Builds a RecordBatch from rows laid out per `schema`.
pub fn rows_to_batch(schema: &SchemaRef, rows: &[TypedRow]) -> Result<RecordBatch> {
    if schema.fields().is_empty() {
        return count_batch(schema, rows.len());
    }

    let arrays = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(col_idx, field)| {
            let values = rows.iter().map(|row| row.get(col_idx).unwrap_or(&Value::Null));
            build_array(field.data_type(), values, rows.len())
        })
        .collect::<std::result::Result<Vec<_>, ArrowError>>()?;

    Ok(RecordBatch::try_new(Arc::clone(schema), arrays)?)
}

/// Builds a column-less batch that only carries a row count.
pub fn count_batch(schema: &SchemaRef, num_rows: usize) -> Result<RecordBatch> {
    let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
    Ok(RecordBatch::try_new_with_options(
        Arc::clone(schema),
        Vec::new(),
        &options,
    )?)
}

fn mismatch(value: &Value, data_type: &DataType) -> ArrowError {
    ArrowError::InvalidArgumentError(format!(
        "value {value:?} does not match column type {data_type:?}"
    ))
}

fn build_array<'a>(
    data_type: &DataType,
    values: impl Iterator<Item = &'a Value>,
    len: usize,
) -> std::result::Result<ArrayRef, ArrowError> {
    let array: ArrayRef = match data_type {
        DataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(len);
            for value in values {
                match value {
                    Value::Boolean(b) => builder.append_value(*b),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(len);
            for value in values {
                match value {
                    Value::Int64(n) => builder.append_value(*n),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(len);
            for value in values {
                match value {
                    Value::Float64(f) => builder.append_value(*f),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Decimal128(precision, scale) => {
            let mut builder = Decimal128Builder::with_capacity(len)
                .with_precision_and_scale(*precision, *scale)?;
            for value in values {
                match value {
                    Value::Decimal { unscaled, .. } => builder.append_value(*unscaled),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Utf8 => {
            let mut builder = StringBuilder::new();
            for value in values {
                match value {
                    Value::Utf8(s) => builder.append_value(s),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Binary => {
            let mut builder = BinaryBuilder::new();
            for value in values {
                match value {
                    Value::Binary(b) => builder.append_value(b),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Date32 => {
            let mut builder = Date32Builder::with_capacity(len);
            for value in values {
                match value {
                    Value::Date32(d) => builder.append_value(*d),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Time64(TimeUnit::Microsecond) => {
            let mut builder = Time64MicrosecondBuilder::with_capacity(len);
            for value in values {
                match value {
                    Value::Time64(t) => builder.append_value(*t),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        DataType::Timestamp(TimeUnit::Microsecond, tz) => {
            let mut builder =
                TimestampMicrosecondBuilder::with_capacity(len).with_timezone_opt(tz.clone());
            for value in values {
                match value {
                    Value::Timestamp(ts) => builder.append_value(*ts),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(other, data_type)),
                }
            }
            Arc::new(builder.finish())
        }
        other => {
            return Err(ArrowError::NotYetImplemented(format!(
                "Unsupported data type: {other:?}"
            )))
        }
    };
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Decimal128Array, Int64Array, StringArray, TimestampMicrosecondArray};
    use arrow::datatypes::{Field, Schema};

    #[test]
    fn test_rows_to_batch() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("ID", DataType::Int64, false),
            Field::new("NAME", DataType::Utf8, true),
            Field::new("AMOUNT", DataType::Decimal128(10, 2), true),
            Field::new(
                "TS",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                true,
            ),
        ]));
        let rows = vec![
            vec![
                Value::Int64(1),
                Value::Utf8("a".into()),
                Value::Decimal {
                    unscaled: 1050,
                    precision: 10,
                    scale: 2,
                },
                Value::Timestamp(5),
            ],
            vec![Value::Int64(2), Value::Null, Value::Null, Value::Null],
        ];

        let batch = rows_to_batch(&schema, &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);

        let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.value(1), 2);
        let names = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "a");
        assert!(names.is_null(1));
        let amounts = batch
            .column(2)
            .as_any()
            .downcast_ref::<Decimal128Array>()
            .unwrap();
        assert_eq!(amounts.value(0), 1050);
        assert_eq!(amounts.precision(), 10);
        let ts = batch
            .column(3)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .unwrap();
        assert_eq!(ts.value(0), 5);
        assert_eq!(ts.timezone(), Some("UTC"));
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let schema = Arc::new(Schema::new(vec![Field::new("ID", DataType::Int64, true)]));
        assert!(rows_to_batch(&schema, &[vec![Value::Utf8("x".into())]]).is_err());
    }

    #[test]
    fn test_count_batch() {
        let schema = Arc::new(Schema::empty());
        let batch = count_batch(&schema, 7).unwrap();
        assert_eq!(batch.num_rows(), 7);
        assert_eq!(batch.num_columns(), 0);

        let batch = rows_to_batch(&schema, &[vec![], vec![]]).unwrap();
        assert_eq!(batch.num_rows(), 2);
    }
}
