//! Type mapping between remote column types and Apache Arrow data types.

use crate::error::{ConnectorError, ConversionError};
use arrow::datatypes::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata key holding the JSON-serialised [`RemoteType`] of a resolved field.
pub const REMOTE_TYPE_METADATA_KEY: &str = "remote:type";

/// Remote engine data type representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum RemoteType {
    /// NUMBER(p, s) and its aliases (DECIMAL, NUMERIC, INT, ...)
    #[serde(rename = "NUMBER")]
    Number { precision: u8, scale: i8 },

    /// FLOAT / DOUBLE / REAL
    #[serde(rename = "FLOAT")]
    Float,

    /// VARCHAR / CHAR / STRING / TEXT
    #[serde(rename = "TEXT")]
    Text { length: Option<usize> },

    /// BINARY / VARBINARY
    #[serde(rename = "BINARY")]
    Binary,

    #[serde(rename = "BOOLEAN")]
    Boolean,

    #[serde(rename = "DATE")]
    Date,

    #[serde(rename = "TIME")]
    Time,

    /// TIMESTAMP_NTZ / DATETIME
    #[serde(rename = "TIMESTAMP_NTZ")]
    TimestampNtz,

    /// TIMESTAMP_LTZ
    #[serde(rename = "TIMESTAMP_LTZ")]
    TimestampLtz,

    /// TIMESTAMP_TZ
    #[serde(rename = "TIMESTAMP_TZ")]
    TimestampTz,

    /// VARIANT / OBJECT / ARRAY, unloaded as JSON text
    #[serde(rename = "VARIANT")]
    SemiStructured,
}

impl RemoteType {
    /// Parses a remote type name such as `NUMBER(38,0)`, `VARCHAR(100)` or
    /// `TIMESTAMP_LTZ(9)`.
    ///
    /// `precision` and `scale` reported separately by the driver take effect when
    /// the name carries no parameters.
    pub fn from_type_name(
        type_name: &str,
        precision: Option<u8>,
        scale: Option<i8>,
    ) -> Result<Self, ConnectorError> {
        let normalized = type_name.trim().to_ascii_uppercase();
        let (base, params) = match normalized.find('(') {
            Some(open) => {
                let close = normalized.rfind(')').ok_or_else(|| {
                    ConnectorError::config(format!("Malformed type name: {type_name}"))
                })?;
                let params: Vec<&str> = normalized[open + 1..close]
                    .split(',')
                    .map(str::trim)
                    .collect();
                (normalized[..open].trim().to_string(), params)
            }
            None => (normalized.clone(), Vec::new()),
        };

        let param = |idx: usize| params.get(idx).and_then(|p| p.parse::<i64>().ok());

        let remote_type = match base.as_str() {
            "NUMBER" | "DECIMAL" | "NUMERIC" | "FIXED" => {
                let precision = param(0).map(|p| p as u8).or(precision).unwrap_or(38);
                let scale = param(1).map(|s| s as i8).or(scale).unwrap_or(0);
                RemoteType::Number { precision, scale }
            }
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "BYTEINT" => {
                RemoteType::Number {
                    precision: 38,
                    scale: 0,
                }
            }
            "FLOAT" | "FLOAT4" | "FLOAT8" | "DOUBLE" | "DOUBLE PRECISION" | "REAL" => {
                RemoteType::Float
            }
            "VARCHAR" | "CHAR" | "CHARACTER" | "STRING" | "TEXT" | "NVARCHAR" | "NCHAR" => {
                RemoteType::Text {
                    length: param(0).map(|l| l as usize),
                }
            }
            "BINARY" | "VARBINARY" => RemoteType::Binary,
            "BOOLEAN" => RemoteType::Boolean,
            "DATE" => RemoteType::Date,
            "TIME" => RemoteType::Time,
            "TIMESTAMP" | "TIMESTAMP_NTZ" | "DATETIME" => RemoteType::TimestampNtz,
            "TIMESTAMP_LTZ" => RemoteType::TimestampLtz,
            "TIMESTAMP_TZ" => RemoteType::TimestampTz,
            "VARIANT" | "OBJECT" | "ARRAY" => RemoteType::SemiStructured,
            _ => {
                return Err(ConnectorError::config(format!(
                    "Unsupported remote type: {type_name}"
                )))
            }
        };

        Ok(remote_type)
    }

    /// Whether values of this type are numbers.
    pub fn is_numeric(&self) -> bool {
        matches!(self, RemoteType::Number { .. } | RemoteType::Float)
    }

    /// Renders the type as it would appear in remote DDL.
    #[must_use]
    pub fn to_type_name(&self) -> String {
        match self {
            RemoteType::Number { precision, scale } => format!("NUMBER({precision},{scale})"),
            RemoteType::Float => "FLOAT".to_string(),
            RemoteType::Text { length: Some(len) } => format!("VARCHAR({len})"),
            RemoteType::Text { length: None } => "VARCHAR".to_string(),
            RemoteType::Binary => "BINARY".to_string(),
            RemoteType::Boolean => "BOOLEAN".to_string(),
            RemoteType::Date => "DATE".to_string(),
            RemoteType::Time => "TIME".to_string(),
            RemoteType::TimestampNtz => "TIMESTAMP_NTZ".to_string(),
            RemoteType::TimestampLtz => "TIMESTAMP_LTZ".to_string(),
            RemoteType::TimestampTz => "TIMESTAMP_TZ".to_string(),
            RemoteType::SemiStructured => "VARIANT".to_string(),
        }
    }
}

/// Type mapper for converting remote types into Arrow types.
pub struct TypeMapper;

impl TypeMapper {
    /// Convert a remote type to the Arrow DataType the record converter produces.
    pub fn remote_to_arrow(remote_type: &RemoteType) -> DataType {
        match remote_type {
            // Integral numbers that fit 18 digits are read as Int64, everything
            // else keeps exact decimal semantics.
            RemoteType::Number { precision, scale } => {
                if *scale == 0 && *precision <= 18 {
                    DataType::Int64
                } else {
                    DataType::Decimal128(*precision, *scale)
                }
            }
            RemoteType::Float => DataType::Float64,
            RemoteType::Text { .. } | RemoteType::SemiStructured => DataType::Utf8,
            RemoteType::Binary => DataType::Binary,
            RemoteType::Boolean => DataType::Boolean,
            RemoteType::Date => DataType::Date32,
            RemoteType::Time => DataType::Time64(TimeUnit::Microsecond),
            RemoteType::TimestampNtz => DataType::Timestamp(TimeUnit::Microsecond, None),
            RemoteType::TimestampLtz | RemoteType::TimestampTz => {
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            }
        }
    }

    /// Checks that the record converter can produce values of `data_type`.
    ///
    /// # Errors
    /// Returns `ConversionError::UnsupportedType` naming the offending column.
    pub fn ensure_supported(column: &str, data_type: &DataType) -> Result<(), ConversionError> {
        let supported = matches!(
            data_type,
            DataType::Boolean
                | DataType::Int64
                | DataType::Float64
                | DataType::Decimal128(_, _)
                | DataType::Utf8
                | DataType::Binary
                | DataType::Date32
                | DataType::Time64(TimeUnit::Microsecond)
                | DataType::Timestamp(TimeUnit::Microsecond, _)
        );

        if supported {
            Ok(())
        } else {
            Err(ConversionError::UnsupportedType {
                column: column.to_string(),
                data_type: format!("{data_type:?}"),
            })
        }
    }

    /// Create Arrow field metadata preserving the remote type.
    pub fn create_field_metadata(remote_type: &RemoteType) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(
            REMOTE_TYPE_METADATA_KEY.to_string(),
            serde_json::to_string(remote_type).unwrap_or_default(),
        );
        metadata
    }

    /// Extract the remote type from Arrow field metadata.
    pub fn from_field_metadata(metadata: &HashMap<String, String>) -> Option<RemoteType> {
        metadata
            .get(REMOTE_TYPE_METADATA_KEY)
            .and_then(|s| serde_json::from_str(s).ok())
    }
}
