//! Typed values produced by the record converter and used as predicate literals.

use std::cmp::Ordering;
use std::fmt;

use arrow::datatypes::DataType;

/// A single typed value.
///
/// Temporal values use the same physical encoding as the Arrow types they map to:
/// dates are days since 1970-01-01, times are microseconds since midnight and
/// timestamps are microseconds since the Unix epoch (UTC for zoned columns).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int64(i64),
    Float64(f64),
    /// Fixed-point decimal: `unscaled * 10^-scale`
    Decimal {
        unscaled: i128,
        precision: u8,
        scale: i8,
    },
    Utf8(String),
    Binary(Vec<u8>),
    /// Days since 1970-01-01
    Date32(i32),
    /// Microseconds since midnight
    Time64(i64),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this literal may be compared against a column of `data_type`.
    pub fn is_compatible_with(&self, data_type: &DataType) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(_) => matches!(data_type, DataType::Boolean),
            Value::Int64(_) | Value::Float64(_) | Value::Decimal { .. } => matches!(
                data_type,
                DataType::Int64 | DataType::Float64 | DataType::Decimal128(_, _)
            ),
            Value::Utf8(_) => matches!(data_type, DataType::Utf8),
            Value::Binary(_) => matches!(data_type, DataType::Binary),
            Value::Date32(_) => matches!(data_type, DataType::Date32),
            Value::Time64(_) => matches!(data_type, DataType::Time64(_)),
            Value::Timestamp(_) => matches!(data_type, DataType::Timestamp(_, _)),
        }
    }

    /// Renders this value as a remote SQL literal.
    ///
    /// Returns `None` for values without an exact literal form (null, NaN,
    /// infinite floats and decimals whose scale overflows).
    pub fn to_sql_literal(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Boolean(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
            Value::Int64(n) => Some(n.to_string()),
            Value::Float64(f) => {
                if f.is_finite() {
                    Some(format!("{f:?}"))
                } else {
                    None
                }
            }
            Value::Decimal {
                unscaled, scale, ..
            } => format_decimal(*unscaled, *scale),
            Value::Utf8(s) => Some(quote_string_literal(s)),
            Value::Binary(b) => Some(format!("TO_BINARY('{}', 'HEX')", hex::encode_upper(b))),
            Value::Date32(days) => Some(format!("DATE '{}'", format_date(*days))),
            Value::Time64(micros) => Some(format!("TIME '{}'", format_time(*micros))),
            Value::Timestamp(micros) => {
                Some(format!("TIMESTAMP '{}'", format_timestamp(*micros)))
            }
        }
    }

    /// Compares two non-null values of compatible kinds.
    ///
    /// Numeric kinds compare across representations. Returns `None` for nulls,
    /// NaN and incompatible kinds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Utf8(a), Utf8(b)) => Some(a.cmp(b)),
            (Binary(a), Binary(b)) => Some(a.cmp(b)),
            (Date32(a), Date32(b)) => Some(a.cmp(b)),
            (Time64(a), Time64(b)) => Some(a.cmp(b)),
            (Timestamp(a), Timestamp(b)) => Some(a.cmp(b)),
            (Int64(a), Int64(b)) => Some(a.cmp(b)),
            (
                Decimal {
                    unscaled: a,
                    scale: sa,
                    ..
                },
                Decimal {
                    unscaled: b,
                    scale: sb,
                    ..
                },
            ) => compare_decimals(*a, *sa, *b, *sb),
            (Int64(a), Decimal { unscaled, scale, .. }) => {
                compare_decimals(i128::from(*a), 0, *unscaled, *scale)
            }
            (Decimal { unscaled, scale, .. }, Int64(b)) => {
                compare_decimals(*unscaled, *scale, i128::from(*b), 0)
            }
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(n) => Some(*n as f64),
            Value::Float64(f) => Some(*f),
            Value::Decimal {
                unscaled, scale, ..
            } => Some(*unscaled as f64 / 10f64.powi(i32::from(*scale))),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Int64(n) => write!(f, "{n}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Decimal {
                unscaled, scale, ..
            } => match format_decimal(*unscaled, *scale) {
                Some(text) => write!(f, "{text}"),
                None => write!(f, "{unscaled}E{}", -i32::from(*scale)),
            },
            Value::Utf8(s) => write!(f, "{s}"),
            Value::Binary(b) => write!(f, "{}", hex::encode_upper(b)),
            Value::Date32(d) => write!(f, "{}", format_date(*d)),
            Value::Time64(t) => write!(f, "{}", format_time(*t)),
            Value::Timestamp(ts) => write!(f, "{}", format_timestamp(*ts)),
        }
    }
}

fn compare_decimals(a: i128, scale_a: i8, b: i128, scale_b: i8) -> Option<Ordering> {
    let scale = i32::from(scale_a.max(scale_b));
    let a = a.checked_mul(10_i128.checked_pow((scale - i32::from(scale_a)) as u32)?)?;
    let b = b.checked_mul(10_i128.checked_pow((scale - i32::from(scale_b)) as u32)?)?;
    Some(a.cmp(&b))
}

/// Single-quotes a string literal, doubling embedded quotes and backslashes.
pub fn quote_string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// Formats an unscaled decimal with the given scale (`12345`, 2 → `123.45`).
///
/// `None` when the scale or the rescaled value does not fit an `i128`.
pub fn format_decimal(unscaled: i128, scale: i8) -> Option<String> {
    if scale <= 0 {
        let multiplier = 10_i128.checked_pow(u32::from(scale.unsigned_abs()))?;
        return Some(unscaled.checked_mul(multiplier)?.to_string());
    }

    let divisor = 10_u128.checked_pow(scale as u32)?;
    let abs = unscaled.unsigned_abs();
    let sign = if unscaled < 0 { "-" } else { "" };
    Some(format!(
        "{sign}{}.{:0width$}",
        abs / divisor,
        abs % divisor,
        width = scale as usize
    ))
}

/// Formats days since epoch as `YYYY-MM-DD`.
pub fn format_date(days: i32) -> String {
    chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| days.to_string())
}

/// Formats microseconds since midnight as `HH:MM:SS.ffffff`.
pub fn format_time(micros: i64) -> String {
    let secs = micros.div_euclid(1_000_000);
    let frac = micros.rem_euclid(1_000_000);
    format!(
        "{:02}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        frac
    )
}

/// Formats microseconds since epoch as `YYYY-MM-DD HH:MM:SS.ffffff`.
pub fn format_timestamp(micros: i64) -> String {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    chrono::DateTime::from_timestamp(secs, nanos)
        .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        .unwrap_or_else(|| micros.to_string())
}
