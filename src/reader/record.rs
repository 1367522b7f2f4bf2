//! Conversion of staged records into typed rows.
//!
//! Staged files use `|` as field delimiter and `"` as optional enclosure. An
//! unquoted empty field is NULL; a quoted empty field (`""`) is the empty
//! string. Inside a quoted field a doubled quote stands for one quote.

use arrow::datatypes::{DataType, Schema, TimeUnit};

use crate::error::ConversionError;
use crate::types::conversion::{
    parse_boolean, parse_date_to_days, parse_decimal_to_i128, parse_float64, parse_hex_binary,
    parse_int64, parse_time_to_micros, parse_timestamp_to_micros, parse_timestamp_tz_to_micros,
};
use crate::types::{TypedRow, Value};

/// Raw field texts of one staged record, quotes still attached.
pub type StagedRecord = Vec<String>;

/// Splits a staged line into raw fields.
///
/// Delimiters inside quoted fields do not split. The returned fields keep
/// their enclosing quotes so [`decode_field`] can tell `""` from NULL.
///
/// # Errors
/// `ConversionError::UnclosedQuote` if a quoted field is not closed.
pub fn split_record(
    line: &str,
    delimiter: char,
    quote: char,
    row: usize,
) -> Result<StagedRecord, ConversionError> {
    let (fields, in_quotes) = scan_fields(line, delimiter, quote);
    if in_quotes {
        return Err(ConversionError::UnclosedQuote { row });
    }
    Ok(fields)
}

/// Quote state of a record that is fed one physical line at a time.
///
/// Each line is scanned once, so joining a long multi-line quoted value stays
/// linear. A quote at the end of a chunk is resolved by the next character.
#[derive(Debug, Clone, Copy)]
pub struct QuoteTracker {
    delimiter: char,
    quote: char,
    in_quotes: bool,
    pending_quote: bool,
    field_empty: bool,
    column: usize,
}

impl QuoteTracker {
    pub fn new(delimiter: char, quote: char) -> Self {
        Self {
            delimiter,
            quote,
            in_quotes: false,
            pending_quote: false,
            field_empty: true,
            column: 0,
        }
    }

    pub fn feed(&mut self, text: &str) {
        for c in text.chars() {
            if self.pending_quote {
                self.pending_quote = false;
                if c == self.quote {
                    // Escaped quote (double quote)
                    continue;
                }
                self.in_quotes = false;
            }

            if self.in_quotes {
                if c == self.quote {
                    self.pending_quote = true;
                }
            } else if c == self.delimiter {
                self.column += 1;
                self.field_empty = true;
            } else {
                if c == self.quote && self.field_empty {
                    self.in_quotes = true;
                }
                self.field_empty = false;
            }
        }
    }

    /// Whether the text fed so far ends inside a quoted field, meaning the
    /// record continues on the next line.
    pub fn is_open(&self) -> bool {
        self.in_quotes && !self.pending_quote
    }

    /// Zero-based index of the field currently being scanned.
    pub fn column(&self) -> usize {
        self.column
    }
}

fn scan_fields(line: &str, delimiter: char, quote: char) -> (Vec<String>, bool) {
    let mut fields = Vec::new();
    let mut current_field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            current_field.push(c);
            if c == quote {
                // Escaped quote (double quote)
                if chars.peek() == Some(&quote) {
                    current_field.push(quote);
                    chars.next();
                } else {
                    in_quotes = false;
                }
            }
        } else if c == delimiter {
            fields.push(std::mem::take(&mut current_field));
        } else {
            if c == quote && current_field.is_empty() {
                in_quotes = true;
            }
            current_field.push(c);
        }
    }

    fields.push(current_field);
    (fields, in_quotes)
}

/// Decodes one raw field: `None` for NULL, otherwise the unescaped text.
pub fn decode_field(raw: &str, quote: char) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let quote_len = quote.len_utf8();
    if raw.len() >= 2 * quote_len && raw.starts_with(quote) && raw.ends_with(quote) {
        let inner = &raw[quote_len..raw.len() - quote_len];
        let doubled: String = [quote, quote].iter().collect();
        return Some(inner.replace(&doubled, &quote.to_string()));
    }
    Some(raw.to_string())
}

/// Converts the raw fields of one record into a row matching `schema`.
///
/// `row` is only used for error context.
///
/// # Errors
/// A `ConversionError` for a field count mismatch, a NULL in a non-nullable
/// field, or text that is not a valid literal of the field's type.
pub fn convert_row(
    schema: &Schema,
    raw_fields: &[String],
    quote: char,
    row: usize,
) -> Result<TypedRow, ConversionError> {
    let expected = schema.fields().len();
    if raw_fields.len() != expected {
        return Err(ConversionError::FieldCount {
            row,
            expected,
            actual: raw_fields.len(),
        });
    }

    schema
        .fields()
        .iter()
        .zip(raw_fields)
        .enumerate()
        .map(|(column, (field, raw))| match decode_field(raw, quote) {
            None if field.is_nullable() => Ok(Value::Null),
            None => Err(ConversionError::NullValue {
                row,
                column,
                name: field.name().clone(),
            }),
            Some(text) => convert_value(&text, field.data_type()).map_err(|e| match e {
                ValueError::Invalid(message) => ConversionError::InvalidValue {
                    row,
                    column,
                    message,
                },
                ValueError::Unsupported => ConversionError::UnsupportedType {
                    column: field.name().clone(),
                    data_type: format!("{:?}", field.data_type()),
                },
            }),
        })
        .collect()
}

enum ValueError {
    Invalid(String),
    Unsupported,
}

impl From<String> for ValueError {
    fn from(message: String) -> Self {
        ValueError::Invalid(message)
    }
}

fn convert_value(text: &str, data_type: &DataType) -> Result<Value, ValueError> {
    let value = match data_type {
        DataType::Boolean => Value::Boolean(parse_boolean(text)?),
        DataType::Int64 => Value::Int64(parse_int64(text)?),
        DataType::Float64 => Value::Float64(parse_float64(text)?),
        DataType::Decimal128(precision, scale) => Value::Decimal {
            unscaled: parse_decimal_to_i128(text, *precision, *scale)?,
            precision: *precision,
            scale: *scale,
        },
        DataType::Utf8 => Value::Utf8(text.to_string()),
        DataType::Binary => Value::Binary(parse_hex_binary(text)?),
        DataType::Date32 => Value::Date32(parse_date_to_days(text)?),
        DataType::Time64(TimeUnit::Microsecond) => Value::Time64(parse_time_to_micros(text)?),
        DataType::Timestamp(TimeUnit::Microsecond, None) => {
            Value::Timestamp(parse_timestamp_to_micros(text)?)
        }
        DataType::Timestamp(TimeUnit::Microsecond, Some(_)) => {
            Value::Timestamp(parse_timestamp_tz_to_micros(text)?)
        }
        _ => return Err(ValueError::Unsupported),
    };
    Ok(value)
}
