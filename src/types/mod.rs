//! Remote types, typed values and literal parsing.

pub(crate) mod conversion;
mod mapping;
mod value;

pub use mapping::{RemoteType, TypeMapper, REMOTE_TYPE_METADATA_KEY};
pub use value::{format_decimal, format_timestamp, quote_string_literal, Value};

/// An ordered sequence of typed values matching a schema's field order.
pub type TypedRow = Vec<Value>;
