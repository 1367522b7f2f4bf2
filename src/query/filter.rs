//! Translation of filter predicates into remote SQL.
//!
//! [`translate`] returns `None` for anything it cannot express exactly in the
//! remote dialect. Returning `None` is always safe because the caller keeps the
//! predicates reported by [`unhandled_filters`] and applies them to the rows it
//! reads back.

use std::fmt;

use arrow::datatypes::{DataType, Schema};

use crate::query::predicate::{lookup_column, Predicate};
use crate::query::select::quote_column;
use crate::types::{format_timestamp, quote_string_literal, Value};

/// Escape character used in generated `LIKE` patterns.
const LIKE_ESCAPE: char = '\\';

/// How predicates are rendered for the remote session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterDialect {
    /// Keep column names as given instead of upper-casing them.
    pub keep_column_case: bool,
    /// The session time zone is pinned to UTC, so zoned timestamp literals
    /// compare as the instants they denote.
    pub utc_session: bool,
}

impl Default for FilterDialect {
    fn default() -> Self {
        Self {
            keep_column_case: false,
            utc_session: true,
        }
    }
}

/// A rendered WHERE clause; empty when no predicate could be pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhereClause {
    conditions: Vec<String>,
}

impl WhereClause {
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// The individual pushed-down conditions.
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return Ok(());
        }
        write!(f, "WHERE {}", self.conditions.join(" AND "))
    }
}

/// Translates one predicate into a SQL boolean expression.
///
/// `dialect.keep_column_case` selects the identifier rendering used for
/// column references, see [`quote_column`]. Timestamps against zoned columns
/// are only pushed when `dialect.utc_session` holds.
pub fn translate(schema: &Schema, predicate: &Predicate, dialect: FilterDialect) -> Option<String> {
    let column_ref = |name: &str| -> Option<(String, &DataType)> {
        let (_, field) = lookup_column(schema, name)?;
        Some((
            quote_column(field.name(), dialect.keep_column_case),
            field.data_type(),
        ))
    };

    match predicate {
        Predicate::Equals { column, value } => {
            comparison(column_ref(column)?, "=", value, dialect)
        }
        Predicate::NotEquals { column, value } => {
            comparison(column_ref(column)?, "!=", value, dialect)
        }
        Predicate::GreaterThan { column, value } => {
            comparison(column_ref(column)?, ">", value, dialect)
        }
        Predicate::GreaterThanOrEqual { column, value } => {
            comparison(column_ref(column)?, ">=", value, dialect)
        }
        Predicate::LessThan { column, value } => {
            comparison(column_ref(column)?, "<", value, dialect)
        }
        Predicate::LessThanOrEqual { column, value } => {
            comparison(column_ref(column)?, "<=", value, dialect)
        }
        Predicate::In { column, values } => {
            let (col, data_type) = column_ref(column)?;
            if values.is_empty() {
                return None;
            }
            let literals = values
                .iter()
                .map(|v| literal_for(data_type, v, dialect))
                .collect::<Option<Vec<_>>>()?;
            Some(format!("{col} IN ({})", literals.join(", ")))
        }
        Predicate::IsNull { column } => {
            let (col, _) = column_ref(column)?;
            Some(format!("{col} IS NULL"))
        }
        Predicate::IsNotNull { column } => {
            let (col, _) = column_ref(column)?;
            Some(format!("{col} IS NOT NULL"))
        }
        Predicate::StringStartsWith { column, prefix } => {
            like(column_ref(column)?, &format!("{}%", escape_like(prefix)))
        }
        Predicate::StringEndsWith { column, suffix } => {
            like(column_ref(column)?, &format!("%{}", escape_like(suffix)))
        }
        Predicate::StringContains { column, substring } => {
            like(column_ref(column)?, &format!("%{}%", escape_like(substring)))
        }
        Predicate::Not(inner) => {
            let inner = translate(schema, inner, dialect)?;
            Some(format!("(NOT ({inner}))"))
        }
        Predicate::And(l, r) => {
            let l = translate(schema, l, dialect)?;
            let r = translate(schema, r, dialect)?;
            Some(format!("(({l}) AND ({r}))"))
        }
        Predicate::Or(l, r) => {
            let l = translate(schema, l, dialect)?;
            let r = translate(schema, r, dialect)?;
            Some(format!("(({l}) OR ({r}))"))
        }
    }
}

/// Joins every translatable predicate with AND.
pub fn build_where_clause(
    schema: &Schema,
    predicates: &[Predicate],
    dialect: FilterDialect,
) -> WhereClause {
    WhereClause {
        conditions: predicates
            .iter()
            .filter_map(|p| translate(schema, p, dialect))
            .collect(),
    }
}

/// Predicates [`translate`] cannot push down, in their original order.
///
/// These must be re-applied to the rows read back from staging.
pub fn unhandled_filters(
    schema: &Schema,
    predicates: &[Predicate],
    dialect: FilterDialect,
) -> Vec<Predicate> {
    predicates
        .iter()
        .filter(|p| translate(schema, p, dialect).is_none())
        .cloned()
        .collect()
}

fn comparison(
    (col, data_type): (String, &DataType),
    op: &str,
    value: &Value,
    dialect: FilterDialect,
) -> Option<String> {
    let literal = literal_for(data_type, value, dialect)?;
    Some(format!("{col} {op} {literal}"))
}

fn like((col, data_type): (String, &DataType), pattern: &str) -> Option<String> {
    if !matches!(data_type, DataType::Utf8) {
        return None;
    }
    Some(format!(
        "{col} LIKE {} ESCAPE {}",
        quote_string_literal(pattern),
        quote_string_literal(&LIKE_ESCAPE.to_string())
    ))
}

fn literal_for(data_type: &DataType, value: &Value, dialect: FilterDialect) -> Option<String> {
    if !value.is_compatible_with(data_type) {
        return None;
    }
    match (value, data_type) {
        (Value::Timestamp(micros), DataType::Timestamp(_, None)) => Some(format!(
            "TIMESTAMP_NTZ '{}'",
            format_timestamp(*micros)
        )),
        // Zoned columns compare instants; the literal carries its offset.
        (Value::Timestamp(micros), DataType::Timestamp(_, Some(_))) => dialect
            .utc_session
            .then(|| format!("TIMESTAMP_TZ '{} +0000'", format_timestamp(*micros))),
        _ => value.to_sql_literal(),
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '%' || c == '_' || c == LIKE_ESCAPE {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}
