//! SELECT and COUNT statement construction for pushed-down scans.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConnectorError, Result};
use crate::query::filter::WhereClause;

/// What a relation reads from: a table reference or an arbitrary sub-query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    /// A (possibly qualified) table name, rendered verbatim.
    Table(String),
    /// A SQL query, rendered as a parenthesised sub-query.
    Query(String),
}

impl TableSource {
    /// Validates that the reference is not blank.
    pub fn validate(&self) -> Result<()> {
        let text = match self {
            TableSource::Table(name) => name,
            TableSource::Query(sql) => sql,
        };
        if text.trim().is_empty() {
            return Err(ConnectorError::config(
                "a table name or a query must be provided",
            ));
        }
        Ok(())
    }

    /// The table name, when this source is a plain table.
    pub fn table_name(&self) -> Option<&str> {
        match self {
            TableSource::Table(name) => Some(name),
            TableSource::Query(_) => None,
        }
    }
}

impl fmt::Display for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableSource::Table(name) => write!(f, "{name}"),
            TableSource::Query(sql) => write!(f, "({sql})"),
        }
    }
}

/// Quotes a column name for the remote engine.
///
/// Names already wrapped in double quotes are used verbatim. Otherwise the name
/// is upper-cased (the remote folds unquoted identifiers to upper case) unless
/// `keep_column_case` is set, embedded quotes are doubled, and the result is
/// wrapped in double quotes.
///
/// Example: `Name` becomes `"NAME"`, `"Name"` stays `"Name"`.
#[must_use]
pub fn quote_column(name: &str, keep_column_case: bool) -> String {
    if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
        return name.to_string();
    }
    let folded = if keep_column_case {
        name.to_string()
    } else {
        name.to_uppercase()
    };
    format!("\"{}\"", folded.replace('"', "\"\""))
}

/// Builds the projection query that is handed to the unload statement.
///
/// # Errors
/// Returns `ConnectorError::Config` if `columns` is empty; the zero-column case
/// goes through [`build_count_query`].
pub fn build_projection_query(
    source: &TableSource,
    columns: &[String],
    where_clause: &WhereClause,
    keep_column_case: bool,
) -> Result<String> {
    if columns.is_empty() {
        return Err(ConnectorError::config(
            "a projection query needs at least one column",
        ));
    }

    let projection = columns
        .iter()
        .map(|c| quote_column(c, keep_column_case))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {projection} FROM {source}");
    if !where_clause.is_empty() {
        sql.push(' ');
        sql.push_str(&where_clause.to_string());
    }
    Ok(sql)
}

/// Builds the row-count query used when a scan needs no columns.
pub fn build_count_query(source: &TableSource, where_clause: &WhereClause) -> String {
    format!("SELECT count(*) FROM {source} {where_clause}")
        .trim_end()
        .to_string()
}

/// Builds the zero-row probe used to read column metadata.
pub fn build_describe_query(source: &TableSource) -> String {
    format!("SELECT * FROM {source} WHERE 1=0")
}
