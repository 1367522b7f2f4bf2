//! Unload orchestration on one remote connection.
//!
//! # Statement sequence
//!
//! 1. Session prologue pinning the time zone and text output formats (optional)
//! 2. Pre-actions
//! 3. The COPY INTO statement, executed as a query
//! 4. Confirmation check on its result
//! 5. Post-actions
//!
//! Any failure aborts the sequence; no partial result is returned.

use tracing::{debug, info};

use crate::connection::{RemoteConnection, ResultSet};
use crate::error::{ConnectorError, Result};
use crate::query::select::TableSource;
use crate::query::unload::UnloadQuery;
use crate::types::RemoteType;

/// Name of the first column of an unload confirmation.
pub const ROWS_UNLOADED_COLUMN: &str = "rows_unloaded";

/// Number of columns in an unload confirmation
/// (`rows_unloaded`, `input_bytes`, `output_bytes`).
pub const CONFIRMATION_COLUMNS: usize = 3;

/// Session statements that pin the text formats the record converter parses
/// and the UTC time zone pushed timestamp literals assume.
pub fn session_prologue() -> Vec<String> {
    [
        "ALTER SESSION SET TIMEZONE = 'UTC'",
        "ALTER SESSION SET DATE_OUTPUT_FORMAT = 'YYYY-MM-DD'",
        "ALTER SESSION SET TIME_OUTPUT_FORMAT = 'HH24:MI:SS.FF6'",
        "ALTER SESSION SET TIMESTAMP_NTZ_OUTPUT_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF6'",
        "ALTER SESSION SET TIMESTAMP_LTZ_OUTPUT_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF6 TZHTZM'",
        "ALTER SESSION SET TIMESTAMP_TZ_OUTPUT_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF6 TZHTZM'",
        "ALTER SESSION SET BINARY_OUTPUT_FORMAT = 'HEX'",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Splits a `;`-separated action list and substitutes `%s` with the source.
///
/// Blank entries are dropped. A table source substitutes its name, a
/// sub-query its parenthesised text.
pub fn parse_actions(actions: &str, source: &TableSource) -> Vec<String> {
    let target = source.to_string();
    actions
        .split(';')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(|a| a.replace("%s", &target))
        .collect()
}

/// Statements run around the main statement of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionActions {
    pub prologue: bool,
    pub pre: Vec<String>,
    pub post: Vec<String>,
}

/// Result of a successful unload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnloadResult {
    pub rows_unloaded: u64,
}

/// Runs the full unload sequence for `query` on `conn`.
pub async fn run_unload(
    conn: &mut dyn RemoteConnection,
    query: &UnloadQuery,
    actions: &SessionActions,
) -> Result<UnloadResult> {
    run_before(conn, actions).await?;

    debug!(sql = %query.build_redacted(), "Executing unload");
    let confirmation = conn.execute_query(&query.build()).await?;
    let rows_unloaded = verify_confirmation(&confirmation)?;

    run_after(conn, actions).await?;

    info!(rows_unloaded, "Unload finished");
    Ok(UnloadResult { rows_unloaded })
}

/// Runs a `SELECT count(*)` with the same surrounding actions as an unload.
pub async fn run_count(
    conn: &mut dyn RemoteConnection,
    count_sql: &str,
    actions: &SessionActions,
) -> Result<u64> {
    run_before(conn, actions).await?;

    debug!(sql = %count_sql, "Executing count");
    let result = conn.execute_query(count_sql).await?;
    let rows = read_count(&result)?;

    run_after(conn, actions).await?;
    Ok(rows)
}

async fn run_before(conn: &mut dyn RemoteConnection, actions: &SessionActions) -> Result<()> {
    if actions.prologue {
        for statement in session_prologue() {
            conn.execute(&statement).await?;
        }
    }
    for statement in &actions.pre {
        debug!(sql = %statement, "Executing pre-action");
        conn.execute(statement).await?;
    }
    Ok(())
}

async fn run_after(conn: &mut dyn RemoteConnection, actions: &SessionActions) -> Result<()> {
    for statement in &actions.post {
        debug!(sql = %statement, "Executing post-action");
        conn.execute(statement).await?;
    }
    Ok(())
}

/// Checks the shape of an unload confirmation and returns the unloaded row count.
///
/// # Errors
/// `ConnectorError::Protocol` unless the result has exactly three columns, the
/// first named `rows_unloaded` with a numeric type, exactly one row, and a
/// non-negative integer in the first cell.
pub fn verify_confirmation(result: &ResultSet) -> Result<u64> {
    if result.num_columns() != CONFIRMATION_COLUMNS {
        return Err(ConnectorError::protocol(format!(
            "expected {CONFIRMATION_COLUMNS} columns in unload confirmation, found {}",
            result.num_columns()
        )));
    }

    let first = &result.columns[0];
    if !first.name.eq_ignore_ascii_case(ROWS_UNLOADED_COLUMN) {
        return Err(ConnectorError::protocol(format!(
            "expected first confirmation column '{ROWS_UNLOADED_COLUMN}', found '{}'",
            first.name
        )));
    }

    let numeric = RemoteType::from_type_name(&first.type_name, first.precision, first.scale)
        .map(|t| t.is_numeric())
        .unwrap_or(false);
    if !numeric {
        return Err(ConnectorError::protocol(format!(
            "column '{}' has non-numeric type {}",
            first.name, first.type_name
        )));
    }

    if result.num_rows() != 1 {
        return Err(ConnectorError::protocol(format!(
            "expected exactly one confirmation row, found {}",
            result.num_rows()
        )));
    }

    parse_row_count(result.value(0, 0))
}

fn read_count(result: &ResultSet) -> Result<u64> {
    if result.num_columns() != 1 || result.num_rows() != 1 {
        return Err(ConnectorError::protocol(format!(
            "expected a single count value, found {} columns and {} rows",
            result.num_columns(),
            result.num_rows()
        )));
    }
    parse_row_count(result.value(0, 0))
}

fn parse_row_count(cell: Option<&str>) -> Result<u64> {
    let text = cell.ok_or_else(|| ConnectorError::protocol("row count is NULL"))?;
    text.trim()
        .parse::<u64>()
        .map_err(|_| ConnectorError::protocol(format!("invalid row count '{text}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ColumnMetadata;
    use async_trait::async_trait;

    fn confirmation(rows: &[&str]) -> ResultSet {
        ResultSet::new(
            vec![
                ColumnMetadata::new("rows_unloaded", "NUMBER").with_precision(38, 0),
                ColumnMetadata::new("input_bytes", "NUMBER").with_precision(38, 0),
                ColumnMetadata::new("output_bytes", "NUMBER").with_precision(38, 0),
            ],
            rows.iter()
                .map(|r| {
                    vec![
                        Some((*r).to_string()),
                        Some("100".to_string()),
                        Some("50".to_string()),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn test_verify_confirmation_ok() {
        assert_eq!(verify_confirmation(&confirmation(&["42"])).unwrap(), 42);
        assert_eq!(verify_confirmation(&confirmation(&["0"])).unwrap(), 0);
    }

    #[test]
    fn test_verify_confirmation_column_name_case_insensitive() {
        let mut rs = confirmation(&["7"]);
        rs.columns[0].name = "ROWS_UNLOADED".to_string();
        assert_eq!(verify_confirmation(&rs).unwrap(), 7);
    }

    #[test]
    fn test_verify_confirmation_violations() {
        let mut wrong_width = confirmation(&["1"]);
        wrong_width.columns.pop();
        assert!(matches!(
            verify_confirmation(&wrong_width),
            Err(ConnectorError::Protocol(_))
        ));

        let mut wrong_name = confirmation(&["1"]);
        wrong_name.columns[0].name = "rows_loaded".to_string();
        assert!(matches!(
            verify_confirmation(&wrong_name),
            Err(ConnectorError::Protocol(_))
        ));

        let mut wrong_type = confirmation(&["1"]);
        wrong_type.columns[0].type_name = "VARCHAR".to_string();
        assert!(matches!(
            verify_confirmation(&wrong_type),
            Err(ConnectorError::Protocol(_))
        ));

        assert!(matches!(
            verify_confirmation(&confirmation(&[])),
            Err(ConnectorError::Protocol(_))
        ));
        assert!(matches!(
            verify_confirmation(&confirmation(&["1", "2"])),
            Err(ConnectorError::Protocol(_))
        ));
        assert!(matches!(
            verify_confirmation(&confirmation(&["-1"])),
            Err(ConnectorError::Protocol(_))
        ));
        assert!(matches!(
            verify_confirmation(&confirmation(&["1.5"])),
            Err(ConnectorError::Protocol(_))
        ));

        let mut null_count = confirmation(&["1"]);
        null_count.rows[0][0] = None;
        assert!(matches!(
            verify_confirmation(&null_count),
            Err(ConnectorError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_actions() {
        let source = TableSource::Table("ORDERS".to_string());
        assert_eq!(
            parse_actions("DELETE FROM log WHERE t = '%s'; ; ALTER TABLE %s CLUSTER BY (ID)", &source),
            vec![
                "DELETE FROM log WHERE t = 'ORDERS'".to_string(),
                "ALTER TABLE ORDERS CLUSTER BY (ID)".to_string(),
            ]
        );
        let query = TableSource::Query("SELECT 1".to_string());
        assert_eq!(parse_actions("CALL audit('%s')", &query), vec!["CALL audit('(SELECT 1)')"]);
        assert!(parse_actions("", &source).is_empty());
    }

    #[test]
    fn test_session_prologue_pins_formats() {
        let prologue = session_prologue();
        assert_eq!(prologue.len(), 7);
        assert_eq!(prologue[0], "ALTER SESSION SET TIMEZONE = 'UTC'");
        assert!(prologue
            .iter()
            .any(|s| s.contains("TIMESTAMP_NTZ_OUTPUT_FORMAT = 'YYYY-MM-DD HH24:MI:SS.FF6'")));
        assert!(prologue.iter().any(|s| s.contains("BINARY_OUTPUT_FORMAT = 'HEX'")));
    }

    struct Recorder {
        statements: Vec<String>,
        reply: ResultSet,
    }

    #[async_trait]
    impl RemoteConnection for Recorder {
        async fn execute(&mut self, sql: &str) -> Result<()> {
            self.statements.push(sql.to_string());
            Ok(())
        }

        async fn execute_query(&mut self, sql: &str) -> Result<ResultSet> {
            self.statements.push(sql.to_string());
            Ok(self.reply.clone())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_run_unload_statement_order() {
        let mut conn = Recorder {
            statements: Vec::new(),
            reply: confirmation(&["3"]),
        };
        let query = UnloadQuery::new("SELECT 1").to_location("s3://b/x/");
        let actions = SessionActions {
            prologue: true,
            pre: vec!["PRE".to_string()],
            post: vec!["POST".to_string()],
        };

        let result = run_unload(&mut conn, &query, &actions).await.unwrap();
        assert_eq!(result.rows_unloaded, 3);

        let n = conn.statements.len();
        assert_eq!(n, 7 + 3);
        assert_eq!(conn.statements[0], "ALTER SESSION SET TIMEZONE = 'UTC'");
        assert!(conn.statements[1].starts_with("ALTER SESSION SET DATE_OUTPUT_FORMAT"));
        assert_eq!(conn.statements[7], "PRE");
        assert_eq!(conn.statements[8], query.build());
        assert_eq!(conn.statements[9], "POST");
    }

    #[tokio::test]
    async fn test_run_unload_skips_post_actions_on_protocol_error() {
        let mut conn = Recorder {
            statements: Vec::new(),
            reply: confirmation(&[]),
        };
        let query = UnloadQuery::new("SELECT 1").to_location("s3://b/x/");
        let actions = SessionActions {
            prologue: false,
            pre: vec![],
            post: vec!["POST".to_string()],
        };

        let err = run_unload(&mut conn, &query, &actions).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Protocol(_)));
        assert_eq!(conn.statements, vec![query.build()]);
    }

    #[tokio::test]
    async fn test_run_count() {
        let mut conn = Recorder {
            statements: Vec::new(),
            reply: ResultSet::new(
                vec![ColumnMetadata::new("COUNT(*)", "NUMBER")],
                vec![vec![Some("12".to_string())]],
            ),
        };
        let rows = run_count(&mut conn, "SELECT count(*) FROM T", &SessionActions::default())
            .await
            .unwrap();
        assert_eq!(rows, 12);
        assert_eq!(conn.statements, vec!["SELECT count(*) FROM T".to_string()]);
    }
}
