//! Filter predicates handed to a scan.
//!
//! Predicates form a closed tree. Leaves reference a column by name and compare
//! it against literal [`Value`]s; `Not`, `And` and `Or` combine other predicates.
//! The same tree is used both for SQL translation (see [`crate::query::filter`])
//! and for local evaluation of predicates that could not be pushed down.

use std::cmp::Ordering;

use arrow::datatypes::{Field, Schema};

use crate::types::Value;

/// A filter predicate over a single relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals { column: String, value: Value },
    NotEquals { column: String, value: Value },
    GreaterThan { column: String, value: Value },
    GreaterThanOrEqual { column: String, value: Value },
    LessThan { column: String, value: Value },
    LessThanOrEqual { column: String, value: Value },
    In { column: String, values: Vec<Value> },
    IsNull { column: String },
    IsNotNull { column: String },
    StringStartsWith { column: String, prefix: String },
    StringEndsWith { column: String, suffix: String },
    StringContains { column: String, substring: String },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::Equals {
            column: column.into(),
            value,
        }
    }

    pub fn not_eq(column: impl Into<String>, value: Value) -> Self {
        Self::NotEquals {
            column: column.into(),
            value,
        }
    }

    pub fn gt(column: impl Into<String>, value: Value) -> Self {
        Self::GreaterThan {
            column: column.into(),
            value,
        }
    }

    pub fn gt_eq(column: impl Into<String>, value: Value) -> Self {
        Self::GreaterThanOrEqual {
            column: column.into(),
            value,
        }
    }

    pub fn lt(column: impl Into<String>, value: Value) -> Self {
        Self::LessThan {
            column: column.into(),
            value,
        }
    }

    pub fn lt_eq(column: impl Into<String>, value: Value) -> Self {
        Self::LessThanOrEqual {
            column: column.into(),
            value,
        }
    }

    pub fn in_list(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            column: column.into(),
            values,
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull {
            column: column.into(),
        }
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::IsNotNull {
            column: column.into(),
        }
    }

    pub fn starts_with(column: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::StringStartsWith {
            column: column.into(),
            prefix: prefix.into(),
        }
    }

    pub fn ends_with(column: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self::StringEndsWith {
            column: column.into(),
            suffix: suffix.into(),
        }
    }

    pub fn contains(column: impl Into<String>, substring: impl Into<String>) -> Self {
        Self::StringContains {
            column: column.into(),
            substring: substring.into(),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: Predicate) -> Self {
        Self::Not(Box::new(inner))
    }

    pub fn and(left: Predicate, right: Predicate) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Predicate, right: Predicate) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    /// Column names referenced anywhere in this predicate.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut columns = Vec::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Equals { column, .. }
            | Predicate::NotEquals { column, .. }
            | Predicate::GreaterThan { column, .. }
            | Predicate::GreaterThanOrEqual { column, .. }
            | Predicate::LessThan { column, .. }
            | Predicate::LessThanOrEqual { column, .. }
            | Predicate::In { column, .. }
            | Predicate::IsNull { column }
            | Predicate::IsNotNull { column }
            | Predicate::StringStartsWith { column, .. }
            | Predicate::StringEndsWith { column, .. }
            | Predicate::StringContains { column, .. } => out.push(column.as_str()),
            Predicate::Not(inner) => inner.collect_columns(out),
            Predicate::And(l, r) | Predicate::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
        }
    }

    /// Evaluates this predicate against a typed row laid out per `schema`.
    ///
    /// Uses SQL three-valued logic: `None` is UNKNOWN (a null operand, an
    /// unknown column, or incomparable values). A row passes a filter only when
    /// the result is `Some(true)`.
    pub fn evaluate(&self, schema: &Schema, row: &[Value]) -> Option<bool> {
        let value_of = |column: &str| {
            lookup_column(schema, column)
                .and_then(|(idx, _)| row.get(idx))
                .filter(|v| !v.is_null())
        };

        match self {
            Predicate::Equals { column, value } => {
                compare(value_of(column)?, value).map(|o| o == Ordering::Equal)
            }
            Predicate::NotEquals { column, value } => {
                compare(value_of(column)?, value).map(|o| o != Ordering::Equal)
            }
            Predicate::GreaterThan { column, value } => {
                compare(value_of(column)?, value).map(|o| o == Ordering::Greater)
            }
            Predicate::GreaterThanOrEqual { column, value } => {
                compare(value_of(column)?, value).map(|o| o != Ordering::Less)
            }
            Predicate::LessThan { column, value } => {
                compare(value_of(column)?, value).map(|o| o == Ordering::Less)
            }
            Predicate::LessThanOrEqual { column, value } => {
                compare(value_of(column)?, value).map(|o| o != Ordering::Greater)
            }
            Predicate::In { column, values } => {
                let actual = value_of(column)?;
                let mut saw_unknown = false;
                for candidate in values {
                    match compare(actual, candidate) {
                        Some(Ordering::Equal) => return Some(true),
                        Some(_) => {}
                        None => saw_unknown = true,
                    }
                }
                if saw_unknown {
                    None
                } else {
                    Some(false)
                }
            }
            Predicate::IsNull { column } => lookup_column(schema, column)
                .and_then(|(idx, _)| row.get(idx))
                .map(Value::is_null),
            Predicate::IsNotNull { column } => lookup_column(schema, column)
                .and_then(|(idx, _)| row.get(idx))
                .map(|v| !v.is_null()),
            Predicate::StringStartsWith { column, prefix } => {
                as_str(value_of(column)?).map(|s| s.starts_with(prefix.as_str()))
            }
            Predicate::StringEndsWith { column, suffix } => {
                as_str(value_of(column)?).map(|s| s.ends_with(suffix.as_str()))
            }
            Predicate::StringContains { column, substring } => {
                as_str(value_of(column)?).map(|s| s.contains(substring.as_str()))
            }
            Predicate::Not(inner) => inner.evaluate(schema, row).map(|b| !b),
            Predicate::And(l, r) => match (l.evaluate(schema, row), r.evaluate(schema, row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Predicate::Or(l, r) => match (l.evaluate(schema, row), r.evaluate(schema, row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
        }
    }
}

fn compare(actual: &Value, literal: &Value) -> Option<Ordering> {
    actual.compare(literal)
}

fn as_str(value: &Value) -> Option<&str> {
    match value {
        Value::Utf8(s) => Some(s.as_str()),
        _ => None,
    }
}

/// Finds a schema field by name: exact match first, then ASCII case-insensitive.
pub fn lookup_column<'a>(schema: &'a Schema, name: &str) -> Option<(usize, &'a Field)> {
    let fields = schema.fields();
    fields
        .iter()
        .position(|f| f.name() == name)
        .or_else(|| {
            fields
                .iter()
                .position(|f| f.name().eq_ignore_ascii_case(name))
        })
        .map(|idx| (idx, fields[idx].as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::DataType;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("ID", DataType::Int64, false),
            Field::new("NAME", DataType::Utf8, true),
        ])
    }

    #[test]
    fn test_lookup_column_case_insensitive() {
        let s = schema();
        assert_eq!(lookup_column(&s, "ID").map(|(i, _)| i), Some(0));
        assert_eq!(lookup_column(&s, "name").map(|(i, _)| i), Some(1));
        assert!(lookup_column(&s, "missing").is_none());
    }

    #[test]
    fn test_referenced_columns() {
        let p = Predicate::and(
            Predicate::eq("id", Value::Int64(1)),
            Predicate::not(Predicate::is_null("name")),
        );
        assert_eq!(p.referenced_columns(), vec!["id", "name"]);
    }

    #[test]
    fn test_evaluate_comparisons() {
        let s = schema();
        let row = vec![Value::Int64(5), Value::Utf8("alice".into())];
        assert_eq!(
            Predicate::gt("id", Value::Int64(3)).evaluate(&s, &row),
            Some(true)
        );
        assert_eq!(
            Predicate::lt_eq("id", Value::Int64(4)).evaluate(&s, &row),
            Some(false)
        );
        assert_eq!(
            Predicate::starts_with("name", "al").evaluate(&s, &row),
            Some(true)
        );
    }

    #[test]
    fn test_evaluate_three_valued_logic() {
        let s = schema();
        let row = vec![Value::Int64(5), Value::Null];
        let unknown = Predicate::eq("name", Value::Utf8("x".into()));
        assert_eq!(unknown.evaluate(&s, &row), None);
        assert_eq!(
            Predicate::not(unknown.clone()).evaluate(&s, &row),
            None
        );
        assert_eq!(
            Predicate::or(unknown.clone(), Predicate::eq("id", Value::Int64(5)))
                .evaluate(&s, &row),
            Some(true)
        );
        assert_eq!(
            Predicate::and(unknown, Predicate::eq("id", Value::Int64(6))).evaluate(&s, &row),
            Some(false)
        );
        assert_eq!(Predicate::is_null("name").evaluate(&s, &row), Some(true));
    }

    #[test]
    fn test_evaluate_in_list_with_null_member() {
        let s = schema();
        let row = vec![Value::Int64(5), Value::Null];
        let p = Predicate::in_list("id", vec![Value::Int64(1), Value::Null]);
        assert_eq!(p.evaluate(&s, &row), None);
        let p = Predicate::in_list("id", vec![Value::Int64(5), Value::Null]);
        assert_eq!(p.evaluate(&s, &row), Some(true));
    }
}
