//! SQL generation for push-down scans.
//!
//! The query module is organized into:
//! - `predicate` - filter predicates and their local evaluation
//! - `filter` - translation of predicates into a WHERE clause
//! - `select` - projection, count and describe statements
//! - `unload` - the COPY INTO statement that stages a query result

pub mod filter;
pub mod predicate;
pub mod select;
pub mod unload;

pub use filter::{build_where_clause, translate, unhandled_filters, FilterDialect, WhereClause};
pub use predicate::Predicate;
pub use select::{
    build_count_query, build_describe_query, build_projection_query, quote_column, TableSource,
};
pub use unload::{Compression, UnloadQuery};
