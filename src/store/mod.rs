//! Relational store abstraction
//!
//! Both the operational source and the analytical destination are treated
//! as opaque stores reachable through a handful of query/execute
//! primitives. Implementations:
//! - [`DuckDbStore`]: embedded DuckDB, file or in-memory (feature `duckdb-backend`)
//! - [`PostgresStore`]: PostgreSQL over `tokio-postgres` (feature `postgres-backend`)
//!
//! SQL differences between the two backends are rendered by [`Dialect`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Backend, ConnectionConfig};
use crate::value::{RowSet, SqlValue};

mod batch;
mod dialect;

#[cfg(feature = "duckdb-backend")]
mod duckdb_store;
#[cfg(feature = "postgres-backend")]
mod postgres_store;

pub use batch::BatchInsert;
pub use dialect::{Dialect, quote_ident, quote_qualified};

#[cfg(feature = "duckdb-backend")]
pub use duckdb_store::DuckDbStore;
#[cfg(feature = "postgres-backend")]
pub use postgres_store::PostgresStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Query failed: {message}\n  SQL: {sql}")]
    Query { sql: String, message: String },
    #[error("Cannot encode value {value} as {target}")]
    Encode { value: String, target: String },
    #[error("Backend '{0}' is not compiled in; rebuild with the matching feature")]
    UnsupportedBackend(String),
    #[error("Store error: {0}")]
    Backend(String),
}

impl StoreError {
    pub(crate) fn query(sql: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Query {
            sql: abbreviate(sql),
            message: err.to_string(),
        }
    }
}

fn abbreviate(sql: &str) -> String {
    const MAX: usize = 240;
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= MAX {
        return flat;
    }
    let mut end = MAX;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &flat[..end])
}

/// Primitives every store provides
///
/// Statements run in autocommit mode: each call is its own transaction.
#[async_trait]
pub trait SqlStore: Send + Sync {
    /// SQL dialect spoken by this store
    fn dialect(&self) -> Dialect;

    /// Run a query and collect every row
    ///
    /// Column names are returned even when the result is empty.
    async fn query(&self, sql: &str) -> Result<RowSet, StoreError>;

    /// Run a single statement, returning the number of rows affected
    async fn execute(&self, sql: &str) -> Result<u64, StoreError>;

    /// Run a single parameterized statement with `$n` placeholders
    async fn execute_with(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError>;

    /// Run several `;`-separated statements, typically DDL
    async fn batch_execute(&self, sql: &str) -> Result<(), StoreError>;
}

/// Open a store for the configured backend
pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn SqlStore>, StoreError> {
    match config.backend {
        #[cfg(feature = "duckdb-backend")]
        Backend::DuckDb => {
            let store = match config.path.as_deref() {
                Some(path) => DuckDbStore::open(path)?,
                None => DuckDbStore::memory()?,
            };
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres-backend")]
        Backend::Postgres => Ok(Arc::new(PostgresStore::connect(config).await?)),
        #[allow(unreachable_patterns)]
        other => Err(StoreError::UnsupportedBackend(other.to_string())),
    }
}

/// Count rows in a table
pub async fn count_rows(store: &dyn SqlStore, table: &str) -> Result<i64, StoreError> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let rows = store.query(&sql).await?;
    Ok(rows.scalar().and_then(SqlValue::as_i64).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_abbreviates_sql() {
        let sql = format!("SELECT {}\n  FROM t", "x, ".repeat(200));
        let err = StoreError::query(&sql, "boom");
        let text = err.to_string();
        assert!(text.contains("boom"));
        assert!(text.contains("..."));
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_short_sql_kept_whole() {
        assert_eq!(abbreviate("SELECT 1\n FROM t"), "SELECT 1 FROM t");
    }
}
