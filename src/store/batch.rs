//! Batched multi-row parameterized inserts

use tracing::debug;

use super::{Dialect, SqlStore, StoreError};
use crate::value::SqlValue;

/// Upper bound on bind parameters in one statement (PostgreSQL wire limit)
const MAX_PARAMS: usize = 65_535;

/// One `INSERT ... VALUES (...), (...)` statement replayed per batch
///
/// Batches are issued sequentially; a failure leaves earlier batches applied.
#[derive(Debug, Clone)]
pub struct BatchInsert {
    table: String,
    columns: Vec<(String, String)>,
    batch_size: usize,
    on_conflict: Option<String>,
}

impl BatchInsert {
    /// `table` is already qualified and quoted; columns are `(quoted name, SQL type)` pairs
    pub fn new(table: impl Into<String>, columns: Vec<(String, String)>, batch_size: usize) -> Self {
        Self {
            table: table.into(),
            columns,
            batch_size: batch_size.max(1),
            on_conflict: None,
        }
    }

    /// Append an `ON CONFLICT` clause, e.g. `(order_id, order_line_id) DO NOTHING`
    pub fn on_conflict(mut self, clause: impl Into<String>) -> Self {
        self.on_conflict = Some(clause.into());
        self
    }

    /// Effective rows per statement after applying the parameter limit
    pub fn rows_per_statement(&self) -> usize {
        let width = self.columns.len().max(1);
        self.batch_size.min(MAX_PARAMS / width).max(1)
    }

    /// Render the statement for `rows` rows
    pub fn statement(&self, dialect: Dialect, rows: usize) -> String {
        let names = self
            .columns
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let width = self.columns.len();
        let tuples = (0..rows)
            .map(|row| {
                let cells = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(col, (_, sql_type))| dialect.placeholder(row * width + col + 1, sql_type))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", cells)
            })
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("INSERT INTO {} ({}) VALUES {}", self.table, names, tuples);
        if let Some(ref clause) = self.on_conflict {
            sql.push_str(" ON CONFLICT ");
            sql.push_str(clause);
        }
        sql
    }

    /// Insert every row, returning the summed rows affected
    pub async fn execute(
        &self,
        store: &dyn SqlStore,
        rows: &[Vec<SqlValue>],
    ) -> Result<u64, StoreError> {
        if rows.is_empty() || self.columns.is_empty() {
            return Ok(0);
        }

        let dialect = store.dialect();
        let per_statement = self.rows_per_statement();
        let full_statement = self.statement(dialect, per_statement);
        let mut affected = 0;

        for (batch_no, chunk) in rows.chunks(per_statement).enumerate() {
            let params: Vec<SqlValue> = chunk
                .iter()
                .flat_map(|row| {
                    let mut row = row.clone();
                    row.resize(self.columns.len(), SqlValue::Null);
                    row
                })
                .collect();

            let n = if chunk.len() == per_statement {
                store.execute_with(&full_statement, &params).await?
            } else {
                let sql = self.statement(dialect, chunk.len());
                store.execute_with(&sql, &params).await?
            };

            debug!(table = %self.table, batch = batch_no, rows = chunk.len(), "Inserted batch");
            affected += n;
        }

        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert() -> BatchInsert {
        BatchInsert::new(
            "staging.\"stage_x\"",
            vec![
                ("\"id\"".to_string(), "BIGINT".to_string()),
                ("\"price\"".to_string(), "NUMERIC(18,4)".to_string()),
            ],
            500,
        )
    }

    #[test]
    fn test_statement_numbers_placeholders_row_major() {
        let sql = insert().statement(Dialect::Postgres, 2);
        assert_eq!(
            sql,
            "INSERT INTO staging.\"stage_x\" (\"id\", \"price\") VALUES ($1, $2), ($3, $4)"
        );
    }

    #[test]
    fn test_duckdb_statement_casts() {
        let sql = insert()
            .on_conflict("(\"id\") DO NOTHING")
            .statement(Dialect::DuckDb, 1);
        assert_eq!(
            sql,
            "INSERT INTO staging.\"stage_x\" (\"id\", \"price\") VALUES (CAST($1 AS BIGINT), CAST($2 AS NUMERIC(18,4))) ON CONFLICT (\"id\") DO NOTHING"
        );
    }

    #[test]
    fn test_rows_per_statement_capped_by_param_limit() {
        let wide = BatchInsert::new(
            "t",
            (0..200)
                .map(|i| (format!("c{}", i), "TEXT".to_string()))
                .collect(),
            500,
        );
        assert_eq!(wide.rows_per_statement(), 327);
        assert_eq!(insert().rows_per_statement(), 500);
    }
}
