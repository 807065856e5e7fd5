//! Embedded DuckDB store

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use duckdb::types::{TimeUnit, ToSqlOutput, Value};
use duckdb::{Connection, ToSql};
use rust_decimal::Decimal;
use tracing::debug;

use super::{Dialect, SqlStore, StoreError};
use crate::value::{RowSet, SqlValue};

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// DuckDB-backed store
///
/// One connection guarded by a mutex; statements run one at a time.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
    path: Option<String>,
}

impl DuckDbStore {
    /// Open or create a database file
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Connection(e.to_string()))?;
        debug!(path, "Opened DuckDB store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database
    pub fn memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database path (if not in-memory)
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("DuckDB connection lock poisoned".to_string()))
    }

    fn query_sync(&self, sql: &str) -> Result<RowSet, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| StoreError::query(sql, e))?;
        let mut rows = stmt.query([]).map_err(|e| StoreError::query(sql, e))?;

        // Column names are only known after execution
        let column_count = rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                rows.as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut result = RowSet {
            columns,
            rows: Vec::new(),
        };

        while let Some(row) = rows.next().map_err(|e| StoreError::query(sql, e))? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let value: Value = row.get(i).map_err(|e| StoreError::query(sql, e))?;
                values.push(from_duckdb(value));
            }
            result.rows.push(values);
        }

        Ok(result)
    }

    fn execute_sync(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| StoreError::query(sql, e))?;
        let n = stmt
            .execute(duckdb::params_from_iter(params.iter()))
            .map_err(|e| StoreError::query(sql, e))?;
        Ok(n as u64)
    }
}

#[async_trait]
impl SqlStore for DuckDbStore {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDb
    }

    async fn query(&self, sql: &str) -> Result<RowSet, StoreError> {
        self.query_sync(sql)
    }

    async fn execute(&self, sql: &str) -> Result<u64, StoreError> {
        self.execute_sync(sql, &[])
    }

    async fn execute_with(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        self.execute_sync(sql, params)
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute_batch(sql).map_err(|e| StoreError::query(sql, e))
    }
}

/// Decimals and timestamps travel as text; placeholders cast them back
impl ToSql for SqlValue {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let value = match self {
            SqlValue::Null => Value::Null,
            SqlValue::Bool(b) => Value::Boolean(*b),
            SqlValue::Int(n) => Value::BigInt(*n),
            SqlValue::Float(x) => Value::Double(*x),
            other => Value::Text(other.to_string()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

fn from_duckdb(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Boolean(b) => SqlValue::Bool(b),
        Value::TinyInt(n) => SqlValue::Int(n.into()),
        Value::SmallInt(n) => SqlValue::Int(n.into()),
        Value::Int(n) => SqlValue::Int(n.into()),
        Value::BigInt(n) => SqlValue::Int(n),
        Value::UTinyInt(n) => SqlValue::Int(n.into()),
        Value::USmallInt(n) => SqlValue::Int(n.into()),
        Value::UInt(n) => SqlValue::Int(n.into()),
        Value::UBigInt(n) => match i64::try_from(n) {
            Ok(n) => SqlValue::Int(n),
            Err(_) => SqlValue::Decimal(Decimal::from(n)),
        },
        Value::HugeInt(n) => match i64::try_from(n) {
            Ok(n) => SqlValue::Int(n),
            Err(_) => Decimal::try_from_i128_with_scale(n, 0)
                .map(SqlValue::Decimal)
                .unwrap_or_else(|_| SqlValue::Text(n.to_string())),
        },
        Value::Float(x) => SqlValue::Float(x.into()),
        Value::Double(x) => SqlValue::Float(x),
        Value::Decimal(d) => SqlValue::Decimal(d),
        Value::Timestamp(unit, raw) => {
            let micros = match unit {
                TimeUnit::Second => raw.saturating_mul(1_000_000),
                TimeUnit::Millisecond => raw.saturating_mul(1_000),
                TimeUnit::Microsecond => raw,
                TimeUnit::Nanosecond => raw / 1_000,
            };
            DateTime::from_timestamp_micros(micros)
                .map(|dt| SqlValue::Timestamp(dt.naive_utc()))
                .unwrap_or(SqlValue::Null)
        }
        Value::Date32(days) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null),
        Value::Text(s) => SqlValue::Text(s),
        Value::Enum(s) => SqlValue::Text(s),
        other => SqlValue::Text(format!("{:?}", other)),
    }
}
