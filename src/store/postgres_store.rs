//! PostgreSQL store over `tokio-postgres`

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error};

use super::{Dialect, SqlStore, StoreError};
use crate::config::ConnectionConfig;
use crate::value::{RowSet, SqlValue};

type Param = Box<dyn ToSql + Sync + Send>;

/// PostgreSQL-backed store
pub struct PostgresStore {
    client: Client,
    description: String,
}

impl PostgresStore {
    /// Connect and spawn the connection task on the current runtime
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, StoreError> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user);
        if let Some(ref password) = config.password {
            pg.password(password);
        }

        let (client, connection) = pg
            .connect(NoTls)
            .await
            .map_err(|e| StoreError::Connection(format!("{}: {}", config.describe(), e)))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        debug!(target_db = %config.describe(), "Connected to PostgreSQL");
        Ok(Self {
            client,
            description: config.describe(),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

#[async_trait]
impl SqlStore for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn query(&self, sql: &str) -> Result<RowSet, StoreError> {
        let stmt = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| StoreError::query(sql, e))?;
        let rows = self
            .client
            .query(&stmt, &[])
            .await
            .map_err(|e| StoreError::query(sql, e))?;

        let columns: Vec<String> = stmt.columns().iter().map(|c| c.name().to_string()).collect();
        let mut result = RowSet {
            columns,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in &rows {
            let values = stmt
                .columns()
                .iter()
                .enumerate()
                .map(|(idx, col)| decode(row, idx, col.type_()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StoreError::query(sql, e))?;
            result.rows.push(values);
        }
        Ok(result)
    }

    async fn execute(&self, sql: &str) -> Result<u64, StoreError> {
        self.client
            .execute(sql, &[])
            .await
            .map_err(|e| StoreError::query(sql, e))
    }

    async fn execute_with(&self, sql: &str, params: &[SqlValue]) -> Result<u64, StoreError> {
        let stmt = self
            .client
            .prepare(sql)
            .await
            .map_err(|e| StoreError::query(sql, e))?;

        if stmt.params().len() != params.len() {
            return Err(StoreError::query(
                sql,
                format!(
                    "expected {} parameters, got {}",
                    stmt.params().len(),
                    params.len()
                ),
            ));
        }

        let encoded = stmt
            .params()
            .iter()
            .zip(params)
            .map(|(ty, value)| encode(value, ty))
            .collect::<Result<Vec<Param>, _>>()?;
        let refs: Vec<&(dyn ToSql + Sync)> = encoded
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        self.client
            .execute(&stmt, &refs)
            .await
            .map_err(|e| StoreError::query(sql, e))
    }

    async fn batch_execute(&self, sql: &str) -> Result<(), StoreError> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| StoreError::query(sql, e))
    }
}

fn decode(row: &Row, idx: usize, ty: &Type) -> Result<SqlValue, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.into(),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx)?.map(i64::from).into(),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx)?.into(),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx)?.map(f64::from).into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(idx)?.into(),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.into(),
        Type::TIMESTAMP => row.try_get::<_, Option<NaiveDateTime>>(idx)?.into(),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(|dt| dt.naive_utc())
            .into(),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(idx)?.into()
        }
        _ => match row.try_get::<_, Option<String>>(idx) {
            Ok(text) => text.into(),
            Err(_) => SqlValue::Text(format!("<{}>", ty.name())),
        },
    };
    Ok(value)
}

/// Encode a value for a parameter whose type the server inferred
///
/// Lossless widenings are allowed (integer into NUMERIC, anything into
/// TEXT). Anything else is an encode error rather than a silent coercion.
fn encode(value: &SqlValue, ty: &Type) -> Result<Param, StoreError> {
    let mismatch = || StoreError::Encode {
        value: value.to_string(),
        target: ty.name().to_string(),
    };

    let param: Param = match *ty {
        Type::BOOL => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(*b),
            _ => return Err(mismatch()),
        }),
        Type::INT2 => Box::new(
            integer(value)
                .ok_or_else(mismatch)?
                .map(i16::try_from)
                .transpose()
                .map_err(|_| mismatch())?,
        ),
        Type::INT4 => Box::new(
            integer(value)
                .ok_or_else(mismatch)?
                .map(i32::try_from)
                .transpose()
                .map_err(|_| mismatch())?,
        ),
        Type::INT8 => Box::new(integer(value).ok_or_else(mismatch)?),
        Type::FLOAT4 | Type::FLOAT8 => {
            let x = float(value).ok_or_else(mismatch)?;
            if *ty == Type::FLOAT4 {
                Box::new(x.map(|x| x as f32)) as Param
            } else {
                Box::new(x) as Param
            }
        }
        Type::NUMERIC => Box::new(decimal(value).ok_or_else(mismatch)?),
        Type::DATE => Box::new(match value {
            SqlValue::Null => None,
            SqlValue::Date(d) => Some(*d),
            SqlValue::Timestamp(ts) if ts.time() == chrono::NaiveTime::MIN => Some(ts.date()),
            _ => return Err(mismatch()),
        }),
        Type::TIMESTAMP | Type::TIMESTAMPTZ => {
            let ts = match value {
                SqlValue::Null => None,
                SqlValue::Timestamp(ts) => Some(*ts),
                SqlValue::Date(d) => Some(d.and_time(chrono::NaiveTime::MIN)),
                _ => return Err(mismatch()),
            };
            if *ty == Type::TIMESTAMPTZ {
                Box::new(ts.map(|ts| ts.and_utc())) as Param
            } else {
                Box::new(ts) as Param
            }
        }
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            Box::new(match value {
                SqlValue::Null => None,
                other => Some(other.to_string()),
            })
        }
        _ => return Err(mismatch()),
    };
    Ok(param)
}

/// `None` when the value cannot be represented; `Some(None)` for NULL
fn integer(value: &SqlValue) -> Option<Option<i64>> {
    match value {
        SqlValue::Null => Some(None),
        SqlValue::Int(n) => Some(Some(*n)),
        SqlValue::Decimal(d) if d.fract().is_zero() => d.to_i64().map(Some),
        _ => None,
    }
}

fn float(value: &SqlValue) -> Option<Option<f64>> {
    match value {
        SqlValue::Null => Some(None),
        SqlValue::Int(n) => Some(Some(*n as f64)),
        SqlValue::Float(x) => Some(Some(*x)),
        SqlValue::Decimal(d) => d.to_f64().map(Some),
        _ => None,
    }
}

fn decimal(value: &SqlValue) -> Option<Option<Decimal>> {
    match value {
        SqlValue::Null => Some(None),
        SqlValue::Int(n) => Some(Some(Decimal::from(*n))),
        SqlValue::Decimal(d) => Some(Some(*d)),
        SqlValue::Float(x) => Decimal::from_f64(*x).map(Some),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_widening() {
        assert_eq!(integer(&SqlValue::Int(5)), Some(Some(5)));
        assert_eq!(integer(&SqlValue::Null), Some(None));
        assert_eq!(integer(&SqlValue::Text("5".into())), None);
        assert_eq!(
            decimal(&SqlValue::Int(5)),
            Some(Some(Decimal::from(5)))
        );
    }

    #[test]
    fn test_encode_rejects_text_into_numeric() {
        let err = encode(&SqlValue::Text("abc".into()), &Type::NUMERIC).err();
        assert!(matches!(err, Some(StoreError::Encode { .. })));
        assert!(encode(&SqlValue::Int(1), &Type::TEXT).is_ok());
        assert!(encode(&SqlValue::Int(70_000), &Type::INT2).is_err());
        assert!(encode(&SqlValue::Null, &Type::BOOL).is_ok());
    }
}
