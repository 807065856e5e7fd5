//! SQL rendering differences between backends

use std::fmt;

use serde::{Deserialize, Serialize};

/// SQL dialect of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    DuckDb,
    Postgres,
}

impl Dialect {
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::DuckDb => "duckdb",
            Dialect::Postgres => "postgres",
        }
    }

    /// `DROP TABLE` that also removes dependent objects
    pub fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {} CASCADE", table)
    }

    /// Placeholder for the `index`-th (1-based) parameter bound into a column of `sql_type`
    ///
    /// PostgreSQL infers parameter types from the target column. DuckDB
    /// gets an explicit cast so text-encoded decimals and timestamps land typed.
    pub fn placeholder(&self, index: usize, sql_type: &str) -> String {
        match self {
            Dialect::Postgres => format!("${}", index),
            Dialect::DuckDb => format!("CAST(${} AS {})", index, sql_type),
        }
    }

    /// Statements that must run before a table with a surrogate key is created
    pub fn surrogate_key_prelude(&self, schema: &str, table: &str) -> Option<String> {
        match self {
            Dialect::Postgres => None,
            Dialect::DuckDb => Some(format!(
                "CREATE SEQUENCE IF NOT EXISTS {}.{} START 1",
                schema,
                sequence_name(table)
            )),
        }
    }

    /// Column definition for an auto-assigned integer surrogate key
    pub fn surrogate_key_column(&self, column: &str, schema: &str, table: &str) -> String {
        match self {
            Dialect::Postgres => format!("{} SERIAL PRIMARY KEY", column),
            Dialect::DuckDb => format!(
                "{} INTEGER PRIMARY KEY DEFAULT nextval('{}.{}')",
                column,
                schema,
                sequence_name(table)
            ),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn sequence_name(table: &str) -> String {
    format!("seq_{}", table)
}

/// Quote an identifier with double quotes, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote every part of a dotted name: `Sales.Customer` -> `"Sales"."Customer"`
pub fn quote_qualified(name: &str) -> String {
    name.split('.')
        .map(quote_ident)
        .collect::<Vec<_>>()
        .join(".")
}
