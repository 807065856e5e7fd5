//! Storage type tags and the promotion table

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::SqlValue;

/// Storage type assigned to a staged column
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Boolean,
    Integer,
    Float,
    /// Fixed-point, stored as NUMERIC(18,4)
    Decimal,
    Timestamp,
    Text,
}

impl StorageType {
    /// Column type used in staging DDL
    pub fn sql_name(&self) -> &'static str {
        match self {
            StorageType::Boolean => "BOOLEAN",
            StorageType::Integer => "BIGINT",
            StorageType::Float => "DOUBLE PRECISION",
            StorageType::Decimal => "NUMERIC(18,4)",
            StorageType::Timestamp => "TIMESTAMP",
            StorageType::Text => "TEXT",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StorageType::Boolean => "boolean",
            StorageType::Integer => "integer",
            StorageType::Float => "float",
            StorageType::Decimal => "decimal",
            StorageType::Timestamp => "timestamp",
            StorageType::Text => "text",
        }
    }

    /// Reduce a set of observed tags to one storage type
    pub fn promote(observed: &BTreeSet<StorageType>) -> StorageType {
        let mut iter = observed.iter();
        match (iter.next(), iter.next(), iter.next()) {
            (None, _, _) => StorageType::Text,
            (Some(only), None, _) => *only,
            (Some(StorageType::Integer), Some(StorageType::Decimal), None) => StorageType::Decimal,
            _ => StorageType::Text,
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "boolean" | "bool" => Ok(StorageType::Boolean),
            "integer" | "int" => Ok(StorageType::Integer),
            "float" | "double" => Ok(StorageType::Float),
            "decimal" | "numeric" => Ok(StorageType::Decimal),
            "timestamp" => Ok(StorageType::Timestamp),
            "text" => Ok(StorageType::Text),
            _ => Err(format!("Unknown storage type: {}", s)),
        }
    }
}

/// Classify one value; nulls carry no type information
pub fn classify(value: &SqlValue) -> Option<StorageType> {
    match value {
        SqlValue::Null => None,
        SqlValue::Bool(_) => Some(StorageType::Boolean),
        SqlValue::Int(_) => Some(StorageType::Integer),
        SqlValue::Float(_) => Some(StorageType::Float),
        SqlValue::Decimal(_) => Some(StorageType::Decimal),
        SqlValue::Date(_) | SqlValue::Timestamp(_) => Some(StorageType::Timestamp),
        SqlValue::Text(_) => Some(StorageType::Text),
    }
}

/// Infer a storage type from a sample of one column's values
pub fn infer_storage_type<'a, I>(sample: I) -> StorageType
where
    I: IntoIterator<Item = &'a SqlValue>,
{
    let observed: BTreeSet<StorageType> = sample.into_iter().filter_map(classify).collect();
    StorageType::promote(&observed)
}

/// A staged column with its inferred type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferredColumn {
    pub name: String,
    pub storage_type: StorageType,
}

/// Infer every column independently over the first `sample_size` rows
pub fn infer_columns(
    columns: &[String],
    rows: &[Vec<SqlValue>],
    sample_size: usize,
) -> Vec<InferredColumn> {
    let sample = &rows[..rows.len().min(sample_size)];
    columns
        .iter()
        .enumerate()
        .map(|(idx, name)| InferredColumn {
            name: name.clone(),
            storage_type: infer_storage_type(sample.iter().filter_map(|row| row.get(idx))),
        })
        .collect()
}
