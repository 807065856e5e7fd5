//! Storage type inference for staged columns
//!
//! Staging tables have no predefined schema. Each column's storage type is
//! derived from a bounded sample of the values extracted from the source:
//!
//! 1. Every non-null value is classified into a [`StorageType`] tag
//! 2. The set of distinct tags is reduced through a fixed promotion table
//!
//! | observed tags               | storage type     |
//! |-----------------------------|------------------|
//! | none (all null / no rows)   | `Text`           |
//! | exactly one tag `T`         | `T`              |
//! | `{Integer, Decimal}`        | `Decimal`        |
//! | anything else               | `Text`           |
//!
//! Booleans never merge with numeric tags; sources emit 0/1 both ways.
//!
//! ## Example
//!
//! ```rust
//! use salesdw::inference::{StorageType, infer_storage_type};
//! use salesdw::SqlValue;
//!
//! let sample = [SqlValue::Int(3), SqlValue::Null, SqlValue::Decimal("1.25".parse().unwrap())];
//! assert_eq!(infer_storage_type(&sample), StorageType::Decimal);
//! ```

mod types;

pub use types::{InferredColumn, StorageType, classify, infer_columns, infer_storage_type};
