//! Error types for warehouse loads

use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while loading the star schema
#[derive(Error, Debug)]
pub enum WarehouseError {
    #[error("Failed to create star schema: {0}")]
    Schema(#[source] StoreError),

    #[error("Calendar seed failed: {0}")]
    Calendar(#[source] StoreError),

    #[error("Upsert of {dimension} failed: {error}")]
    Dimension {
        dimension: String,
        #[source]
        error: StoreError,
    },

    #[error("Fact load failed: {0}")]
    Fact(#[source] StoreError),

    #[error("Unexpected value in column {column}: {value}")]
    UnexpectedValue { column: String, value: String },
}
