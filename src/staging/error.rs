//! Error types for staging extraction

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while staging a source table
#[derive(Error, Debug)]
pub enum StagingError {
    /// Reading the source table failed
    #[error("Failed to extract {source_table}: {error}")]
    Extract {
        source_table: String,
        #[source]
        error: StoreError,
    },

    /// Dropping or creating the staging table failed
    #[error("Failed to prepare staging table {table}: {error}")]
    Ddl {
        table: String,
        #[source]
        error: StoreError,
    },

    /// Bulk insert failed, usually a value outside the inferred type
    #[error("Bulk load into {table} failed: {error}")]
    BulkLoad {
        table: String,
        #[source]
        error: StoreError,
    },

    #[error("Invalid staging configuration: {0}")]
    InvalidConfig(String),
}

impl StagingError {
    /// Staging table (or source) the error refers to
    pub fn table(&self) -> Option<&str> {
        match self {
            StagingError::Extract { source_table, .. } => Some(source_table),
            StagingError::Ddl { table, .. } | StagingError::BulkLoad { table, .. } => Some(table),
            StagingError::InvalidConfig(_) => None,
        }
    }

    /// Get a user-friendly error message with hints
    pub fn user_message(&self) -> String {
        match self {
            StagingError::Extract { source_table, .. } => format!(
                "{}\n\nHint: Check the source connection and that {} exists and is readable",
                self, source_table
            ),
            StagingError::BulkLoad { .. } => format!(
                "{}\n\nHint: A row outside the inference sample may not fit the inferred column type. \
                 Increase staging.sample_size and re-run.",
                self
            ),
            _ => self.to_string(),
        }
    }
}
