//! Staging extraction
//!
//! Copies every mapped source table into a schema-inferred staging table
//! under a dedicated namespace. Each run drops and recreates the tables:
//!
//! 1. Extract all rows and column names from the source (no watermark)
//! 2. Drop the staging table, cascading to dependents
//! 3. Empty source: create a one-column placeholder table and move on
//! 4. Otherwise infer column types from a bounded prefix sample, create the
//!    table with the source's column order, and bulk-insert in batches
//!
//! # Example
//!
//! ```rust,ignore
//! use salesdw::staging::{StagingConfig, StagingLoader};
//!
//! let loader = StagingLoader::new(StagingConfig::default(), config.tables.clone());
//! for table in loader.load_all(source.as_ref(), dest.as_ref()).await? {
//!     println!("{} -> {} ({} rows)", table.source, table.target, table.rows);
//! }
//! ```

mod config;
mod error;
mod loader;
pub mod tables;

pub use config::{StagingConfig, StagingConfigBuilder};
pub use error::StagingError;
pub use loader::{StagedTable, StagingLoader};
