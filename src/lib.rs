//! salesdw - staged dimensional loads from an operational sales database
//!
//! Provides:
//! - Relational store abstraction over DuckDB and PostgreSQL
//! - Sample-based storage type inference for staged tables
//! - Staging extraction of a fixed set of source tables
//! - Star schema loading (date seed, dimension upserts, write-once facts)
//! - An explicit stage graph and executor for whole runs
//! - Read-only KPI reports over the finished warehouse

pub mod config;
pub mod inference;
pub mod pipeline;
pub mod reporting;
pub mod staging;
pub mod store;
pub mod value;
pub mod warehouse;

pub use config::{ConnectionConfig, EtlConfig};
pub use pipeline::{PipelineConfig, PipelineError, PipelineExecutor, RunReport, StageGraph, StageId};
pub use store::{SqlStore, StoreError};
pub use value::{RowSet, SqlValue};
