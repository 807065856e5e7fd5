//! Run orchestration
//!
//! A run is an explicit graph of named stages:
//!
//! 1. **calendar_seed**: seed `dim_date` once
//! 2. **staging**: copy every mapped source table into staging
//! 3. **staging_checkpoint**: barrier
//! 4. **dim_customer**, **dim_product**, **dim_region**, **dim_salesperson**,
//!    **dim_offer**: natural-key upserts (region before salesperson)
//! 5. **dimensions_checkpoint**: barrier
//! 6. **fact_sales**: insert order lines not yet loaded
//!
//! Stages run one at a time in graph order. The first failing stage stops
//! the run; every stage is idempotent, so recovery is a full re-run.
//!
//! # Example
//!
//! ```rust,ignore
//! use salesdw::config::EtlConfig;
//! use salesdw::pipeline::{PipelineConfig, PipelineExecutor};
//! use salesdw::store::connect;
//!
//! let etl = EtlConfig::load("salesdw.toml".as_ref())?;
//! let source = connect(&etl.source).await?;
//! let dest = connect(&etl.destination).await?;
//!
//! let config = PipelineConfig::new().with_report_path("last_run.json");
//! let executor = PipelineExecutor::new(etl, config, source, dest)?;
//! let report = executor.run().await?;
//!
//! println!("Run completed in {}", report.duration_formatted());
//! ```

mod config;
mod dag;
mod error;
mod executor;
mod report;

pub use config::PipelineConfig;
pub use dag::{StageGraph, StageId};
pub use error::{PipelineError, PipelineResult};
pub use executor::PipelineExecutor;
pub use report::{RunReport, RunStatus, StageOutput, StageRecord};
