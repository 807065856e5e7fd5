//! Star schema loading
//!
//! The analytical side of a run, in dependency order:
//!
//! - [`StarSchema`]: idempotent bootstrap of the dimension and fact tables
//! - [`CalendarSeeder`]: one-time seed of the date dimension
//! - [`DimensionUpserter`]: natural-key upserts for customer, product,
//!   region, salesperson and offer (region before salesperson)
//! - [`FactLoader`]: write-once sales facts with derived metrics
//!
//! Surrogate keys of the date dimension are computed from the date
//! (`YYYYMMDD` as an integer), so facts never look them up.

mod calendar;
mod dimensions;
mod error;
mod facts;
mod schema;

pub use calendar::{CalendarDay, CalendarSeeder, SeedOutcome, calendar_rows, date_key};
pub use dimensions::{Dimension, DimensionSpec, DimensionUpserter};
pub use error::WarehouseError;
pub use facts::{FactLoadStats, FactLoader, SaleMetrics};
pub use schema::{StarSchema, TableNames};
