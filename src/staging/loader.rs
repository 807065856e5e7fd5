//! Staging loader

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::config::StagingConfig;
use super::error::StagingError;
use crate::config::TableMapping;
use crate::inference::{InferredColumn, infer_columns};
use crate::store::{BatchInsert, SqlStore, quote_ident, quote_qualified};

/// Outcome of staging one source table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedTable {
    pub source: String,
    pub target: String,
    pub rows: u64,
    pub columns: Vec<InferredColumn>,
    /// Source was empty; a one-column placeholder was created
    pub placeholder: bool,
    pub duration_ms: u64,
}

/// Copies mapped source tables into schema-inferred staging tables
pub struct StagingLoader {
    config: StagingConfig,
    mappings: Vec<TableMapping>,
}

impl StagingLoader {
    pub fn new(config: StagingConfig, mappings: Vec<TableMapping>) -> Self {
        Self { config, mappings }
    }

    pub fn mappings(&self) -> &[TableMapping] {
        &self.mappings
    }

    /// Qualified, quoted name of a staging table
    pub fn staging_table(&self, name: &str) -> String {
        format!("{}.{}", quote_ident(&self.config.schema), quote_ident(name))
    }

    /// Stage every mapping in configuration order, stopping at the first failure
    pub async fn load_all(
        &self,
        source: &dyn SqlStore,
        dest: &dyn SqlStore,
    ) -> Result<Vec<StagedTable>, StagingError> {
        self.config.validate().map_err(StagingError::InvalidConfig)?;
        self.ensure_schema(dest).await?;

        let mut staged = Vec::with_capacity(self.mappings.len());
        for mapping in &self.mappings {
            staged.push(self.load_table(source, dest, mapping).await?);
        }

        let total_rows: u64 = staged.iter().map(|t| t.rows).sum();
        info!(
            tables = staged.len(),
            rows = total_rows,
            placeholders = staged.iter().filter(|t| t.placeholder).count(),
            "Staging complete"
        );
        Ok(staged)
    }

    /// Create the staging namespace if missing
    pub async fn ensure_schema(&self, dest: &dyn SqlStore) -> Result<(), StagingError> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            quote_ident(&self.config.schema)
        );
        dest.execute(&sql)
            .await
            .map(|_| ())
            .map_err(|error| StagingError::Ddl {
                table: self.config.schema.clone(),
                error,
            })
    }

    /// Stage a single mapping
    pub async fn load_table(
        &self,
        source: &dyn SqlStore,
        dest: &dyn SqlStore,
        mapping: &TableMapping,
    ) -> Result<StagedTable, StagingError> {
        let start = Instant::now();
        let target = self.staging_table(&mapping.staging);

        let extract_sql = format!("SELECT * FROM {}", quote_qualified(&mapping.source));
        let extracted = source
            .query(&extract_sql)
            .await
            .map_err(|error| StagingError::Extract {
                source_table: mapping.source.clone(),
                error,
            })?;
        debug!(
            source = %mapping.source,
            rows = extracted.len(),
            columns = extracted.columns.len(),
            "Extracted source table"
        );

        let ddl_error = |error| StagingError::Ddl {
            table: mapping.staging.clone(),
            error,
        };

        dest.execute(&dest.dialect().drop_table(&target))
            .await
            .map_err(ddl_error)?;

        if extracted.is_empty() {
            warn!(
                source = %mapping.source,
                target = %mapping.staging,
                "Source table is empty, creating placeholder"
            );
            dest.execute(&format!("CREATE TABLE {} (placeholder INTEGER)", target))
                .await
                .map_err(ddl_error)?;
            return Ok(StagedTable {
                source: mapping.source.clone(),
                target: mapping.staging.clone(),
                rows: 0,
                columns: Vec::new(),
                placeholder: true,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        let columns = infer_columns(
            &extracted.columns,
            &extracted.rows,
            self.config.sample_size,
        );
        dest.execute(&create_table_sql(&target, &columns))
            .await
            .map_err(ddl_error)?;

        let insert = BatchInsert::new(
            target.clone(),
            columns
                .iter()
                .map(|c| (quote_ident(&c.name), c.storage_type.sql_name().to_string()))
                .collect(),
            self.config.batch_size,
        );
        let rows = insert
            .execute(dest, &extracted.rows)
            .await
            .map_err(|error| StagingError::BulkLoad {
                table: mapping.staging.clone(),
                error,
            })?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            source = %mapping.source,
            target = %mapping.staging,
            rows,
            columns = columns.len(),
            duration_ms,
            "Staged table"
        );

        Ok(StagedTable {
            source: mapping.source.clone(),
            target: mapping.staging.clone(),
            rows,
            columns,
            placeholder: false,
            duration_ms,
        })
    }
}

/// `CREATE TABLE` with the source's column names and order
fn create_table_sql(table: &str, columns: &[InferredColumn]) -> String {
    let defs = columns
        .iter()
        .map(|c| format!("{} {}", quote_ident(&c.name), c.storage_type.sql_name()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", table, defs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::StorageType;

    #[test]
    fn test_create_table_preserves_order() {
        let columns = vec![
            InferredColumn {
                name: "SalesOrderID".to_string(),
                storage_type: StorageType::Integer,
            },
            InferredColumn {
                name: "UnitPrice".to_string(),
                storage_type: StorageType::Decimal,
            },
            InferredColumn {
                name: "ModifiedDate".to_string(),
                storage_type: StorageType::Timestamp,
            },
        ];
        assert_eq!(
            create_table_sql("\"staging\".\"stage_order_details\"", &columns),
            "CREATE TABLE \"staging\".\"stage_order_details\" (\"SalesOrderID\" BIGINT, \"UnitPrice\" NUMERIC(18,4), \"ModifiedDate\" TIMESTAMP)"
        );
    }

    #[test]
    fn test_staging_table_is_qualified() {
        let loader = StagingLoader::new(StagingConfig::default(), Vec::new());
        assert_eq!(
            loader.staging_table("stage_customers"),
            "\"staging\".\"stage_customers\""
        );
    }
}
