//! Star schema DDL

use tracing::{debug, info};

use super::error::WarehouseError;
use crate::store::{Dialect, SqlStore, quote_ident};

pub const DIM_DATE: &str = "dim_date";
pub const DIM_CUSTOMER: &str = "dim_customer";
pub const DIM_PRODUCT: &str = "dim_product";
pub const DIM_REGION: &str = "dim_region";
pub const DIM_SALESPERSON: &str = "dim_salesperson";
pub const DIM_OFFER: &str = "dim_offer";
pub const FACT_SALES: &str = "fact_sales";

/// Resolves staging and warehouse table names to qualified SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    staging_schema: String,
    warehouse_schema: String,
}

impl TableNames {
    pub fn new(staging_schema: impl Into<String>, warehouse_schema: impl Into<String>) -> Self {
        Self {
            staging_schema: staging_schema.into(),
            warehouse_schema: warehouse_schema.into(),
        }
    }

    pub fn warehouse_schema(&self) -> &str {
        &self.warehouse_schema
    }

    /// Qualified staging table
    pub fn staging(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.staging_schema), quote_ident(table))
    }

    /// Qualified warehouse table
    pub fn warehouse(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.warehouse_schema), quote_ident(table))
    }
}

/// Columns after the surrogate key, per dimension table
const DIMENSION_COLUMNS: &[(&str, &str, &str)] = &[
    (
        DIM_CUSTOMER,
        "customer_sk",
        "customer_nk INTEGER NOT NULL UNIQUE,
        first_name TEXT,
        last_name TEXT,
        full_name TEXT,
        customer_type TEXT,
        segment TEXT,
        registered_on DATE,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
    ),
    (
        DIM_PRODUCT,
        "product_sk",
        "product_nk INTEGER NOT NULL UNIQUE,
        product_name TEXT,
        product_number TEXT,
        category TEXT,
        subcategory TEXT,
        product_line TEXT,
        color TEXT,
        size TEXT,
        weight NUMERIC(10,2),
        unit_cost NUMERIC(15,4),
        list_price NUMERIC(15,4),
        margin_pct NUMERIC(9,2),
        valid_from DATE,
        is_active BOOLEAN,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
    ),
    (
        DIM_REGION,
        "region_sk",
        "region_nk INTEGER NOT NULL UNIQUE,
        territory_name TEXT,
        country_code TEXT,
        country_name TEXT,
        continent TEXT,
        region_group TEXT,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
    ),
    (
        DIM_SALESPERSON,
        "salesperson_sk",
        "salesperson_nk INTEGER NOT NULL UNIQUE,
        salesperson_name TEXT,
        salesperson_code TEXT,
        region_sk INTEGER,
        hired_on DATE,
        annual_quota NUMERIC(18,2),
        commission_pct NUMERIC(7,4),
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
    ),
    (
        DIM_OFFER,
        "offer_sk",
        "offer_nk INTEGER NOT NULL UNIQUE,
        description TEXT,
        offer_type TEXT,
        discount_pct NUMERIC(7,4),
        starts_on DATE,
        ends_on DATE,
        min_qty INTEGER,
        max_qty INTEGER,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
    ),
];

/// Idempotent creation of the warehouse schema and its tables
pub struct StarSchema {
    names: TableNames,
}

impl StarSchema {
    pub fn new(names: TableNames) -> Self {
        Self { names }
    }

    /// DDL statements for a dialect, in execution order
    pub fn statements(&self, dialect: Dialect) -> Vec<String> {
        let schema = self.names.warehouse_schema();
        let mut statements = vec![format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(schema))];

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (
        date_key INTEGER PRIMARY KEY,
        full_date DATE NOT NULL,
        calendar_year SMALLINT NOT NULL,
        calendar_quarter SMALLINT NOT NULL,
        calendar_month SMALLINT NOT NULL,
        day_of_month SMALLINT NOT NULL,
        iso_week SMALLINT NOT NULL,
        day_of_week SMALLINT NOT NULL,
        month_name TEXT NOT NULL,
        day_name TEXT NOT NULL,
        is_weekend BOOLEAN NOT NULL,
        is_holiday BOOLEAN NOT NULL
    )",
            self.names.warehouse(DIM_DATE)
        ));

        for (table, key, columns) in DIMENSION_COLUMNS {
            if let Some(prelude) = dialect.surrogate_key_prelude(schema, table) {
                statements.push(prelude);
            }
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (
        {},
        {}
    )",
                self.names.warehouse(table),
                dialect.surrogate_key_column(key, schema, table),
                columns
            ));
        }

        statements.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (
        order_id INTEGER NOT NULL,
        order_line_id INTEGER NOT NULL,
        date_key INTEGER NOT NULL,
        customer_sk INTEGER,
        product_sk INTEGER,
        region_sk INTEGER,
        salesperson_sk INTEGER,
        offer_sk INTEGER,
        quantity INTEGER,
        unit_price NUMERIC(15,4),
        gross_value NUMERIC(18,4),
        discount_value NUMERIC(18,4),
        net_value NUMERIC(18,4),
        total_cost NUMERIC(18,4),
        gross_profit NUMERIC(18,4),
        discount_pct NUMERIC(9,2),
        contribution_margin_pct NUMERIC(9,2),
        loaded_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (order_id, order_line_id)
    )",
            self.names.warehouse(FACT_SALES)
        ));

        statements
    }

    /// Create anything missing; existing tables and rows are left alone
    pub async fn ensure(&self, store: &dyn SqlStore) -> Result<(), WarehouseError> {
        let statements = self.statements(store.dialect());
        for sql in &statements {
            store.execute(sql).await.map_err(WarehouseError::Schema)?;
        }
        debug!(statements = statements.len(), "Applied star schema DDL");
        info!(schema = %self.names.warehouse_schema(), "Star schema ready");
        Ok(())
    }
}
