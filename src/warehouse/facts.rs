//! Write-once sales facts

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use tracing::{debug, info};

use super::error::WarehouseError;
use super::schema::{
    DIM_CUSTOMER, DIM_OFFER, DIM_PRODUCT, DIM_REGION, DIM_SALESPERSON, FACT_SALES, TableNames,
};
use crate::staging::tables;
use crate::store::{BatchInsert, SqlStore};
use crate::value::{RowSet, SqlValue};

const FACT_BATCH_ROWS: usize = 500;

/// Largest magnitude a `NUMERIC(9,2)` percentage column holds
pub const PERCENT_LIMIT: Decimal = Decimal::from_parts(999_999_999, 0, 0, false, 2);

/// Derived financial metrics of one order line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaleMetrics {
    pub gross_value: Decimal,
    pub discount_value: Decimal,
    pub net_value: Decimal,
    pub total_cost: Decimal,
    pub gross_profit: Decimal,
    pub discount_pct: Decimal,
    pub contribution_margin_pct: Decimal,
}

impl SaleMetrics {
    /// Compute metrics for `quantity` units
    ///
    /// Contribution margin is 0 unless net value is strictly positive, and
    /// is clamped to [`PERCENT_LIMIT`] when a tiny net value meets a large cost.
    pub fn compute(
        unit_price: Decimal,
        quantity: i64,
        discount_fraction: Decimal,
        unit_cost: Decimal,
    ) -> Self {
        let quantity = Decimal::from(quantity);
        let gross_value = unit_price * quantity;
        let discount_value = gross_value * discount_fraction;
        let net_value = gross_value * (Decimal::ONE - discount_fraction);
        let total_cost = unit_cost * quantity;
        let gross_profit = net_value - total_cost;

        let contribution_margin_pct = if net_value > Decimal::ZERO {
            percent(gross_profit / net_value * Decimal::ONE_HUNDRED)
                .clamp(-PERCENT_LIMIT, PERCENT_LIMIT)
        } else {
            Decimal::ZERO
        };

        Self {
            gross_value,
            discount_value,
            net_value,
            total_cost,
            gross_profit,
            discount_pct: percent(discount_fraction * Decimal::ONE_HUNDRED),
            contribution_margin_pct,
        }
    }
}

fn percent(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Outcome of a fact load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactLoadStats {
    /// Rows new to the fact table in this load
    pub inserted: u64,
    /// Fact table size after the load
    pub total_rows: i64,
    pub total_net_value: Decimal,
    pub total_gross_profit: Decimal,
}

/// Loads order lines into the sales fact table
///
/// Existing `(order_id, order_line_id)` pairs are never touched, so
/// dimension corrections do not flow into facts already loaded.
pub struct FactLoader {
    names: TableNames,
}

/// Insert columns with their SQL types, in candidate row order
const FACT_COLUMNS: &[(&str, &str)] = &[
    ("date_key", "INTEGER"),
    ("customer_sk", "INTEGER"),
    ("product_sk", "INTEGER"),
    ("region_sk", "INTEGER"),
    ("salesperson_sk", "INTEGER"),
    ("offer_sk", "INTEGER"),
    ("order_id", "INTEGER"),
    ("order_line_id", "INTEGER"),
    ("quantity", "INTEGER"),
    ("unit_price", "NUMERIC(15,4)"),
    ("gross_value", "NUMERIC(18,4)"),
    ("discount_value", "NUMERIC(18,4)"),
    ("net_value", "NUMERIC(18,4)"),
    ("total_cost", "NUMERIC(18,4)"),
    ("gross_profit", "NUMERIC(18,4)"),
    ("discount_pct", "NUMERIC(9,2)"),
    ("contribution_margin_pct", "NUMERIC(9,2)"),
];

/// Selected columns that carry keys straight through to the insert
const KEY_COLUMNS: usize = 9;

impl FactLoader {
    pub fn new(names: TableNames) -> Self {
        Self { names }
    }

    /// Order lines not yet loaded, with surrogate keys resolved
    ///
    /// Columns: the nine key/quantity columns of [`FACT_COLUMNS`], then
    /// unit price, discount fraction and unit cost.
    pub fn candidate_query(&self) -> String {
        let n = &self.names;
        format!(
            r#"SELECT
    (EXTRACT(YEAR FROM h."OrderDate"::DATE) * 10000
        + EXTRACT(MONTH FROM h."OrderDate"::DATE) * 100
        + EXTRACT(DAY FROM h."OrderDate"::DATE))::INTEGER AS date_key,
    c.customer_sk,
    p.product_sk,
    r.region_sk,
    s.salesperson_sk,
    o.offer_sk,
    d."SalesOrderID"::INTEGER AS order_id,
    d."SalesOrderDetailID"::INTEGER AS order_line_id,
    d."OrderQty"::INTEGER AS quantity,
    d."UnitPrice"::NUMERIC(15,4) AS unit_price,
    COALESCE(d."UnitPriceDiscount"::NUMERIC(9,4), 0) AS discount_fraction,
    COALESCE(p.unit_cost, 0) AS unit_cost
FROM {details} d
JOIN {headers} h ON h."SalesOrderID"::INTEGER = d."SalesOrderID"::INTEGER
LEFT JOIN {customer} c ON c.customer_nk = h."CustomerID"::INTEGER
LEFT JOIN {product} p ON p.product_nk = d."ProductID"::INTEGER
LEFT JOIN {region} r ON r.region_nk = h."TerritoryID"::INTEGER
LEFT JOIN {salesperson} s ON s.salesperson_nk = h."SalesPersonID"::INTEGER
LEFT JOIN {offer} o ON o.offer_nk = d."SpecialOfferID"::INTEGER
WHERE d."SalesOrderID" IS NOT NULL
    AND d."SalesOrderDetailID" IS NOT NULL
    AND NOT EXISTS (
        SELECT 1 FROM {fact} f
        WHERE f.order_id = d."SalesOrderID"::INTEGER
            AND f.order_line_id = d."SalesOrderDetailID"::INTEGER
    )
ORDER BY order_id, order_line_id"#,
            details = n.staging(tables::ORDER_DETAILS),
            headers = n.staging(tables::ORDER_HEADERS),
            customer = n.warehouse(DIM_CUSTOMER),
            product = n.warehouse(DIM_PRODUCT),
            region = n.warehouse(DIM_REGION),
            salesperson = n.warehouse(DIM_SALESPERSON),
            offer = n.warehouse(DIM_OFFER),
            fact = n.warehouse(FACT_SALES),
        )
    }

    fn totals_query(&self) -> String {
        format!(
            "SELECT COUNT(*), \
             CAST(COALESCE(SUM(net_value), 0) AS NUMERIC(18,4)), \
             CAST(COALESCE(SUM(gross_profit), 0) AS NUMERIC(18,4)) \
             FROM {}",
            self.names.warehouse(FACT_SALES)
        )
    }

    /// Insert new facts and report totals
    pub async fn load(&self, store: &dyn SqlStore) -> Result<FactLoadStats, WarehouseError> {
        let candidates = store
            .query(&self.candidate_query())
            .await
            .map_err(WarehouseError::Fact)?;
        debug!(candidates = candidates.len(), "Selected unloaded order lines");

        let rows = fact_rows(&candidates)?;

        let insert = BatchInsert::new(
            self.names.warehouse(FACT_SALES),
            FACT_COLUMNS
                .iter()
                .map(|(name, ty)| (name.to_string(), ty.to_string()))
                .collect(),
            FACT_BATCH_ROWS,
        )
        .on_conflict("(order_id, order_line_id) DO NOTHING");
        let inserted = insert
            .execute(store, &rows)
            .await
            .map_err(WarehouseError::Fact)?;

        let stats = self.totals(store, inserted).await?;
        info!(
            inserted = stats.inserted,
            total_rows = stats.total_rows,
            total_net_value = %stats.total_net_value,
            total_gross_profit = %stats.total_gross_profit,
            "Fact load complete"
        );
        Ok(stats)
    }

    async fn totals(
        &self,
        store: &dyn SqlStore,
        inserted: u64,
    ) -> Result<FactLoadStats, WarehouseError> {
        let totals = store
            .query(&self.totals_query())
            .await
            .map_err(WarehouseError::Fact)?;
        let row = totals.rows.first();
        let cell = |idx: usize| row.and_then(|r| r.get(idx)).unwrap_or(&SqlValue::Null);

        Ok(FactLoadStats {
            inserted,
            total_rows: cell(0).as_i64().unwrap_or(0),
            total_net_value: cell(1).as_decimal().unwrap_or_default(),
            total_gross_profit: cell(2).as_decimal().unwrap_or_default(),
        })
    }
}

/// Append metrics to each candidate row
fn fact_rows(candidates: &RowSet) -> Result<Vec<Vec<SqlValue>>, WarehouseError> {
    candidates
        .rows
        .iter()
        .map(|row| {
            let decimal = |idx: usize, column: &str| -> Result<Option<Decimal>, WarehouseError> {
                match row.get(idx) {
                    None | Some(SqlValue::Null) => Ok(None),
                    Some(value) => {
                        value
                            .as_decimal()
                            .map(Some)
                            .ok_or_else(|| WarehouseError::UnexpectedValue {
                                column: column.to_string(),
                                value: value.to_string(),
                            })
                    }
                }
            };

            let quantity = row.get(8).and_then(SqlValue::as_i64);
            let unit_price = decimal(9, "unit_price")?;
            let discount = decimal(10, "discount_fraction")?.unwrap_or_default();
            let unit_cost = decimal(11, "unit_cost")?.unwrap_or_default();

            let mut out: Vec<SqlValue> = row.iter().take(KEY_COLUMNS).cloned().collect();
            out.push(unit_price.into());
            match (unit_price, quantity) {
                (Some(price), Some(qty)) => {
                    let m = SaleMetrics::compute(price, qty, discount, unit_cost);
                    out.extend([
                        m.gross_value,
                        m.discount_value,
                        m.net_value,
                        m.total_cost,
                        m.gross_profit,
                        m.discount_pct,
                        m.contribution_margin_pct,
                    ]
                    .map(SqlValue::Decimal));
                }
                // No price or quantity: metrics stay unknown
                _ => out.extend(std::iter::repeat_n(SqlValue::Null, 7)),
            }
            Ok(out)
        })
        .collect()
}
