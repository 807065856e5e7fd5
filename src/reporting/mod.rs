//! Read-only KPI queries over the finished star schema
//!
//! Every query uses only surrogate keys, natural keys and the documented
//! metric columns, so it runs unchanged on DuckDB and PostgreSQL.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::store::{SqlStore, StoreError, quote_ident};
use crate::value::RowSet;

/// Available KPI reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kpi {
    /// Average contribution margin per product
    ProductMargin,
    /// Revenue and margin per discount band
    DiscountBands,
    /// Revenue and quota attainment per salesperson and territory
    SalespersonPerformance,
    /// Last twelve months of revenue and profit
    MonthlyRevenue,
    /// Pareto classes from each product's cumulative revenue share
    AbcClassification,
    /// Revenue share per territory
    RegionalSales,
    /// Cost, profit and turnover per category
    CategoryEfficiency,
    /// Revenue and profit per customer within each segment
    CustomerLifetimeValue,
    /// Sales per quarter and weekday
    Seasonality,
    /// Ten best-selling products by revenue
    TopProducts,
}

impl Kpi {
    pub fn all() -> &'static [Kpi] {
        &[
            Kpi::ProductMargin,
            Kpi::DiscountBands,
            Kpi::SalespersonPerformance,
            Kpi::MonthlyRevenue,
            Kpi::AbcClassification,
            Kpi::RegionalSales,
            Kpi::CategoryEfficiency,
            Kpi::CustomerLifetimeValue,
            Kpi::Seasonality,
            Kpi::TopProducts,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Kpi::ProductMargin => "product_margin",
            Kpi::DiscountBands => "discount_bands",
            Kpi::SalespersonPerformance => "salesperson_performance",
            Kpi::MonthlyRevenue => "monthly_revenue",
            Kpi::AbcClassification => "abc_classification",
            Kpi::RegionalSales => "regional_sales",
            Kpi::CategoryEfficiency => "category_efficiency",
            Kpi::CustomerLifetimeValue => "customer_lifetime_value",
            Kpi::Seasonality => "seasonality",
            Kpi::TopProducts => "top_products",
        }
    }

    /// Query text against warehouse schema `schema`
    pub fn sql(&self, schema: &str) -> String {
        let template = match self {
            Kpi::ProductMargin => PRODUCT_MARGIN,
            Kpi::DiscountBands => DISCOUNT_BANDS,
            Kpi::SalespersonPerformance => SALESPERSON_PERFORMANCE,
            Kpi::MonthlyRevenue => MONTHLY_REVENUE,
            Kpi::AbcClassification => ABC_CLASSIFICATION,
            Kpi::RegionalSales => REGIONAL_SALES,
            Kpi::CategoryEfficiency => CATEGORY_EFFICIENCY,
            Kpi::CustomerLifetimeValue => CUSTOMER_LIFETIME_VALUE,
            Kpi::Seasonality => SEASONALITY,
            Kpi::TopProducts => TOP_PRODUCTS,
        };
        template.replace("{dw}", &quote_ident(schema))
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Kpi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Kpi::all()
            .iter()
            .copied()
            .find(|kpi| kpi.name() == wanted)
            .ok_or_else(|| {
                let names: Vec<&str> = Kpi::all().iter().map(Kpi::name).collect();
                format!("Unknown KPI: {}. Valid: {}", s, names.join(", "))
            })
    }
}

/// Run one KPI query
pub async fn run_kpi(store: &dyn SqlStore, schema: &str, kpi: Kpi) -> Result<RowSet, StoreError> {
    let rows = store.query(&kpi.sql(schema)).await?;
    info!(kpi = kpi.name(), rows = rows.len(), "KPI computed");
    Ok(rows)
}

const PRODUCT_MARGIN: &str = r#"SELECT
    p.category,
    p.subcategory,
    p.product_name,
    COUNT(DISTINCT f.order_id) AS orders,
    SUM(f.quantity) AS units_sold,
    SUM(f.net_value) AS net_revenue,
    SUM(f.gross_profit) AS gross_profit,
    ROUND(AVG(f.contribution_margin_pct), 2) AS avg_margin_pct,
    ROUND(SUM(f.gross_profit) / NULLIF(SUM(f.net_value), 0) * 100, 2) AS profitability_pct
FROM {dw}.fact_sales f
INNER JOIN {dw}.dim_product p ON f.product_sk = p.product_sk
WHERE f.net_value > 0
GROUP BY p.category, p.subcategory, p.product_name
HAVING SUM(f.net_value) > 1000
ORDER BY avg_margin_pct DESC
LIMIT 20"#;

const DISCOUNT_BANDS: &str = r#"SELECT
    CASE
        WHEN f.discount_pct = 0 THEN 'No discount'
        WHEN f.discount_pct <= 10 THEN '1-10%'
        WHEN f.discount_pct <= 20 THEN '11-20%'
        WHEN f.discount_pct <= 30 THEN '21-30%'
        ELSE 'Over 30%'
    END AS discount_band,
    COUNT(*) AS lines,
    SUM(f.quantity) AS units_sold,
    ROUND(SUM(f.gross_value), 2) AS gross_value,
    ROUND(SUM(f.discount_value), 2) AS discount_given,
    ROUND(SUM(f.net_value), 2) AS net_revenue,
    ROUND(SUM(f.gross_profit), 2) AS gross_profit,
    ROUND(AVG(f.contribution_margin_pct), 2) AS avg_margin_pct,
    ROUND(SUM(f.discount_value) / NULLIF(SUM(f.gross_value), 0) * 100, 2) AS effective_discount_pct
FROM {dw}.fact_sales f
GROUP BY 1
ORDER BY 1"#;

const SALESPERSON_PERFORMANCE: &str = r#"SELECT
    r.region_group,
    r.territory_name,
    s.salesperson_name,
    s.annual_quota,
    COUNT(DISTINCT f.order_id) AS orders,
    ROUND(SUM(f.net_value), 2) AS revenue,
    ROUND(SUM(f.gross_profit), 2) AS profit,
    ROUND(SUM(f.net_value) / NULLIF(s.annual_quota, 0) * 100, 2) AS quota_attainment_pct,
    ROUND(SUM(f.net_value) / NULLIF(COUNT(DISTINCT f.order_id), 0), 2) AS avg_order_value,
    ROUND(AVG(f.contribution_margin_pct), 2) AS avg_margin_pct
FROM {dw}.fact_sales f
INNER JOIN {dw}.dim_salesperson s ON f.salesperson_sk = s.salesperson_sk
INNER JOIN {dw}.dim_region r ON f.region_sk = r.region_sk
WHERE s.annual_quota > 0
GROUP BY r.region_group, r.territory_name, s.salesperson_name, s.annual_quota
ORDER BY revenue DESC
LIMIT 15"#;

const MONTHLY_REVENUE: &str = r#"WITH monthly AS (
    SELECT
        d.calendar_year,
        d.calendar_month,
        d.month_name,
        SUM(f.net_value) AS revenue,
        SUM(f.gross_profit) AS profit,
        COUNT(DISTINCT f.order_id) AS orders,
        COUNT(DISTINCT f.customer_sk) AS customers
    FROM {dw}.fact_sales f
    INNER JOIN {dw}.dim_date d ON f.date_key = d.date_key
    GROUP BY d.calendar_year, d.calendar_month, d.month_name
)
SELECT
    calendar_year,
    calendar_month,
    month_name,
    ROUND(revenue, 2) AS revenue,
    ROUND(profit, 2) AS profit,
    ROUND(profit / NULLIF(revenue, 0) * 100, 2) AS profit_margin_pct,
    orders,
    customers,
    ROUND(revenue / NULLIF(orders, 0), 2) AS avg_order_value
FROM monthly
ORDER BY calendar_year DESC, calendar_month DESC
LIMIT 12"#;

// Class A holds the products making up the first 80% of revenue, B the next 15%
const ABC_CLASSIFICATION: &str = r#"WITH ranked AS (
    SELECT
        p.product_sk,
        p.product_name,
        p.category,
        SUM(f.net_value) AS revenue,
        SUM(SUM(f.net_value)) OVER () AS total_revenue,
        SUM(f.quantity) AS units_sold
    FROM {dw}.fact_sales f
    INNER JOIN {dw}.dim_product p ON f.product_sk = p.product_sk
    GROUP BY p.product_sk, p.product_name, p.category
),
cumulative AS (
    SELECT
        *,
        ROUND(
            SUM(revenue) OVER (ORDER BY revenue DESC, product_sk)
                / NULLIF(total_revenue, 0) * 100,
            2
        ) AS cumulative_share_pct
    FROM ranked
)
SELECT
    product_name,
    category,
    ROUND(revenue, 2) AS revenue,
    units_sold,
    cumulative_share_pct,
    CASE
        WHEN cumulative_share_pct <= 80 THEN 'A'
        WHEN cumulative_share_pct <= 95 THEN 'B'
        ELSE 'C'
    END AS abc_class
FROM cumulative
ORDER BY revenue DESC, product_sk
LIMIT 30"#;

const REGIONAL_SALES: &str = r#"SELECT
    r.continent,
    r.region_group,
    r.territory_name,
    COUNT(DISTINCT f.customer_sk) AS customers,
    COUNT(DISTINCT f.order_id) AS orders,
    SUM(f.quantity) AS units_sold,
    ROUND(SUM(f.net_value), 2) AS revenue,
    ROUND(SUM(f.gross_profit), 2) AS profit,
    ROUND(AVG(f.contribution_margin_pct), 2) AS avg_margin_pct,
    ROUND(SUM(f.net_value) / NULLIF(SUM(SUM(f.net_value)) OVER (), 0) * 100, 2) AS revenue_share_pct
FROM {dw}.fact_sales f
INNER JOIN {dw}.dim_region r ON f.region_sk = r.region_sk
GROUP BY r.continent, r.region_group, r.territory_name
ORDER BY revenue DESC
LIMIT 15"#;

const CATEGORY_EFFICIENCY: &str = r#"SELECT
    p.category,
    COUNT(DISTINCT p.product_sk) AS products,
    COUNT(DISTINCT f.order_id) AS orders,
    SUM(f.quantity) AS units_sold,
    ROUND(SUM(f.net_value), 2) AS revenue,
    ROUND(SUM(f.total_cost), 2) AS cost,
    ROUND(SUM(f.gross_profit), 2) AS profit,
    ROUND(SUM(f.gross_profit) / NULLIF(SUM(f.net_value), 0) * 100, 2) AS profit_margin_pct,
    ROUND(SUM(f.net_value) / NULLIF(COUNT(DISTINCT p.product_sk), 0), 2) AS revenue_per_product,
    ROUND(SUM(f.net_value) / NULLIF(SUM(SUM(f.net_value)) OVER (), 0) * 100, 2) AS revenue_share_pct
FROM {dw}.fact_sales f
INNER JOIN {dw}.dim_product p ON f.product_sk = p.product_sk
GROUP BY p.category
ORDER BY revenue DESC"#;

const CUSTOMER_LIFETIME_VALUE: &str = r#"WITH segments AS (
    SELECT
        c.customer_type,
        c.segment,
        COUNT(DISTINCT f.customer_sk) AS customers,
        SUM(f.net_value) AS revenue,
        SUM(f.gross_profit) AS profit,
        COUNT(DISTINCT f.order_id) AS orders,
        AVG(f.net_value) AS avg_line_value
    FROM {dw}.fact_sales f
    INNER JOIN {dw}.dim_customer c ON f.customer_sk = c.customer_sk
    GROUP BY c.customer_type, c.segment
)
SELECT
    customer_type,
    segment,
    customers,
    ROUND(revenue, 2) AS revenue,
    ROUND(profit, 2) AS profit,
    ROUND(revenue / NULLIF(customers, 0), 2) AS revenue_per_customer,
    ROUND(profit / NULLIF(customers, 0), 2) AS profit_per_customer,
    ROUND(CAST(orders AS NUMERIC) / NULLIF(customers, 0), 2) AS orders_per_customer,
    ROUND(avg_line_value, 2) AS avg_line_value,
    CASE
        WHEN revenue / NULLIF(customers, 0) >= 50000 THEN 'VIP'
        WHEN revenue / NULLIF(customers, 0) >= 20000 THEN 'Premium'
        WHEN revenue / NULLIF(customers, 0) >= 5000 THEN 'Regular'
        ELSE 'Basic'
    END AS value_tier
FROM segments
ORDER BY revenue DESC"#;

// day_of_week counts from Sunday; the shift puts Monday first
const SEASONALITY: &str = r#"SELECT
    d.calendar_quarter,
    d.day_name,
    d.is_weekend,
    COUNT(DISTINCT f.order_id) AS orders,
    SUM(f.quantity) AS units_sold,
    ROUND(SUM(f.net_value), 2) AS revenue,
    ROUND(AVG(f.net_value), 2) AS avg_line_value,
    ROUND(SUM(f.gross_profit), 2) AS profit,
    ROUND(AVG(f.contribution_margin_pct), 2) AS avg_margin_pct
FROM {dw}.fact_sales f
INNER JOIN {dw}.dim_date d ON f.date_key = d.date_key
GROUP BY d.calendar_quarter, d.day_of_week, d.day_name, d.is_weekend
ORDER BY d.calendar_quarter, (d.day_of_week + 6) % 7"#;

const TOP_PRODUCTS: &str = r#"SELECT
    p.category,
    p.product_name,
    COUNT(DISTINCT f.order_id) AS orders,
    SUM(f.quantity) AS units_sold,
    ROUND(SUM(f.net_value), 2) AS revenue,
    ROUND(SUM(f.gross_profit), 2) AS profit,
    ROUND(AVG(f.contribution_margin_pct), 2) AS avg_margin_pct,
    ROUND(SUM(f.net_value) / NULLIF(SUM(f.quantity), 0), 2) AS avg_unit_price
FROM {dw}.fact_sales f
INNER JOIN {dw}.dim_product p ON f.product_sk = p.product_sk
GROUP BY p.category, p.product_name
ORDER BY revenue DESC
LIMIT 10"#;
