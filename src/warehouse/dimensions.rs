//! Natural-key dimension upserts (SCD type 1)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::WarehouseError;
use super::schema::{
    DIM_CUSTOMER, DIM_OFFER, DIM_PRODUCT, DIM_REGION, DIM_SALESPERSON, TableNames,
};
use crate::staging::tables;
use crate::store::SqlStore;

/// Dimensions loaded from staging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Customer,
    Product,
    Region,
    Salesperson,
    Offer,
}

/// Declarative shape of one dimension upsert
///
/// `select` may reference `{stg:<table>}` and `{dw:<table>}`; both are
/// resolved to qualified names when the statement is rendered.
#[derive(Debug, Clone, Copy)]
pub struct DimensionSpec {
    pub table: &'static str,
    pub natural_key: &'static str,
    /// Insert column list, natural key first, matching the SELECT list
    pub columns: &'static [&'static str],
    /// Overwritten on conflict; everything else is immutable after insert
    pub mutable: &'static [&'static str],
    pub select: &'static str,
    pub reads: &'static [&'static str],
    pub depends_on: &'static [Dimension],
}

static CUSTOMER: DimensionSpec = DimensionSpec {
    table: DIM_CUSTOMER,
    natural_key: "customer_nk",
    columns: &[
        "customer_nk",
        "first_name",
        "last_name",
        "full_name",
        "customer_type",
        "segment",
        "registered_on",
    ],
    mutable: &["first_name", "last_name", "full_name", "customer_type"],
    select: r#"SELECT DISTINCT
    c."CustomerID"::INTEGER,
    COALESCE(p."FirstName", 'Unknown'),
    COALESCE(p."LastName", ''),
    COALESCE(p."FirstName" || ' ' || p."LastName", 'Customer ' || CAST(c."CustomerID"::INTEGER AS TEXT)),
    CASE
        WHEN c."PersonID" IS NOT NULL THEN 'Individual'
        WHEN c."StoreID" IS NOT NULL THEN 'Store'
        ELSE 'Undefined'
    END,
    'Retail',
    CURRENT_DATE
FROM {stg:stage_customers} c
LEFT JOIN {stg:stage_persons} p ON p."BusinessEntityID"::INTEGER = c."PersonID"::INTEGER
WHERE c."CustomerID" IS NOT NULL"#,
    reads: &[tables::CUSTOMERS, tables::PERSONS],
    depends_on: &[],
};

static PRODUCT: DimensionSpec = DimensionSpec {
    table: DIM_PRODUCT,
    natural_key: "product_nk",
    columns: &[
        "product_nk",
        "product_name",
        "product_number",
        "category",
        "subcategory",
        "product_line",
        "color",
        "size",
        "weight",
        "unit_cost",
        "list_price",
        "margin_pct",
        "valid_from",
        "is_active",
    ],
    mutable: &[
        "product_name",
        "category",
        "subcategory",
        "color",
        "unit_cost",
        "list_price",
        "margin_pct",
        "is_active",
    ],
    select: r#"SELECT DISTINCT
    p."ProductID"::INTEGER,
    p."Name",
    p."ProductNumber",
    COALESCE(cat."Name", 'No Category'),
    COALESCE(sub."Name", 'No Subcategory'),
    COALESCE(p."ProductLine", 'N/A'),
    COALESCE(p."Color", 'N/A'),
    COALESCE(p."Size", 'N/A'),
    COALESCE(p."Weight"::NUMERIC(10,2), 0),
    COALESCE(p."StandardCost"::NUMERIC(15,4), 0),
    COALESCE(p."ListPrice"::NUMERIC(15,4), 0),
    CASE
        WHEN p."ListPrice"::NUMERIC(15,4) > 0 THEN
            ((p."ListPrice"::NUMERIC(15,4) - COALESCE(p."StandardCost"::NUMERIC(15,4), 0))
                / p."ListPrice"::NUMERIC(15,4) * 100)::NUMERIC(9,2)
        ELSE 0
    END,
    COALESCE(p."SellStartDate"::DATE, CURRENT_DATE),
    p."SellEndDate" IS NULL
FROM {stg:stage_products} p
LEFT JOIN {stg:stage_subcategories} sub
    ON sub."ProductSubcategoryID"::INTEGER = p."ProductSubcategoryID"::INTEGER
LEFT JOIN {stg:stage_categories} cat
    ON cat."ProductCategoryID"::INTEGER = sub."ProductCategoryID"::INTEGER
WHERE p."ProductID" IS NOT NULL"#,
    reads: &[tables::PRODUCTS, tables::SUBCATEGORIES, tables::CATEGORIES],
    depends_on: &[],
};

static REGION: DimensionSpec = DimensionSpec {
    table: DIM_REGION,
    natural_key: "region_nk",
    columns: &[
        "region_nk",
        "territory_name",
        "country_code",
        "country_name",
        "continent",
        "region_group",
    ],
    mutable: &["territory_name", "continent", "region_group"],
    select: r#"SELECT DISTINCT
    t."TerritoryID"::INTEGER,
    t."Name",
    t."CountryRegionCode",
    t."CountryRegionCode",
    CASE
        WHEN t."Group" LIKE '%America%' THEN 'Americas'
        WHEN t."Group" LIKE '%Europe%' THEN 'Europe'
        WHEN t."Group" LIKE '%Pacific%' THEN 'Asia-Pacific'
        ELSE 'Other'
    END,
    t."Group"
FROM {stg:stage_territories} t
WHERE t."TerritoryID" IS NOT NULL"#,
    reads: &[tables::TERRITORIES],
    depends_on: &[],
};

static SALESPERSON: DimensionSpec = DimensionSpec {
    table: DIM_SALESPERSON,
    natural_key: "salesperson_nk",
    columns: &[
        "salesperson_nk",
        "salesperson_name",
        "salesperson_code",
        "region_sk",
        "hired_on",
        "annual_quota",
        "commission_pct",
    ],
    mutable: &[
        "salesperson_name",
        "region_sk",
        "annual_quota",
        "commission_pct",
    ],
    select: r#"SELECT DISTINCT
    sp."BusinessEntityID"::INTEGER,
    COALESCE(p."FirstName" || ' ' || p."LastName",
        'Salesperson ' || CAST(sp."BusinessEntityID"::INTEGER AS TEXT)),
    'V' || LPAD(CAST(sp."BusinessEntityID"::INTEGER AS TEXT), 5, '0'),
    r.region_sk,
    e."HireDate"::DATE,
    COALESCE(sp."SalesQuota"::NUMERIC(18,2), 0),
    COALESCE(sp."CommissionPct"::NUMERIC(7,4), 0)
FROM {stg:stage_salespersons} sp
LEFT JOIN {stg:stage_persons} p ON p."BusinessEntityID"::INTEGER = sp."BusinessEntityID"::INTEGER
LEFT JOIN {stg:stage_employees} e ON e."BusinessEntityID"::INTEGER = sp."BusinessEntityID"::INTEGER
LEFT JOIN {dw:dim_region} r ON r.region_nk = sp."TerritoryID"::INTEGER
WHERE sp."BusinessEntityID" IS NOT NULL"#,
    reads: &[tables::SALESPERSONS, tables::PERSONS, tables::EMPLOYEES],
    depends_on: &[Dimension::Region],
};

static OFFER: DimensionSpec = DimensionSpec {
    table: DIM_OFFER,
    natural_key: "offer_nk",
    columns: &[
        "offer_nk",
        "description",
        "offer_type",
        "discount_pct",
        "starts_on",
        "ends_on",
        "min_qty",
        "max_qty",
    ],
    mutable: &["description", "discount_pct", "ends_on"],
    select: r#"SELECT DISTINCT
    o."SpecialOfferID"::INTEGER,
    o."Description",
    o."Type",
    COALESCE(o."DiscountPct"::NUMERIC(7,4), 0),
    o."StartDate"::DATE,
    o."EndDate"::DATE,
    COALESCE(o."MinQty"::INTEGER, 0),
    COALESCE(o."MaxQty"::INTEGER, 999999)
FROM {stg:stage_offers} o
WHERE o."SpecialOfferID" IS NOT NULL"#,
    reads: &[tables::OFFERS],
    depends_on: &[],
};

impl Dimension {
    pub fn all() -> &'static [Dimension] {
        &[
            Dimension::Customer,
            Dimension::Product,
            Dimension::Region,
            Dimension::Salesperson,
            Dimension::Offer,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Dimension::Customer => "customer",
            Dimension::Product => "product",
            Dimension::Region => "region",
            Dimension::Salesperson => "salesperson",
            Dimension::Offer => "offer",
        }
    }

    pub fn spec(&self) -> &'static DimensionSpec {
        match self {
            Dimension::Customer => &CUSTOMER,
            Dimension::Product => &PRODUCT,
            Dimension::Region => &REGION,
            Dimension::Salesperson => &SALESPERSON,
            Dimension::Offer => &OFFER,
        }
    }

    pub fn table(&self) -> &'static str {
        self.spec().table
    }

    /// Dimensions whose surrogate keys this one looks up
    pub fn depends_on(&self) -> &'static [Dimension] {
        self.spec().depends_on
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Dimension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dimension::all()
            .iter()
            .copied()
            .find(|d| d.name() == s.to_lowercase() || d.table() == s.to_lowercase())
            .ok_or_else(|| {
                format!(
                    "Unknown dimension: {}. Valid: customer, product, region, salesperson, offer",
                    s
                )
            })
    }
}

/// Resolve `{stg:<table>}` / `{dw:<table>}` references
fn resolve_tables(template: &str, names: &TableNames) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let token = &after[..close];
        match token.split_once(':') {
            Some(("stg", table)) => out.push_str(&names.staging(table)),
            Some(("dw", table)) => out.push_str(&names.warehouse(table)),
            _ => {
                out.push('{');
                out.push_str(token);
                out.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Upserts one dimension from staging by natural key
pub struct DimensionUpserter {
    dimension: Dimension,
    names: TableNames,
}

impl DimensionUpserter {
    pub fn new(dimension: Dimension, names: TableNames) -> Self {
        Self { dimension, names }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// The full `INSERT ... SELECT ... ON CONFLICT DO UPDATE` statement
    pub fn statement(&self) -> String {
        let spec = self.dimension.spec();
        let updates = spec
            .mutable
            .iter()
            .map(|col| format!("{col} = EXCLUDED.{col}"))
            .chain(std::iter::once("updated_at = CURRENT_TIMESTAMP".to_string()))
            .collect::<Vec<_>>()
            .join(",\n    ");

        format!(
            "INSERT INTO {} ({})\n{}\nON CONFLICT ({}) DO UPDATE SET\n    {}",
            self.names.warehouse(spec.table),
            spec.columns.join(", "),
            resolve_tables(spec.select, &self.names),
            spec.natural_key,
            updates
        )
    }

    /// Run the upsert, returning rows inserted or updated
    pub async fn upsert(&self, store: &dyn SqlStore) -> Result<u64, WarehouseError> {
        let sql = self.statement();
        debug!(dimension = self.dimension.name(), "Upserting dimension");
        let affected = store
            .execute(&sql)
            .await
            .map_err(|error| WarehouseError::Dimension {
                dimension: self.dimension.name().to_string(),
                error,
            })?;
        info!(
            dimension = self.dimension.name(),
            table = self.dimension.table(),
            rows = affected,
            "Dimension upserted"
        );
        Ok(affected)
    }
}
