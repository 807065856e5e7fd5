//! Shared fixtures: a small AdventureWorks-shaped source in DuckDB

#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use salesdw::config::EtlConfig;
use salesdw::store::{DuckDbStore, SqlStore};
use salesdw::warehouse::{StarSchema, TableNames};
use salesdw::{RowSet, SqlValue};

pub const SOURCE_DDL: &str = r#"
CREATE SCHEMA "Sales";
CREATE SCHEMA "Person";
CREATE SCHEMA "Production";
CREATE SCHEMA "HumanResources";

CREATE TABLE "Sales"."Customer" (
    "CustomerID" INTEGER, "PersonID" INTEGER, "StoreID" INTEGER,
    "TerritoryID" INTEGER, "ModifiedDate" TIMESTAMP
);
INSERT INTO "Sales"."Customer" VALUES
    (11000, 1, NULL, 1, '2014-09-12 11:15:07'),
    (11001, 2, NULL, 7, '2014-09-12 11:15:07'),
    (29484, NULL, 292, 2, '2014-09-12 11:15:07');

CREATE TABLE "Person"."Person" (
    "BusinessEntityID" INTEGER, "PersonType" VARCHAR,
    "FirstName" VARCHAR, "LastName" VARCHAR
);
INSERT INTO "Person"."Person" VALUES
    (1, 'IN', 'Jon', 'Yang'),
    (2, 'IN', 'Eugene', 'Huang'),
    (274, 'SP', 'Stephen', 'Jiang'),
    (275, 'SP', 'Michael', 'Blythe');

CREATE TABLE "Production"."ProductCategory" ("ProductCategoryID" INTEGER, "Name" VARCHAR);
INSERT INTO "Production"."ProductCategory" VALUES (1, 'Bikes'), (3, 'Clothing');

CREATE TABLE "Production"."ProductSubcategory" (
    "ProductSubcategoryID" INTEGER, "ProductCategoryID" INTEGER, "Name" VARCHAR
);
INSERT INTO "Production"."ProductSubcategory" VALUES (1, 1, 'Mountain Bikes'), (23, 3, 'Socks');

CREATE TABLE "Production"."Product" (
    "ProductID" INTEGER, "Name" VARCHAR, "ProductNumber" VARCHAR, "Color" VARCHAR,
    "StandardCost" DECIMAL(19,4), "ListPrice" DECIMAL(19,4), "Size" VARCHAR,
    "Weight" DECIMAL(8,2), "ProductLine" VARCHAR, "ProductSubcategoryID" INTEGER,
    "SellStartDate" TIMESTAMP, "SellEndDate" TIMESTAMP
);
INSERT INTO "Production"."Product" VALUES
    (771, 'Mountain-100 Silver, 38', 'BK-M82S-38', 'Silver', 1912.1544, 3399.99, '38', 20.35, 'M', 1, '2011-05-31', NULL),
    (709, 'Mountain Bike Socks, M', 'SO-B909-M', 'White', 3.3963, 9.50, 'M', NULL, 'M', 23, '2011-05-31', '2012-05-29'),
    (999, 'Road-750 Black, 52', 'BK-R19B-52', 'Black', 50.0000, 539.99, '52', 20.79, 'R', NULL, '2013-05-30', NULL);

CREATE TABLE "Sales"."SalesTerritory" (
    "TerritoryID" INTEGER, "Name" VARCHAR, "CountryRegionCode" VARCHAR, "Group" VARCHAR
);
INSERT INTO "Sales"."SalesTerritory" VALUES
    (1, 'Northwest', 'US', 'North America'),
    (2, 'Northeast', 'US', 'North America'),
    (7, 'France', 'FR', 'Europe');

CREATE TABLE "Sales"."SalesPerson" (
    "BusinessEntityID" INTEGER, "TerritoryID" INTEGER, "SalesQuota" DECIMAL(19,4),
    "Bonus" DECIMAL(19,4), "CommissionPct" DECIMAL(10,4)
);
INSERT INTO "Sales"."SalesPerson" VALUES
    (274, NULL, NULL, 0, 0),
    (275, 2, 300000, 4100, 0.012);

CREATE TABLE "HumanResources"."Employee" (
    "BusinessEntityID" INTEGER, "JobTitle" VARCHAR, "HireDate" DATE
);
INSERT INTO "HumanResources"."Employee" VALUES
    (274, 'North American Sales Manager', '2011-01-04'),
    (275, 'Sales Representative', '2011-05-31');

CREATE TABLE "Sales"."SpecialOffer" (
    "SpecialOfferID" INTEGER, "Description" VARCHAR, "DiscountPct" DECIMAL(10,4),
    "Type" VARCHAR, "Category" VARCHAR, "StartDate" TIMESTAMP, "EndDate" TIMESTAMP,
    "MinQty" INTEGER, "MaxQty" INTEGER
);
INSERT INTO "Sales"."SpecialOffer" VALUES
    (1, 'No Discount', 0.00, 'No Discount', 'No Discount', '2011-05-01', '2014-11-30', 0, NULL),
    (2, 'Volume Discount 11 to 14', 0.10, 'Volume Discount', 'Reseller', '2011-05-31', '2014-05-30', 11, 14);

CREATE TABLE "Sales"."SalesOrderHeader" (
    "SalesOrderID" INTEGER, "OrderDate" TIMESTAMP, "CustomerID" INTEGER,
    "SalesPersonID" INTEGER, "TerritoryID" INTEGER, "SubTotal" DECIMAL(19,4)
);
INSERT INTO "Sales"."SalesOrderHeader" VALUES
    (43659, '2011-05-31 00:00:00', 29484, 275, 2, 2041.9940),
    (43697, '2011-06-01 00:00:00', 11000, NULL, 1, 180.0000);

CREATE TABLE "Sales"."SalesOrderDetail" (
    "SalesOrderID" INTEGER, "SalesOrderDetailID" INTEGER, "OrderQty" SMALLINT,
    "ProductID" INTEGER, "SpecialOfferID" INTEGER, "UnitPrice" DECIMAL(19,4),
    "UnitPriceDiscount" DECIMAL(19,4)
);
INSERT INTO "Sales"."SalesOrderDetail" VALUES
    (43659, 1, 1, 771, 1, 2024.9940, 0.0000),
    (43659, 2, 3, 709, 1, 5.7000, 0.0000),
    (43697, 3, 2, 999, 2, 100.0000, 0.1000);
"#;

pub async fn source_store() -> Arc<DuckDbStore> {
    let store = DuckDbStore::memory().unwrap();
    store.batch_execute(SOURCE_DDL).await.unwrap();
    Arc::new(store)
}

pub fn warehouse_store() -> Arc<DuckDbStore> {
    Arc::new(DuckDbStore::memory().unwrap())
}

pub fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Default mapping with a short calendar to keep seeding fast
pub fn etl_config() -> EtlConfig {
    EtlConfig::default().with_calendar(ymd(2011, 1, 1), ymd(2011, 12, 31))
}

pub fn names() -> TableNames {
    TableNames::new("staging", "dw")
}

pub async fn bootstrap(dest: &dyn SqlStore) {
    StarSchema::new(names()).ensure(dest).await.unwrap();
}

pub async fn query(store: &dyn SqlStore, sql: &str) -> RowSet {
    store
        .query(sql)
        .await
        .unwrap_or_else(|e| panic!("{}\n{}", e, sql))
}

pub async fn scalar(store: &dyn SqlStore, sql: &str) -> SqlValue {
    query(store, sql).await.scalar().cloned().unwrap_or(SqlValue::Null)
}

pub async fn count(store: &dyn SqlStore, table: &str) -> i64 {
    scalar(store, &format!("SELECT COUNT(*) FROM {}", table))
        .await
        .as_i64()
        .unwrap()
}
