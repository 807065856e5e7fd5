//! Staging extraction against an in-memory DuckDB source

#![cfg(feature = "duckdb-backend")]

mod common;

use common::*;
use salesdw::config::default_mappings;
use salesdw::inference::StorageType;
use salesdw::staging::{StagingConfig, StagingError, StagingLoader};
use salesdw::store::SqlStore;
use salesdw::SqlValue;

fn loader() -> StagingLoader {
    StagingLoader::new(StagingConfig::default(), default_mappings())
}

mod extraction_tests {
    use super::*;

    #[tokio::test]
    async fn test_stages_every_mapping() {
        let source = source_store().await;
        let dest = warehouse_store();

        let staged = loader().load_all(source.as_ref(), dest.as_ref()).await.unwrap();

        assert_eq!(staged.len(), 11);
        assert!(staged.iter().all(|t| !t.placeholder));
        let details = staged
            .iter()
            .find(|t| t.target == "stage_order_details")
            .unwrap();
        assert_eq!(details.rows, 3);
        assert_eq!(count(dest.as_ref(), "staging.stage_customers").await, 3);
        assert_eq!(count(dest.as_ref(), "staging.stage_products").await, 3);
    }

    #[tokio::test]
    async fn test_inferred_column_types() {
        let source = source_store().await;
        let dest = warehouse_store();

        let staged = loader().load_all(source.as_ref(), dest.as_ref()).await.unwrap();
        let products = staged.iter().find(|t| t.target == "stage_products").unwrap();
        let type_of = |name: &str| {
            products
                .columns
                .iter()
                .find(|c| c.name == name)
                .map(|c| c.storage_type)
                .unwrap()
        };

        assert_eq!(type_of("ProductID"), StorageType::Integer);
        assert_eq!(type_of("ListPrice"), StorageType::Decimal);
        assert_eq!(type_of("Name"), StorageType::Text);
        assert_eq!(type_of("SellStartDate"), StorageType::Timestamp);

        let customers = staged.iter().find(|t| t.target == "stage_customers").unwrap();
        // every StoreID but one is null; a single integer still wins
        assert_eq!(customers.columns[2].name, "StoreID");
        assert_eq!(customers.columns[2].storage_type, StorageType::Integer);

        let columns = query(
            dest.as_ref(),
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_schema = 'staging' AND table_name = 'stage_products' \
             ORDER BY ordinal_position",
        )
        .await;
        assert_eq!(columns.rows[0][0], SqlValue::Text("ProductID".into()));
        assert_eq!(columns.rows[0][1], SqlValue::Text("BIGINT".into()));
        assert_eq!(columns.len(), 12);
    }

    #[tokio::test]
    async fn test_all_null_column_is_text() {
        let source = source_store().await;
        source
            .execute(r#"CREATE TABLE "Sales"."Notes" ("NoteID" INTEGER, "Body" VARCHAR)"#)
            .await
            .unwrap();
        source
            .execute(r#"INSERT INTO "Sales"."Notes" VALUES (1, NULL), (2, NULL)"#)
            .await
            .unwrap();
        let dest = warehouse_store();

        let loader = StagingLoader::new(
            StagingConfig::default(),
            vec![salesdw::config::TableMapping::new("Sales.Notes", "stage_notes")],
        );
        let staged = loader.load_all(source.as_ref(), dest.as_ref()).await.unwrap();
        assert_eq!(staged[0].columns[1].storage_type, StorageType::Text);
        assert_eq!(count(dest.as_ref(), "staging.stage_notes").await, 2);
    }
}

mod idempotence_tests {
    use super::*;

    #[tokio::test]
    async fn test_restaging_is_identical() {
        let source = source_store().await;
        let dest = warehouse_store();
        let loader = loader();

        let snapshot = |dest: std::sync::Arc<salesdw::store::DuckDbStore>| async move {
            let schema = query(
                dest.as_ref(),
                "SELECT table_name, column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = 'staging' ORDER BY table_name, ordinal_position",
            )
            .await;
            let details = query(
                dest.as_ref(),
                r#"SELECT * FROM staging.stage_order_details ORDER BY "SalesOrderDetailID""#,
            )
            .await;
            (schema, details)
        };

        loader.load_all(source.as_ref(), dest.as_ref()).await.unwrap();
        let first = snapshot(dest.clone()).await;
        loader.load_all(source.as_ref(), dest.as_ref()).await.unwrap();
        let second = snapshot(dest.clone()).await;

        assert_eq!(first, second);
        assert_eq!(count(dest.as_ref(), "staging.stage_order_details").await, 3);
    }

    #[tokio::test]
    async fn test_restaging_reflects_source_changes() {
        let source = source_store().await;
        let dest = warehouse_store();
        let loader = loader();

        loader.load_all(source.as_ref(), dest.as_ref()).await.unwrap();
        source
            .execute(r#"DELETE FROM "Sales"."SalesOrderDetail" WHERE "SalesOrderDetailID" = 3"#)
            .await
            .unwrap();
        loader.load_all(source.as_ref(), dest.as_ref()).await.unwrap();

        assert_eq!(count(dest.as_ref(), "staging.stage_order_details").await, 2);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_empty_source_creates_placeholder() {
        let source = source_store().await;
        source
            .execute(r#"DELETE FROM "Sales"."SpecialOffer""#)
            .await
            .unwrap();
        let dest = warehouse_store();

        let staged = loader().load_all(source.as_ref(), dest.as_ref()).await.unwrap();
        let offers = staged.iter().find(|t| t.target == "stage_offers").unwrap();
        assert!(offers.placeholder);
        assert_eq!(offers.rows, 0);

        let columns = query(
            dest.as_ref(),
            "SELECT column_name FROM information_schema.columns \
             WHERE table_schema = 'staging' AND table_name = 'stage_offers'",
        )
        .await;
        assert_eq!(columns.rows, vec![vec![SqlValue::Text("placeholder".into())]]);
        assert_eq!(count(dest.as_ref(), "staging.stage_offers").await, 0);
    }

    #[tokio::test]
    async fn test_missing_source_table_aborts() {
        let source = source_store().await;
        let dest = warehouse_store();
        let mut mappings = default_mappings();
        mappings.insert(
            1,
            salesdw::config::TableMapping::new("Sales.Store", "stage_stores"),
        );
        let loader = StagingLoader::new(StagingConfig::default(), mappings);

        let err = loader
            .load_all(source.as_ref(), dest.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::Extract { .. }));
        assert_eq!(err.table(), Some("Sales.Store"));

        // mappings before the failure were staged, later ones were not
        assert_eq!(count(dest.as_ref(), "staging.stage_customers").await, 3);
        let later = dest
            .query("SELECT COUNT(*) FROM staging.stage_products")
            .await;
        assert!(later.is_err());
    }

    #[tokio::test]
    async fn test_value_outside_sample_fails_bulk_load() {
        let source = source_store().await;
        source
            .batch_execute(
                r#"CREATE TABLE "Sales"."Counters" ("Hits" UBIGINT);
                   INSERT INTO "Sales"."Counters" VALUES (1), (18446744073709551615);"#,
            )
            .await
            .unwrap();
        let dest = warehouse_store();

        // the one-row sample sees a small integer, the second row overflows BIGINT
        let loader = StagingLoader::new(
            StagingConfig::builder().sample_size(1).build().unwrap(),
            vec![salesdw::config::TableMapping::new("Sales.Counters", "stage_counters")],
        );
        let err = loader
            .load_all(source.as_ref(), dest.as_ref())
            .await
            .unwrap_err();
        assert!(matches!(err, StagingError::BulkLoad { .. }));
        assert!(err.user_message().contains("sample_size"));
    }
}
