//! End-to-end runs of the stage graph over DuckDB

#![cfg(feature = "duckdb-backend")]

mod common;

use std::sync::Arc;

use common::*;
use salesdw::pipeline::{
    PipelineConfig, PipelineError, PipelineExecutor, RunReport, RunStatus, StageGraph, StageId,
};
use salesdw::reporting::{Kpi, run_kpi};
use salesdw::store::{DuckDbStore, SqlStore};
use tempfile::TempDir;

fn executor(
    config: PipelineConfig,
    source: &Arc<DuckDbStore>,
    dest: &Arc<DuckDbStore>,
) -> PipelineExecutor {
    PipelineExecutor::new(etl_config(), config, source.clone(), dest.clone()).unwrap()
}

mod full_run_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_run_loads_star_schema() {
        let temp = TempDir::new().unwrap();
        let report_path = temp.path().join("run.json");
        let source = source_store().await;
        let dest = warehouse_store();

        let report = executor(
            PipelineConfig::new()
                .with_name("nightly")
                .with_report_path(&report_path),
            &source,
            &dest,
        )
        .run()
        .await
        .unwrap();

        assert!(report.is_success());
        let order: Vec<StageId> = report.stages.iter().map(|r| r.stage).collect();
        assert_eq!(order, StageId::all().to_vec());
        assert_eq!(count(dest.as_ref(), "dw.fact_sales").await, 3);
        assert_eq!(count(dest.as_ref(), "dw.dim_date").await, 365);

        let facts = report.stage_output(StageId::FactSales).unwrap();
        assert_eq!(facts.metadata["inserted"], serde_json::json!(3));

        let saved = RunReport::load(&report_path).unwrap();
        assert_eq!(saved.run_id, report.run_id);
        assert_eq!(saved.status, RunStatus::Completed);
        assert_eq!(saved.name.as_deref(), Some("nightly"));
        assert_eq!(saved.stages.len(), StageId::all().len());
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let source = source_store().await;
        let dest = warehouse_store();

        executor(PipelineConfig::new(), &source, &dest)
            .run()
            .await
            .unwrap();
        let keys_sql = "SELECT product_nk, product_sk FROM dw.dim_product ORDER BY product_nk";
        let keys = query(dest.as_ref(), keys_sql).await;

        let report = executor(PipelineConfig::new(), &source, &dest)
            .run()
            .await
            .unwrap();

        assert!(report.is_success());
        let calendar = report.stage_output(StageId::CalendarSeed).unwrap();
        assert!(calendar.skipped);
        assert_eq!(
            report.stage_output(StageId::FactSales).unwrap().metadata["inserted"],
            serde_json::json!(0)
        );
        assert_eq!(query(dest.as_ref(), keys_sql).await, keys);
        assert_eq!(count(dest.as_ref(), "dw.fact_sales").await, 3);
        assert_eq!(count(dest.as_ref(), "dw.dim_date").await, 365);
    }

    #[tokio::test]
    async fn test_failed_dimension_stops_run() {
        let temp = TempDir::new().unwrap();
        let report_path = temp.path().join("run.json");
        let source = source_store().await;
        source
            .execute(r#"DELETE FROM "Sales"."SpecialOffer""#)
            .await
            .unwrap();
        let dest = warehouse_store();

        let err = executor(
            PipelineConfig::new().with_report_path(&report_path),
            &source,
            &dest,
        )
        .run()
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::StageFailure { .. }));
        assert_eq!(err.stage_name(), Some("dim_offer"));
        assert!(err.is_retryable());

        let report = RunReport::load(&report_path).unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert!(report.error.is_some());
        let offer = report.stage_output(StageId::DimOffer).unwrap();
        assert!(!offer.success);
        assert!(report.stage_output(StageId::DimensionsCheckpoint).is_none());
        assert!(report.stage_output(StageId::FactSales).is_none());
        assert_eq!(count(dest.as_ref(), "dw.fact_sales").await, 0);
        // earlier dimensions stay loaded
        assert_eq!(count(dest.as_ref(), "dw.dim_customer").await, 3);
    }

    #[tokio::test]
    async fn test_missing_source_table_fails_staging() {
        let source = Arc::new(DuckDbStore::memory().unwrap());
        let dest = warehouse_store();

        let err = executor(PipelineConfig::new(), &source, &dest)
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.stage_name(), Some("staging"));
        assert!(err.user_message().contains("Sales.Customer"));
        // the calendar runs before staging and is kept
        assert_eq!(count(dest.as_ref(), "dw.dim_date").await, 365);
    }
}

mod selection_tests {
    use super::*;

    #[tokio::test]
    async fn test_selected_stages_run_in_graph_order() {
        let source = source_store().await;
        let dest = warehouse_store();

        let report = executor(
            PipelineConfig::new().with_stages(vec![
                StageId::DimSalesperson,
                StageId::Staging,
                StageId::DimRegion,
            ]),
            &source,
            &dest,
        )
        .run()
        .await
        .unwrap();

        let order: Vec<StageId> = report.stages.iter().map(|r| r.stage).collect();
        assert_eq!(
            order,
            vec![StageId::Staging, StageId::DimRegion, StageId::DimSalesperson]
        );
        assert_eq!(count(dest.as_ref(), "dw.dim_date").await, 0);
        assert_eq!(count(dest.as_ref(), "dw.dim_customer").await, 0);
        let resolved = scalar(
            dest.as_ref(),
            "SELECT COUNT(*) FROM dw.dim_salesperson WHERE region_sk IS NOT NULL",
        )
        .await;
        assert_eq!(resolved.as_i64(), Some(1));
    }

    #[tokio::test]
    async fn test_dry_run_records_plan_only() {
        let source = source_store().await;
        let dest = warehouse_store();

        let report = executor(PipelineConfig::new().with_dry_run(true), &source, &dest)
            .run()
            .await
            .unwrap();

        assert!(report.dry_run);
        assert!(report.stages.iter().all(|r| r.output.skipped));
        assert!(report.completed_stages().is_empty());
        let schemas = scalar(
            dest.as_ref(),
            "SELECT COUNT(*) FROM information_schema.schemata WHERE schema_name = 'dw'",
        )
        .await;
        assert_eq!(schemas.as_i64(), Some(0));
    }

    #[tokio::test]
    async fn test_custom_graph_must_be_acyclic() {
        let source = source_store().await;
        let dest = warehouse_store();
        let mut graph = StageGraph::standard();
        graph.add_dependency(StageId::FactSales, StageId::Staging);

        let result = PipelineExecutor::with_graph(
            etl_config(),
            PipelineConfig::new(),
            graph,
            source,
            dest,
        );
        assert!(matches!(result, Err(PipelineError::Cycle(_))));
    }
}

mod kpi_tests {
    use super::*;

    #[tokio::test]
    async fn test_every_kpi_runs_on_loaded_warehouse() {
        let source = source_store().await;
        let dest = warehouse_store();
        executor(PipelineConfig::new(), &source, &dest)
            .run()
            .await
            .unwrap();

        for kpi in Kpi::all() {
            run_kpi(dest.as_ref(), "dw", *kpi)
                .await
                .unwrap_or_else(|e| panic!("{}: {}", kpi, e));
        }

        let top = run_kpi(dest.as_ref(), "dw", Kpi::TopProducts).await.unwrap();
        assert_eq!(top.len(), 3);
        let revenue = top.column_index("revenue").unwrap();
        let product = top.column_index("product_name").unwrap();
        assert_eq!(
            top.rows[0][product].as_str(),
            Some("Mountain-100 Silver, 38")
        );
        assert!(top.rows[0][revenue].as_decimal().unwrap() > top.rows[1][revenue].as_decimal().unwrap());
    }

    #[tokio::test]
    async fn test_analytical_kpis_on_loaded_warehouse() {
        let source = source_store().await;
        let dest = warehouse_store();
        executor(PipelineConfig::new(), &source, &dest)
            .run()
            .await
            .unwrap();

        // one bike line carries over 91% of revenue, so no product reaches class A
        let abc = run_kpi(dest.as_ref(), "dw", Kpi::AbcClassification)
            .await
            .unwrap();
        let class = abc.column_index("abc_class").unwrap();
        let classes: Vec<&str> = abc.rows.iter().map(|r| r[class].as_str().unwrap()).collect();
        assert_eq!(classes, vec!["B", "C", "C"]);
        let share = abc.column_index("cumulative_share_pct").unwrap();
        assert_eq!(abc.rows[2][share].as_decimal().unwrap(), rust_decimal::Decimal::from(100));

        // salesperson 274 has no quota and order 43697 has no salesperson
        let sellers = run_kpi(dest.as_ref(), "dw", Kpi::SalespersonPerformance)
            .await
            .unwrap();
        assert_eq!(sellers.len(), 1);
        let name = sellers.column_index("salesperson_name").unwrap();
        let territory = sellers.column_index("territory_name").unwrap();
        let orders = sellers.column_index("orders").unwrap();
        assert_eq!(sellers.rows[0][name].as_str(), Some("Michael Blythe"));
        assert_eq!(sellers.rows[0][territory].as_str(), Some("Northeast"));
        assert_eq!(sellers.rows[0][orders].as_i64(), Some(1));

        let clv = run_kpi(dest.as_ref(), "dw", Kpi::CustomerLifetimeValue)
            .await
            .unwrap();
        let customers = clv.column_index("customers").unwrap();
        let buyers: i64 = clv.rows.iter().map(|r| r[customers].as_i64().unwrap()).sum();
        assert_eq!(buyers, 2);
        assert!(clv.column_index("value_tier").is_some());

        // 2011-05-31 is a Tuesday, 2011-06-01 a Wednesday
        let season = run_kpi(dest.as_ref(), "dw", Kpi::Seasonality).await.unwrap();
        let day = season.column_index("day_name").unwrap();
        let quarter = season.column_index("calendar_quarter").unwrap();
        let days: Vec<&str> = season.rows.iter().map(|r| r[day].as_str().unwrap()).collect();
        assert_eq!(days, vec!["Tuesday", "Wednesday"]);
        assert!(season.rows.iter().all(|r| r[quarter].as_i64() == Some(2)));
    }

    #[tokio::test]
    async fn test_kpis_on_empty_warehouse_return_no_rows() {
        let dest = warehouse_store();
        bootstrap(dest.as_ref()).await;

        let rows = run_kpi(dest.as_ref(), "dw", Kpi::RegionalSales).await.unwrap();
        assert!(rows.is_empty());
        let json = rows.to_json();
        assert!(json.is_empty());
    }
}
