//! Pipeline executor for a full warehouse run

use std::sync::Arc;
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use super::config::PipelineConfig;
use super::dag::{StageGraph, StageId};
use super::error::{PipelineError, PipelineResult};
use super::report::{RunReport, StageOutput};
use crate::config::EtlConfig;
use crate::staging::StagingLoader;
use crate::store::SqlStore;
use crate::warehouse::{
    CalendarSeeder, DimensionUpserter, FactLoader, SeedOutcome, StarSchema, TableNames,
};

/// Runs the stages of [`StageGraph::standard`] against a source and a destination
pub struct PipelineExecutor {
    etl: EtlConfig,
    config: PipelineConfig,
    graph: StageGraph,
    names: TableNames,
    source: Arc<dyn SqlStore>,
    dest: Arc<dyn SqlStore>,
}

impl PipelineExecutor {
    pub fn new(
        etl: EtlConfig,
        config: PipelineConfig,
        source: Arc<dyn SqlStore>,
        dest: Arc<dyn SqlStore>,
    ) -> PipelineResult<Self> {
        Self::with_graph(etl, config, StageGraph::standard(), source, dest)
    }

    /// Executor over a custom graph
    pub fn with_graph(
        etl: EtlConfig,
        config: PipelineConfig,
        graph: StageGraph,
        source: Arc<dyn SqlStore>,
        dest: Arc<dyn SqlStore>,
    ) -> PipelineResult<Self> {
        check_inputs(&etl, &config, &graph)?;

        let names = TableNames::new(&etl.staging.schema, &etl.warehouse.schema);
        Ok(Self {
            etl,
            config,
            graph,
            names,
            source,
            dest,
        })
    }

    pub fn graph(&self) -> &StageGraph {
        &self.graph
    }

    /// Stages this executor would run, in order
    pub fn plan(&self) -> PipelineResult<Vec<StageId>> {
        planned_stages(&self.graph, &self.config)
    }

    /// Dry run over the standard graph without any store
    ///
    /// Validates both configs, records every planned stage as skipped and
    /// saves the report when a path is set.
    pub fn dry_run(etl: &EtlConfig, config: &PipelineConfig) -> PipelineResult<RunReport> {
        let graph = StageGraph::standard();
        check_inputs(etl, config, &graph)?;
        let run_id = Uuid::new_v4().to_string();
        let _span = info_span!("pipeline_run", run_id = %run_id, dry_run = true).entered();
        dry_run_report(etl, config, &graph, run_id, Instant::now())
    }

    /// Create the warehouse schema and tables if missing
    pub async fn bootstrap(&self) -> PipelineResult<()> {
        StarSchema::new(self.names.clone())
            .ensure(self.dest.as_ref())
            .await
            .map_err(|e| PipelineError::stage_failure("bootstrap", e))
    }

    /// Run the selected stages in graph order, stopping at the first failure
    pub async fn run(&self) -> PipelineResult<RunReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = info_span!("pipeline_run", run_id = %run_id, dry_run = self.config.dry_run);
        self.run_inner(run_id).instrument(span).await
    }

    async fn run_inner(&self, run_id: String) -> PipelineResult<RunReport> {
        let start = Instant::now();
        if self.config.dry_run {
            return dry_run_report(&self.etl, &self.config, &self.graph, run_id, start);
        }

        let mut report = RunReport::new(&run_id, config_hash(&self.etl, &self.config)?);
        report.name = self.config.name.clone();

        let stages = self.plan()?;
        info!(
            run_id = %run_id,
            stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            "Starting pipeline"
        );

        if let Err(e) = self.bootstrap().await {
            error!(error = %e, "Star schema bootstrap failed");
            report.fail(e.to_string(), elapsed_ms(start));
            save_report(&self.config, &report)?;
            return Err(e);
        }

        for stage in &stages {
            let stage_span = info_span!("pipeline_stage", stage = stage.name());
            let result = async {
                info!(stage = stage.name(), "Starting stage");
                self.run_stage(*stage).await
            }
            .instrument(stage_span)
            .await;

            match result {
                Ok(output) => {
                    info!(
                        stage = stage.name(),
                        duration_ms = output.duration_ms,
                        "Stage completed"
                    );
                    report.record(*stage, output);
                }
                Err(e) => {
                    let error_msg = e.to_string();
                    error!(stage = stage.name(), error = %error_msg, "Stage failed");
                    report.record(*stage, StageOutput::failed(&error_msg));
                    report.fail(&error_msg, elapsed_ms(start));
                    save_report(&self.config, &report)?;
                    return Err(e);
                }
            }
        }

        report.complete(elapsed_ms(start));
        save_report(&self.config, &report)?;

        info!(
            run_id = %run_id,
            duration_ms = report.duration_ms,
            stages_completed = report.completed_stages().len(),
            "Pipeline completed"
        );
        Ok(report)
    }

    /// Run a single stage
    async fn run_stage(&self, stage: StageId) -> PipelineResult<StageOutput> {
        let start = Instant::now();

        let output = match stage {
            StageId::CalendarSeed => {
                let outcome = CalendarSeeder::new(self.etl.calendar, self.names.clone())
                    .seed(self.dest.as_ref())
                    .await
                    .map_err(|e| PipelineError::stage_failure(stage.name(), e))?;
                match outcome {
                    SeedOutcome::Skipped { existing } => {
                        StageOutput::skipped("dim_date already populated")
                            .with_metadata("existing_rows", serde_json::json!(existing))
                    }
                    SeedOutcome::Seeded { rows } => {
                        StageOutput::success().with_metadata("rows", serde_json::json!(rows))
                    }
                }
            }
            StageId::Staging => {
                let staged = StagingLoader::new(self.etl.staging.clone(), self.etl.tables.clone())
                    .load_all(self.source.as_ref(), self.dest.as_ref())
                    .await
                    .map_err(|e| PipelineError::stage_failure(stage.name(), e))?;
                let placeholders: Vec<&str> = staged
                    .iter()
                    .filter(|t| t.placeholder)
                    .map(|t| t.target.as_str())
                    .collect();
                StageOutput::success()
                    .with_metadata("tables", serde_json::json!(staged.len()))
                    .with_metadata(
                        "rows",
                        serde_json::json!(staged.iter().map(|t| t.rows).sum::<u64>()),
                    )
                    .with_metadata("placeholders", serde_json::json!(placeholders))
                    .with_metadata(
                        "row_counts",
                        serde_json::json!(
                            staged
                                .iter()
                                .map(|t| (t.target.clone(), t.rows))
                                .collect::<std::collections::BTreeMap<_, _>>()
                        ),
                    )
            }
            StageId::StagingCheckpoint | StageId::DimensionsCheckpoint => {
                debug!(stage = stage.name(), "Checkpoint reached");
                StageOutput::success().with_metadata("checkpoint", serde_json::json!(true))
            }
            StageId::DimCustomer
            | StageId::DimProduct
            | StageId::DimRegion
            | StageId::DimSalesperson
            | StageId::DimOffer => {
                let Some(dimension) = stage.dimension() else {
                    return Err(PipelineError::UnknownStage(stage.name().to_string()));
                };
                let affected = DimensionUpserter::new(dimension, self.names.clone())
                    .upsert(self.dest.as_ref())
                    .await
                    .map_err(|e| PipelineError::stage_failure(stage.name(), e))?;
                StageOutput::success()
                    .with_metadata("table", serde_json::json!(dimension.table()))
                    .with_metadata("rows_affected", serde_json::json!(affected))
            }
            StageId::FactSales => {
                let stats = FactLoader::new(self.names.clone())
                    .load(self.dest.as_ref())
                    .await
                    .map_err(|e| PipelineError::stage_failure(stage.name(), e))?;
                StageOutput::success()
                    .with_metadata("inserted", serde_json::json!(stats.inserted))
                    .with_metadata("total_rows", serde_json::json!(stats.total_rows))
                    .with_metadata(
                        "total_net_value",
                        serde_json::json!(stats.total_net_value.to_string()),
                    )
                    .with_metadata(
                        "total_gross_profit",
                        serde_json::json!(stats.total_gross_profit.to_string()),
                    )
            }
        };

        Ok(output.with_duration(elapsed_ms(start)))
    }
}

/// Config, pipeline selection and graph checks shared by every entry point
fn check_inputs(
    etl: &EtlConfig,
    config: &PipelineConfig,
    graph: &StageGraph,
) -> PipelineResult<()> {
    etl.validate().map_err(PipelineError::ConfigError)?;
    config.validate().map_err(PipelineError::ConfigError)?;
    graph.validate()?;
    for stage in &config.stages {
        if !graph.contains(*stage) {
            return Err(PipelineError::UnknownStage(stage.name().to_string()));
        }
    }
    Ok(())
}

fn planned_stages(graph: &StageGraph, config: &PipelineConfig) -> PipelineResult<Vec<StageId>> {
    let order = graph.execution_order()?;
    Ok(config.effective_stages(&order))
}

/// Every planned stage recorded as skipped; no store is touched
fn dry_run_report(
    etl: &EtlConfig,
    config: &PipelineConfig,
    graph: &StageGraph,
    run_id: String,
    start: Instant,
) -> PipelineResult<RunReport> {
    let mut report = RunReport::new(&run_id, config_hash(etl, config)?);
    report.name = config.name.clone();
    report.dry_run = true;

    let stages = planned_stages(graph, config)?;
    info!(
        run_id = %run_id,
        stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Dry run"
    );
    for stage in &stages {
        report.record(
            *stage,
            StageOutput::skipped("dry run")
                .with_metadata("description", serde_json::json!(stage.description())),
        );
    }
    report.complete(elapsed_ms(start));
    save_report(config, &report)?;
    Ok(report)
}

fn save_report(config: &PipelineConfig, report: &RunReport) -> PipelineResult<()> {
    if let Some(path) = &config.report_path {
        report.save(path)?;
        debug!(path = %path.display(), "Saved run report");
    }
    Ok(())
}

/// Hash the config for change detection; passwords are never serialized
fn config_hash(etl: &EtlConfig, config: &PipelineConfig) -> PipelineResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(etl)?);
    hasher.update(serde_json::to_vec(&config.stages)?);
    Ok(format!("{:x}", hasher.finalize()))
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(feature = "duckdb-backend")]
    use crate::store::DuckDbStore;
    use tempfile::TempDir;

    #[cfg(feature = "duckdb-backend")]
    fn stores() -> (Arc<dyn SqlStore>, Arc<dyn SqlStore>) {
        (
            Arc::new(DuckDbStore::memory().unwrap()),
            Arc::new(DuckDbStore::memory().unwrap()),
        )
    }

    #[cfg(feature = "duckdb-backend")]
    #[test]
    fn test_rejects_invalid_config() {
        let (source, dest) = stores();
        let etl = EtlConfig::default().with_tables(Vec::new());
        let err = PipelineExecutor::new(etl, PipelineConfig::default(), source, dest)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }

    #[cfg(feature = "duckdb-backend")]
    #[test]
    fn test_rejects_stage_outside_graph() {
        let (source, dest) = stores();
        let mut graph = StageGraph::new();
        graph.add_dependency(StageId::CalendarSeed, StageId::Staging);
        let config = PipelineConfig::new().with_stages(vec![StageId::FactSales]);
        let err = PipelineExecutor::with_graph(EtlConfig::default(), config, graph, source, dest)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::UnknownStage(_)));
    }

    #[cfg(feature = "duckdb-backend")]
    #[test]
    fn test_plan_follows_selection() {
        let (source, dest) = stores();
        let config =
            PipelineConfig::new().with_stages(vec![StageId::DimSalesperson, StageId::DimRegion]);
        let executor =
            PipelineExecutor::new(EtlConfig::default(), config, source, dest).unwrap();
        assert_eq!(
            executor.plan().unwrap(),
            vec![StageId::DimRegion, StageId::DimSalesperson]
        );
    }

    #[cfg(feature = "duckdb-backend")]
    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let (source, dest) = stores();
        let executor = PipelineExecutor::new(
            EtlConfig::default(),
            PipelineConfig::new().with_dry_run(true),
            source,
            dest.clone(),
        )
        .unwrap();

        let report = executor.run().await.unwrap();
        assert!(report.is_success());
        assert!(report.dry_run);
        assert_eq!(report.stages.len(), StageId::all().len());
        assert!(report.stages.iter().all(|r| r.output.skipped));
        assert_eq!(report.config_hash.len(), 64);

        let schemas = dest
            .query("SELECT schema_name FROM information_schema.schemata WHERE schema_name = 'dw'")
            .await
            .unwrap();
        assert!(schemas.is_empty());
    }

    #[test]
    fn test_config_hash_stable() {
        let pipeline = PipelineConfig::default();
        let a = config_hash(&EtlConfig::default(), &pipeline).unwrap();
        let b = config_hash(&EtlConfig::default(), &pipeline).unwrap();
        let c = config_hash(
            &EtlConfig::default().with_staging(
                crate::staging::StagingConfig::builder()
                    .sample_size(10)
                    .build()
                    .unwrap(),
            ),
            &pipeline,
        )
        .unwrap();
        let d = config_hash(
            &EtlConfig::default(),
            &PipelineConfig::new().with_stages(vec![StageId::Staging]),
        )
        .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_dry_run_without_stores() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dry.json");
        let config = PipelineConfig::new()
            .with_stages(vec![StageId::FactSales, StageId::Staging])
            .with_report_path(&path);

        let report = PipelineExecutor::dry_run(&EtlConfig::default(), &config).unwrap();

        assert!(report.is_success());
        assert!(report.dry_run);
        let stages: Vec<StageId> = report.stages.iter().map(|r| r.stage).collect();
        assert_eq!(stages, vec![StageId::Staging, StageId::FactSales]);
        assert!(report.completed_stages().is_empty());
        assert_eq!(RunReport::load(&path).unwrap().run_id, report.run_id);
    }

    #[test]
    fn test_dry_run_still_validates() {
        let etl = EtlConfig::default().with_tables(Vec::new());
        let err = PipelineExecutor::dry_run(&etl, &PipelineConfig::new()).unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
    }
}
