//! `salesdw run` and `salesdw stage`

use std::path::PathBuf;
use std::time::Duration;

use salesdw::config::EtlConfig;
use salesdw::pipeline::{PipelineConfig, PipelineError, PipelineExecutor, RunReport, StageId};
use tracing::{info, warn};

use super::{load_config, open_stores};
use crate::error::CliError;

/// Arguments shared by `run` and `stage`
pub struct RunArgs {
    pub config: Option<PathBuf>,
    /// Stage names; empty runs the whole graph
    pub stages: Vec<String>,
    pub dry_run: bool,
    pub report: Option<PathBuf>,
    /// Whole-run retries; defaults to the schedule policy
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

/// Handle the `run` and `stage` commands
pub async fn handle_run(args: &RunArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;

    let stages = args
        .stages
        .iter()
        .map(|s| s.parse::<StageId>())
        .collect::<Result<Vec<_>, _>>()?;

    let mut pipeline = PipelineConfig::new()
        .with_stages(stages)
        .with_dry_run(args.dry_run);
    if let Some(path) = &args.report {
        pipeline = pipeline.with_report_path(path);
    }

    let retries = args.retries.unwrap_or(config.schedule.retries);
    let delay = Duration::from_secs(
        args.retry_delay_secs
            .unwrap_or(config.schedule.retry_delay_secs),
    );

    let report = run_with_retries(&config, &pipeline, retries, delay).await?;
    report.print_summary();

    if report.is_success() {
        eprintln!();
        eprintln!("Run completed successfully!");
    }
    Ok(())
}

/// Whole-run retry: every attempt reconnects and starts from the first stage
async fn run_with_retries(
    config: &EtlConfig,
    pipeline: &PipelineConfig,
    retries: u32,
    delay: Duration,
) -> Result<RunReport, CliError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match run_once(config, pipeline).await {
            Ok(report) => return Ok(report),
            Err(CliError::Pipeline(e)) if e.is_retryable() && attempt <= retries => {
                warn!(
                    attempt,
                    retries,
                    delay_secs = delay.as_secs(),
                    error = %e,
                    "Run failed, retrying"
                );
                eprintln!("Attempt {} failed: {}", attempt, e);
                tokio::time::sleep(delay).await;
            }
            Err(CliError::Pipeline(e)) if attempt > 1 => {
                return Err(CliError::RetriesExhausted {
                    attempts: attempt,
                    message: e.user_message(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

async fn run_once(config: &EtlConfig, pipeline: &PipelineConfig) -> Result<RunReport, CliError> {
    if pipeline.dry_run {
        // planning needs the graph only; neither store is opened
        return Ok(PipelineExecutor::dry_run(config, pipeline)?);
    }

    let (source, dest) = open_stores(config)
        .await
        .map_err(|e| match e {
            CliError::Store(store) => CliError::Pipeline(PipelineError::Connection(store)),
            other => other,
        })?;
    let executor = PipelineExecutor::new(config.clone(), pipeline.clone(), source, dest)?;
    info!(
        stages = ?executor.plan()?.iter().map(|s| s.name()).collect::<Vec<_>>(),
        "Executing plan"
    );
    Ok(executor.run().await?)
}
