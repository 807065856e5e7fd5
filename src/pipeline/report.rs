//! Run report persisted after every run

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::dag::StageId;
use super::error::{PipelineError, PipelineResult};

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Output from one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    pub success: bool,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    /// Stage-specific counts
    pub metadata: HashMap<String, serde_json::Value>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl StageOutput {
    pub fn success() -> Self {
        Self {
            success: true,
            skipped: false,
            skip_reason: None,
            metadata: HashMap::new(),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::success()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::success()
        }
        .with_metadata("error", serde_json::Value::String(error.into()))
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}

/// One executed (or planned) stage in run order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageId,
    pub output: StageOutput,
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub name: Option<String>,
    /// SHA-256 of the serialized configuration
    pub config_hash: String,
    pub status: RunStatus,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<StageRecord>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>, config_hash: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            name: None,
            config_hash: config_hash.into(),
            status: RunStatus::Running,
            dry_run: false,
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn record(&mut self, stage: StageId, output: StageOutput) {
        self.stages.push(StageRecord { stage, output });
    }

    pub fn complete(&mut self, duration_ms: u64) {
        self.status = RunStatus::Completed;
        self.finish(duration_ms);
    }

    pub fn fail(&mut self, error: impl Into<String>, duration_ms: u64) {
        self.status = RunStatus::Failed;
        self.error = Some(error.into());
        self.finish(duration_ms);
    }

    fn finish(&mut self, duration_ms: u64) {
        self.finished_at = Some(Utc::now());
        self.duration_ms = duration_ms;
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn stage_output(&self, stage: StageId) -> Option<&StageOutput> {
        self.stages
            .iter()
            .find(|record| record.stage == stage)
            .map(|record| &record.output)
    }

    /// Stages that ran to completion, in order
    pub fn completed_stages(&self) -> Vec<StageId> {
        self.stages
            .iter()
            .filter(|r| r.output.success && !r.output.skipped)
            .map(|r| r.stage)
            .collect()
    }

    pub fn duration_formatted(&self) -> String {
        let secs = self.duration_ms / 1000;
        let mins = secs / 60;
        let remaining_secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, remaining_secs)
        } else if secs > 0 {
            format!("{}s", secs)
        } else {
            format!("{}ms", self.duration_ms)
        }
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!();
        eprintln!("Run {} - {}", self.run_id, self.status);
        if self.dry_run {
            eprintln!("Dry run: no stage touched the stores");
        }
        eprintln!("Duration: {}", self.duration_formatted());

        for record in &self.stages {
            let output = &record.output;
            let status = if output.skipped {
                "skipped"
            } else if output.success {
                "ok"
            } else {
                "failed"
            };
            eprintln!(
                "  - {}: {} ({}ms)",
                record.stage, status, output.duration_ms
            );
        }

        if let Some(error) = &self.error {
            eprintln!("Error: {}", error);
        }
    }

    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::ReportNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_report_lifecycle() {
        let mut report = RunReport::new("run-1", "hash");
        assert_eq!(report.status, RunStatus::Running);

        report.record(
            StageId::CalendarSeed,
            StageOutput::skipped("dim_date already populated"),
        );
        report.record(
            StageId::Staging,
            StageOutput::success().with_metadata("rows", serde_json::json!(1200)),
        );
        report.complete(65_000);

        assert!(report.is_success());
        assert_eq!(report.completed_stages(), vec![StageId::Staging]);
        assert_eq!(report.duration_formatted(), "1m 5s");
        assert!(report.stage_output(StageId::CalendarSeed).unwrap().skipped);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn test_failed_report() {
        let mut report = RunReport::new("run-2", "hash");
        report.record(StageId::DimRegion, StageOutput::failed("relation missing"));
        report.fail("Stage 'dim_region' failed", 12);

        assert!(!report.is_success());
        assert_eq!(report.duration_formatted(), "12ms");
        let output = report.stage_output(StageId::DimRegion).unwrap();
        assert!(!output.success);
        assert_eq!(output.metadata["error"], "relation missing");
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.json");

        let mut report = RunReport::new("run-3", "abc");
        report.record(StageId::FactSales, StageOutput::success().with_duration(40));
        report.complete(40);
        report.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"fact_sales\""));
        assert!(text.contains("\"completed\""));

        let loaded = RunReport::load(&path).unwrap();
        assert_eq!(loaded.run_id, "run-3");
        assert_eq!(loaded.stages.len(), 1);
        assert_eq!(loaded.stages[0].output.duration_ms, 40);

        assert!(matches!(
            RunReport::load(&temp.path().join("missing.json")),
            Err(PipelineError::ReportNotFound(_))
        ));
    }
}
