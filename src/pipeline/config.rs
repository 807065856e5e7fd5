//! Run options

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::dag::StageId;

/// Options for one orchestrated run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Label recorded in the run report
    pub name: Option<String>,
    /// Stages to run (empty = all); always executed in graph order
    pub stages: Vec<StageId>,
    /// Plan and validate without touching either store
    pub dry_run: bool,
    /// Write the JSON run report here after the run, successful or not
    pub report_path: Option<PathBuf>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set specific stages to run
    pub fn with_stages(mut self, stages: Vec<StageId>) -> Self {
        self.stages = stages;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    /// Check if a specific stage should run
    pub fn should_run_stage(&self, stage: StageId) -> bool {
        self.stages.is_empty() || self.stages.contains(&stage)
    }

    /// Keep the selected stages of `order`, preserving its sequence
    pub fn effective_stages(&self, order: &[StageId]) -> Vec<StageId> {
        order
            .iter()
            .copied()
            .filter(|stage| self.should_run_stage(*stage))
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage) {
                return Err(format!("Stage '{}' selected more than once", stage));
            }
        }
        if let Some(path) = &self.report_path {
            if path.as_os_str().is_empty() {
                return Err("report_path must not be empty".to_string());
            }
        }
        Ok(())
    }
}
