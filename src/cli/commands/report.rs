//! `salesdw report`

use std::path::PathBuf;

use salesdw::pipeline::RunReport;
use salesdw::reporting::{Kpi, run_kpi};

use super::{load_config, open_destination};
use crate::error::CliError;

pub struct ReportArgs {
    pub config: Option<PathBuf>,
    /// KPI names; empty prints every KPI
    pub kpis: Vec<String>,
}

/// Handle the `report` command: KPI rows as JSON on stdout
pub async fn handle_report(args: &ReportArgs) -> Result<(), CliError> {
    let kpis = if args.kpis.is_empty() {
        Kpi::all().to_vec()
    } else {
        args.kpis
            .iter()
            .map(|name| name.parse::<Kpi>().map_err(CliError::InvalidArgument))
            .collect::<Result<Vec<_>, _>>()?
    };

    let config = load_config(args.config.as_deref())?;
    let dest = open_destination(&config).await?;

    let mut output = serde_json::Map::new();
    for kpi in kpis {
        let rows = run_kpi(dest.as_ref(), &config.warehouse.schema, kpi).await?;
        if rows.is_empty() {
            eprintln!("{}: no rows", kpi);
        }
        output.insert(kpi.name().to_string(), serde_json::Value::Array(rows.to_json()));
    }

    let text = serde_json::to_string_pretty(&serde_json::Value::Object(output))
        .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

/// Handle the `status` command: summary of a saved run report
pub fn handle_status(path: &std::path::Path) -> Result<(), CliError> {
    let report = RunReport::load(path)?;
    eprintln!("Run:     {}", report.run_id);
    eprintln!("Status:  {}", report.status);
    eprintln!(
        "Started: {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    eprintln!("Config:  {}", &report.config_hash[..12.min(report.config_hash.len())]);
    report.print_summary();
    Ok(())
}
