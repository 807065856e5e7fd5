//! `salesdw plan`

use std::path::PathBuf;

use salesdw::pipeline::StageGraph;

use super::load_config;
use crate::error::CliError;

pub struct PlanArgs {
    pub config: Option<PathBuf>,
    /// Print Graphviz DOT instead of the ordered list
    pub dot: bool,
}

/// Handle the `plan` command
pub fn handle_plan(args: &PlanArgs) -> Result<(), CliError> {
    let graph = StageGraph::standard();
    graph.validate()?;

    if args.dot {
        println!("{}", graph.to_dot());
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    let order = graph.execution_order()?;

    println!("Execution order:");
    for (i, stage) in order.iter().enumerate() {
        let after: Vec<&str> = graph
            .dependencies(*stage)
            .iter()
            .map(|s| s.name())
            .collect();
        if after.is_empty() {
            println!("  {:>2}. {:<22} {}", i + 1, stage.name(), stage.description());
        } else {
            println!(
                "  {:>2}. {:<22} {} (after {})",
                i + 1,
                stage.name(),
                stage.description(),
                after.join(", ")
            );
        }
    }

    let schedule = &config.schedule;
    println!();
    println!("Schedule: {}", schedule.cron);
    println!("  max active runs: {}", schedule.max_active_runs);
    println!(
        "  retries: {} (delay {}s)",
        schedule.retries, schedule.retry_delay_secs
    );
    println!("Source:      {}", config.source.describe());
    println!("Destination: {}", config.destination.describe());
    Ok(())
}
