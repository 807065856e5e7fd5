//! salesdw command line

mod commands;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::init::{InitArgs, handle_init};
use commands::plan::{PlanArgs, handle_plan};
use commands::report::{ReportArgs, handle_report, handle_status};
use commands::run::{RunArgs, handle_run};
use error::CliError;

#[derive(Parser)]
#[command(name = "salesdw", version, about = "Load operational sales data into a star schema")]
struct Cli {
    /// TOML configuration; without it SOURCE_* and DW_* variables are used
    #[arg(long, short, global = true, env = "SALESDW_CONFIG")]
    config: Option<PathBuf>,

    /// Debug logging unless RUST_LOG is set
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the warehouse schema and tables
    Init {
        /// Write a default configuration file instead
        #[arg(long)]
        write_config: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    /// Run every stage, retrying the whole run on failure
    Run {
        #[arg(long)]
        dry_run: bool,
        /// Save the JSON run report here
        #[arg(long)]
        report: Option<PathBuf>,
        #[arg(long)]
        retries: Option<u32>,
        #[arg(long)]
        retry_delay_secs: Option<u64>,
    },
    /// Run selected stages only, in graph order
    Stage {
        #[arg(required = true)]
        stages: Vec<String>,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the stage execution order
    Plan {
        /// Graphviz DOT output
        #[arg(long)]
        dot: bool,
    },
    /// Print KPI rows as JSON
    Report {
        /// KPI names; all when omitted
        kpis: Vec<String>,
    },
    /// Summarize a saved run report
    Status { path: PathBuf },
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = cli.config;
    match cli.command {
        Command::Init {
            write_config,
            force,
        } => {
            handle_init(&InitArgs {
                config,
                write_config,
                force,
            })
            .await
        }
        Command::Run {
            dry_run,
            report,
            retries,
            retry_delay_secs,
        } => {
            handle_run(&RunArgs {
                config,
                stages: Vec::new(),
                dry_run,
                report,
                retries,
                retry_delay_secs,
            })
            .await
        }
        Command::Stage {
            stages,
            dry_run,
            report,
        } => {
            handle_run(&RunArgs {
                config,
                stages,
                dry_run,
                report,
                retries: Some(0),
                retry_delay_secs: None,
            })
            .await
        }
        Command::Plan { dot } => handle_plan(&PlanArgs { config, dot }),
        Command::Report { kpis } => handle_report(&ReportArgs { config, kpis }).await,
        Command::Status { path } => handle_status(&path),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("Error: {}", err);
            Ok(ExitCode::FAILURE)
        }
    }
}
