//! `salesdw init`

use std::path::{Path, PathBuf};

use salesdw::config::EtlConfig;
use salesdw::warehouse::{StarSchema, TableNames};

use super::{load_config, open_destination};
use crate::error::CliError;

pub struct InitArgs {
    pub config: Option<PathBuf>,
    /// Write the default configuration here instead of touching the warehouse
    pub write_config: Option<PathBuf>,
    pub force: bool,
}

/// Handle the `init` command
pub async fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    if let Some(path) = &args.write_config {
        return write_default_config(path, args.force);
    }

    let config = load_config(args.config.as_deref())?;
    let dest = open_destination(&config).await?;
    let names = TableNames::new(&config.staging.schema, &config.warehouse.schema);
    StarSchema::new(names)
        .ensure(dest.as_ref())
        .await
        .map_err(|e| salesdw::PipelineError::stage_failure("bootstrap", e))?;

    eprintln!(
        "Star schema '{}' ready on {}",
        config.warehouse.schema,
        config.destination.describe()
    );
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }
    let text = toml::to_string_pretty(&EtlConfig::default())
        .map_err(|e| CliError::InvalidArgument(format!("Cannot render config: {}", e)))?;
    std::fs::write(path, text)?;
    eprintln!("Wrote default configuration to {}", path.display());
    Ok(())
}
