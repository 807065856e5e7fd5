//! CLI command implementations

pub mod init;
pub mod plan;
pub mod report;
pub mod run;

use std::path::Path;
use std::sync::Arc;

use salesdw::config::EtlConfig;
use salesdw::store::{SqlStore, connect};
use tracing::{debug, info};

use crate::error::CliError;

/// Config file if given, otherwise `SOURCE_*` / `DW_*` environment variables
pub fn load_config(path: Option<&Path>) -> Result<EtlConfig, CliError> {
    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading configuration file");
            EtlConfig::load(path)?
        }
        None => {
            debug!("Loading configuration from environment");
            EtlConfig::from_env()?
        }
    };
    config.validate().map_err(CliError::InvalidArgument)?;
    Ok(config)
}

pub async fn open_destination(config: &EtlConfig) -> Result<Arc<dyn SqlStore>, CliError> {
    info!(destination = %config.destination.describe(), "Connecting to warehouse");
    Ok(connect(&config.destination).await?)
}

pub async fn open_stores(
    config: &EtlConfig,
) -> Result<(Arc<dyn SqlStore>, Arc<dyn SqlStore>), CliError> {
    info!(source = %config.source.describe(), "Connecting to source");
    let source = connect(&config.source).await?;
    let dest = open_destination(config).await?;
    Ok((source, dest))
}
