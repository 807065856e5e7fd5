//! Staging configuration

use serde::{Deserialize, Serialize};

use crate::config::is_identifier;

/// Settings for the staging namespace and bulk load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Namespace holding the staging tables
    pub schema: String,
    /// Rows sampled per table for type inference
    pub sample_size: usize,
    /// Rows per insert statement
    pub batch_size: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            schema: "staging".to_string(),
            sample_size: 1000,
            batch_size: 500,
        }
    }
}

impl StagingConfig {
    /// Create a builder
    pub fn builder() -> StagingConfigBuilder {
        StagingConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), String> {
        if !is_identifier(&self.schema) {
            return Err(format!("Invalid staging schema: {}", self.schema));
        }
        if self.sample_size == 0 {
            return Err("Staging sample size must be at least 1".to_string());
        }
        if self.batch_size == 0 {
            return Err("Staging batch size must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Builder for StagingConfig
#[derive(Debug, Default)]
pub struct StagingConfigBuilder {
    schema: Option<String>,
    sample_size: Option<usize>,
    batch_size: Option<usize>,
}

impl StagingConfigBuilder {
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn sample_size(mut self, rows: usize) -> Self {
        self.sample_size = Some(rows);
        self
    }

    pub fn batch_size(mut self, rows: usize) -> Self {
        self.batch_size = Some(rows);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<StagingConfig, String> {
        let defaults = StagingConfig::default();
        let config = StagingConfig {
            schema: self.schema.unwrap_or(defaults.schema),
            sample_size: self.sample_size.unwrap_or(defaults.sample_size),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = StagingConfig::builder().build().unwrap();
        assert_eq!(config, StagingConfig::default());
    }

    #[test]
    fn test_builder_overrides() {
        let config = StagingConfig::builder()
            .schema("landing")
            .sample_size(10)
            .batch_size(2)
            .build()
            .unwrap();
        assert_eq!(config.schema, "landing");
        assert_eq!(config.sample_size, 10);
        assert_eq!(config.batch_size, 2);
    }

    #[test]
    fn test_builder_rejects_zero_batch() {
        assert!(StagingConfig::builder().batch_size(0).build().is_err());
        assert!(StagingConfig::builder().schema("bad name").build().is_err());
    }
}
