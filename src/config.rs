//! Run configuration
//!
//! Everything a run needs is carried by an explicit [`EtlConfig`] value that
//! is handed to each component at construction. Nothing in the library reads
//! process environment; [`ConnectionConfig::from_env`] exists for the CLI edge.
//!
//! ```toml
//! [source]
//! backend = "postgres"
//! host = "sales-db"
//! database = "AdventureWorks2022"
//! user = "sa"
//!
//! [destination]
//! backend = "duckdb"
//! path = "warehouse.duckdb"
//!
//! [[tables]]
//! source = "Sales.Customer"
//! staging = "stage_customers"
//!
//! [calendar]
//! start = "2008-01-01"
//! end = "2030-12-31"
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::staging::{StagingConfig, tables};

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    DuckDb,
    Postgres,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::DuckDb => write!(f, "duckdb"),
            Backend::Postgres => write!(f, "postgres"),
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "duckdb" => Ok(Backend::DuckDb),
            "postgres" | "postgresql" => Ok(Backend::Postgres),
            _ => Err(format!("Unknown backend: {}. Valid: duckdb, postgres", s)),
        }
    }
}

/// Connection parameters for one store
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub backend: Backend,
    /// DuckDB database file; in-memory when absent
    pub path: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            backend: Backend::DuckDb,
            path: None,
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            user: String::new(),
            password: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ConnectionConfig {
    /// In-memory DuckDB store
    pub fn duckdb_memory() -> Self {
        Self::default()
    }

    /// DuckDB database file
    pub fn duckdb_file(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// PostgreSQL server
    pub fn postgres(
        host: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            backend: Backend::Postgres,
            host: host.into(),
            database: database.into(),
            user: user.into(),
            password,
            ..Self::default()
        }
    }

    /// Read `<PREFIX>_BACKEND`, `_HOST`, `_PORT`, `_DB`, `_USER`, `_PASSWORD`, `_PATH`
    ///
    /// Unset variables keep the values of `fallback`.
    pub fn from_env(prefix: &str, fallback: ConnectionConfig) -> Result<Self, ConfigError> {
        Self::from_vars(prefix, fallback, |key| std::env::var(key).ok())
    }

    /// [`ConnectionConfig::from_env`] over an arbitrary variable lookup
    pub fn from_vars(
        prefix: &str,
        fallback: ConnectionConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(&format!("{}_{}", prefix, name));
        let mut config = fallback;

        if let Some(backend) = var("BACKEND") {
            config.backend = backend.parse().map_err(ConfigError::Invalid)?;
        }
        if let Some(host) = var("HOST") {
            config.host = host;
        }
        if let Some(port) = var("PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{}_PORT is not a port: {}", prefix, port)))?;
        }
        if let Some(database) = var("DB") {
            config.database = database;
        }
        if let Some(user) = var("USER") {
            config.user = user;
        }
        if let Some(password) = var("PASSWORD") {
            config.password = Some(password);
        }
        if let Some(path) = var("PATH") {
            config.path = Some(path);
        }
        Ok(config)
    }

    /// Printable target without credentials
    pub fn describe(&self) -> String {
        match self.backend {
            Backend::DuckDb => format!("duckdb:{}", self.path.as_deref().unwrap_or(":memory:")),
            Backend::Postgres => format!(
                "postgres://{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }

    fn validate(&self, role: &str) -> Result<(), String> {
        if self.backend == Backend::Postgres {
            if self.host.is_empty() {
                return Err(format!("{} host is required for postgres", role));
            }
            if self.database.is_empty() {
                return Err(format!("{} database is required for postgres", role));
            }
        }
        Ok(())
    }
}

/// Source table copied into one staging table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Qualified source name, e.g. `Sales.Customer`
    pub source: String,
    /// Staging table name, e.g. `stage_customers`
    pub staging: String,
}

impl TableMapping {
    pub fn new(source: impl Into<String>, staging: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            staging: staging.into(),
        }
    }
}

/// The AdventureWorks extraction set, in extraction order
pub fn default_mappings() -> Vec<TableMapping> {
    [
        ("Sales.Customer", tables::CUSTOMERS),
        ("Person.Person", tables::PERSONS),
        ("Production.Product", tables::PRODUCTS),
        ("Production.ProductSubcategory", tables::SUBCATEGORIES),
        ("Production.ProductCategory", tables::CATEGORIES),
        ("Sales.SalesTerritory", tables::TERRITORIES),
        ("Sales.SalesPerson", tables::SALESPERSONS),
        ("HumanResources.Employee", tables::EMPLOYEES),
        ("Sales.SpecialOffer", tables::OFFERS),
        ("Sales.SalesOrderHeader", tables::ORDER_HEADERS),
        ("Sales.SalesOrderDetail", tables::ORDER_DETAILS),
    ]
    .into_iter()
    .map(|(source, staging)| TableMapping::new(source, staging))
    .collect()
}

/// Star schema namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub schema: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            schema: "dw".to_string(),
        }
    }
}

/// Inclusive date range seeded into the date dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            start: NaiveDate::from_ymd_opt(2008, 1, 1).unwrap_or(NaiveDate::MIN),
            end: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap_or(NaiveDate::MAX),
        }
    }
}

/// Contract with the external scheduler
///
/// The core never schedules itself; this is exported alongside the stage
/// graph and drives the CLI's whole-run retry loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulePolicy {
    pub cron: String,
    pub max_active_runs: u32,
    pub retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            cron: "0 2 * * *".to_string(),
            max_active_runs: 1,
            retries: 2,
            retry_delay_secs: 180,
        }
    }
}

/// Complete configuration for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub source: ConnectionConfig,
    pub destination: ConnectionConfig,
    /// Exhaustive source-to-staging mapping, in extraction order
    pub tables: Vec<TableMapping>,
    pub staging: StagingConfig,
    pub warehouse: WarehouseConfig,
    pub calendar: CalendarConfig,
    pub schedule: SchedulePolicy,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            source: ConnectionConfig::default(),
            destination: ConnectionConfig::default(),
            tables: default_mappings(),
            staging: StagingConfig::default(),
            warehouse: WarehouseConfig::default(),
            calendar: CalendarConfig::default(),
            schedule: SchedulePolicy::default(),
        }
    }
}

impl EtlConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: EtlConfig = toml::from_str(text)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Configuration built from `SOURCE_*` and `DW_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// [`EtlConfig::from_env`] over an arbitrary variable lookup
    ///
    /// The source has no defaults: a PostgreSQL source needs `SOURCE_HOST`
    /// and `SOURCE_USER`, a DuckDB source needs `SOURCE_PATH`. The
    /// destination falls back to the `adventureworks_dw` server without a
    /// password.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let source = ConnectionConfig::from_vars(
            "SOURCE",
            ConnectionConfig::postgres("", "AdventureWorks2022", "", None),
            &lookup,
        )?;
        let required: &[&str] = match source.backend {
            Backend::Postgres => &["HOST", "USER"],
            Backend::DuckDb => &["PATH"],
        };
        let missing: Vec<String> = required
            .iter()
            .filter(|name| lookup(&format!("SOURCE_{}", name)).is_none())
            .map(|name| format!("SOURCE_{}", name))
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Source connection not configured; set {}",
                missing.join(", ")
            )));
        }

        let destination = ConnectionConfig::from_vars(
            "DW",
            ConnectionConfig::postgres("adventureworks_dw", "dw_adventureworks", "dw_user", None),
            &lookup,
        )?;
        let config = Self {
            source,
            destination,
            ..Self::default()
        };
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn with_source(mut self, source: ConnectionConfig) -> Self {
        self.source = source;
        self
    }

    pub fn with_destination(mut self, destination: ConnectionConfig) -> Self {
        self.destination = destination;
        self
    }

    pub fn with_tables(mut self, tables: Vec<TableMapping>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_staging(mut self, staging: StagingConfig) -> Self {
        self.staging = staging;
        self
    }

    pub fn with_calendar(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.calendar = CalendarConfig { start, end };
        self
    }

    /// Staging table name for a source, if mapped
    pub fn staging_table_for(&self, source: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|m| m.source == source)
            .map(|m| m.staging.as_str())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.source.validate("source")?;
        self.destination.validate("destination")?;

        if self.tables.is_empty() {
            return Err("At least one table mapping is required".to_string());
        }

        let mut seen = HashSet::new();
        for mapping in &self.tables {
            if mapping.source.split('.').any(|part| !is_identifier(part)) {
                return Err(format!("Invalid source table name: {}", mapping.source));
            }
            if !is_identifier(&mapping.staging) {
                return Err(format!("Invalid staging table name: {}", mapping.staging));
            }
            if !seen.insert(mapping.staging.as_str()) {
                return Err(format!("Duplicate staging table: {}", mapping.staging));
            }
        }

        let missing: Vec<&str> = tables::REQUIRED
            .iter()
            .copied()
            .filter(|name| !seen.contains(name))
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "Mapping does not produce required staging tables: {}",
                missing.join(", ")
            ));
        }

        for schema in [&self.staging.schema, &self.warehouse.schema] {
            if !is_identifier(schema) {
                return Err(format!("Invalid schema name: {}", schema));
            }
        }
        if self.staging.schema == self.warehouse.schema {
            return Err("Staging and warehouse schemas must differ".to_string());
        }

        self.staging.validate()?;

        if self.calendar.start > self.calendar.end {
            return Err(format!(
                "Calendar start {} is after end {}",
                self.calendar.start, self.calendar.end
            ));
        }

        Ok(())
    }
}

/// Plain SQL identifier: letters, digits, underscore; not starting with a digit
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
