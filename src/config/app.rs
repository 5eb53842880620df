//! Application configuration structures.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::filter::AllowList;
use crate::storage::mapping::{DEFAULT_FLOAT_TYPE, DEFAULT_TEXT_TYPE, is_valid_type_name};

use super::validation::{ConfigError, expand_env_vars, parse_duration};

// =============================================================================
// Constants
// =============================================================================

/// Default time a report waits for the shared connection (5 seconds).
pub const DEFAULT_LOCK_TIMEOUT: Duration = crate::storage::connection::DEFAULT_LOCK_TIMEOUT;

fn default_text_type() -> String {
    DEFAULT_TEXT_TYPE.to_string()
}

fn default_float_type() -> String {
    DEFAULT_FLOAT_TYPE.to_string()
}

fn default_lock_timeout() -> String {
    "5s".to_string()
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Supported store drivers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DatabaseDriver {
    /// Embedded DuckDB (file or in-memory).
    #[default]
    DuckDb,
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Store driver (default: duckdb).
    #[serde(default)]
    pub driver: DatabaseDriver,

    /// Connection URL: a file path, `duckdb:<path>` or `:memory:`.
    pub url: String,

    /// User name. Not used by the embedded driver.
    #[serde(default)]
    pub username: Option<String>,

    /// Password. Not used by the embedded driver.
    #[serde(default)]
    pub password: Option<String>,

    /// Column type for text values (default: "VARCHAR").
    #[serde(default = "default_text_type")]
    pub text_type: String,

    /// Column type for floating point values (default: "REAL").
    #[serde(default = "default_float_type")]
    pub float_type: String,

    /// Maximum wait for the shared connection (default: "5s").
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: "metrics.duckdb".to_string(),
            username: None,
            password: None,
            text_type: default_text_type(),
            float_type: default_float_type(),
            lock_timeout: default_lock_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Parsed [`lock_timeout`](Self::lock_timeout).
    pub fn lock_timeout(&self) -> Result<Duration, String> {
        parse_duration(&self.lock_timeout)
    }

    fn expand_env(&mut self) {
        self.url = expand_env_vars(&self.url);
        self.username = self.username.as_deref().map(expand_env_vars);
        self.password = self.password.as_deref().map(expand_env_vars);
    }
}

// =============================================================================
// Filter Configuration
// =============================================================================

/// Which metric keys are written, and where.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Write every metric key, deriving table names for unlisted keys.
    pub record_all: bool,

    /// Metric key to table name.
    pub tables: BTreeMap<String, String>,
}

impl FilterConfig {
    pub fn to_allow_list(&self) -> AllowList {
        AllowList::new(self.tables.clone()).with_record_all(self.record_all)
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,

    /// Table filter configuration.
    #[serde(default)]
    pub filter: FilterConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` in the database url and credentials are
    /// expanded from the environment.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.database.expand_env();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "database url cannot be empty".to_string(),
            ));
        }

        if !is_valid_type_name(&self.database.text_type) {
            return Err(ConfigError::ValidationError(format!(
                "invalid database text_type: '{}'",
                self.database.text_type
            )));
        }

        if !is_valid_type_name(&self.database.float_type) {
            return Err(ConfigError::ValidationError(format!(
                "invalid database float_type: '{}'",
                self.database.float_type
            )));
        }

        let lock_timeout = self.database.lock_timeout().map_err(|e| {
            ConfigError::ValidationError(format!("database lock_timeout: {}", e))
        })?;
        if lock_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "database lock_timeout must be positive".to_string(),
            ));
        }

        for (key, table) in &self.filter.tables {
            if table.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "table name for metric '{}' cannot be empty",
                    key
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TableFilter;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.driver, DatabaseDriver::DuckDb);
        assert_eq!(config.text_type, "VARCHAR");
        assert_eq!(config.float_type, "REAL");
        assert_eq!(config.lock_timeout().unwrap(), DEFAULT_LOCK_TIMEOUT);
    }

    #[test]
    fn test_load_minimal_yaml() {
        let config = AppConfig::from_yaml(
            r#"
database:
  url: data/metrics.duckdb
"#,
        )
        .unwrap();

        assert_eq!(config.database.url, "data/metrics.duckdb");
        assert_eq!(config.database.text_type, "VARCHAR");
        assert!(!config.filter.record_all);
        assert!(config.filter.tables.is_empty());
    }

    #[test]
    fn test_load_full_yaml() {
        let config = AppConfig::from_yaml(
            r#"
database:
  driver: duckdb
  url: ":memory:"
  text_type: VARCHAR(512)
  float_type: DOUBLE
  lock_timeout: 250ms
filter:
  record_all: true
  tables:
    process_cpu_used-percent: process_cpu
"#,
        )
        .unwrap();

        assert_eq!(config.database.driver, DatabaseDriver::DuckDb);
        assert_eq!(config.database.float_type, "DOUBLE");
        assert_eq!(
            config.database.lock_timeout().unwrap(),
            Duration::from_millis(250)
        );

        let filter = config.filter.to_allow_list();
        assert_eq!(
            filter.table_name("process_cpu_used-percent").as_deref(),
            Some("process_cpu")
        );
        assert_eq!(filter.table_name("jvm.gc").as_deref(), Some("jvm_gc"));
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let result = AppConfig::from_yaml(
            r#"
database:
  driver: oracle
  url: x.db
"#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_url_env_expansion() {
        let config = AppConfig::from_yaml(
            r#"
database:
  url: ${NONEXISTENT_METRIC_SINK_HOME_98765:-/tmp}/m.duckdb
"#,
        )
        .unwrap();
        assert_eq!(config.database.url, "/tmp/m.duckdb");
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig {
            database: DatabaseConfig::default(),
            filter: FilterConfig::default(),
        };
        assert!(config.validate().is_ok());

        config.database.text_type = "TEXT; DROP".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("text_type"));

        config.database.text_type = "VARCHAR".to_string();
        config.database.float_type = "REAL, extra INTEGER".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("float_type"));

        config.database.float_type = "DOUBLE".to_string();
        config.database.lock_timeout = "0s".to_string();
        assert!(config.validate().is_err());

        config.database.lock_timeout = "soon".to_string();
        assert!(config.validate().is_err());

        config.database.lock_timeout = "1s".to_string();
        config
            .filter
            .tables
            .insert("cpu".to_string(), " ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shipped_config_loads() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/config.yaml");
        let config = AppConfig::load(path).unwrap();

        assert!(config.database.url.ends_with("/metrics.duckdb"));
        assert!(!config.filter.record_all);
        assert_eq!(
            config
                .filter
                .tables
                .get("process_cpu_used-percent")
                .map(String::as_str),
            Some("process_cpu")
        );
    }

    #[test]
    fn test_driver_strings() {
        assert_eq!(DatabaseDriver::DuckDb.as_ref(), "duckdb");
        assert_eq!("DUCKDB".parse::<DatabaseDriver>().unwrap(), DatabaseDriver::DuckDb);
    }
}
