//! Configuration module for metric-sink.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Database settings (driver, url, column type names, lock timeout)
//! - Table filter settings (explicit allow-list, record-all switch)

mod app;
mod validation;

pub use app::{AppConfig, DatabaseConfig, DatabaseDriver, FilterConfig};
pub use validation::{ConfigError, expand_env_vars, parse_duration};

// Re-export constants
pub use app::DEFAULT_LOCK_TIMEOUT;
