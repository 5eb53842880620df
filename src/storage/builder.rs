//! Reporter builder.
//!
//! Collects the store URL, type names and lock timeout, then assembles a
//! [`SqlReporter`] around a fresh [`ConnectionManager`].

use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::filter::TableFilter;
use crate::storage::StorageError;
use crate::storage::connection::{ConnectionManager, DEFAULT_LOCK_TIMEOUT, Target};
use crate::storage::mapping::{DEFAULT_FLOAT_TYPE, DEFAULT_TEXT_TYPE, TypeMapper};
use crate::storage::query::QueryBuilder;
use crate::storage::reporter::SqlReporter;

/// Builder for constructing a reporter.
pub struct ReporterBuilder<F> {
    url: String,
    filter: F,
    text_type: String,
    float_type: String,
    lock_timeout: Duration,
    connect_eagerly: bool,
}

impl<F: TableFilter> ReporterBuilder<F> {
    /// Create a new builder for the store at `url`.
    ///
    /// See [`Target::parse`] for accepted URLs.
    pub fn new(url: impl Into<String>, filter: F) -> Self {
        Self {
            url: url.into(),
            filter,
            text_type: DEFAULT_TEXT_TYPE.to_string(),
            float_type: DEFAULT_FLOAT_TYPE.to_string(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            connect_eagerly: true,
        }
    }

    /// Builder pre-filled from a validated database configuration.
    pub fn from_config(config: &DatabaseConfig, filter: F) -> Result<Self, StorageError> {
        let lock_timeout = config
            .lock_timeout()
            .map_err(|e| StorageError::Internal(format!("database lock_timeout: {e}")))?;

        Ok(Self::new(config.url.clone(), filter)
            .text_type(config.text_type.clone())
            .float_type(config.float_type.clone())
            .lock_timeout(lock_timeout))
    }

    /// Column type used for text values (default: `VARCHAR`).
    pub fn text_type(mut self, text_type: impl Into<String>) -> Self {
        self.text_type = text_type.into();
        self
    }

    /// Column type used for floating point values (default: `REAL`).
    pub fn float_type(mut self, float_type: impl Into<String>) -> Self {
        self.float_type = float_type.into();
        self
    }

    /// How long a report waits for the shared connection (default: 5s).
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Try to connect in [`build`](Self::build) (default: true).
    ///
    /// A failed eager connect is only logged; the first report retries.
    pub fn connect_eagerly(mut self, eager: bool) -> Self {
        self.connect_eagerly = eager;
        self
    }

    /// Build the reporter.
    ///
    /// Fails only on invalid type names; store availability never fails the build.
    pub fn build(self) -> Result<SqlReporter<F>, StorageError> {
        let mapper = TypeMapper::new(self.text_type, self.float_type)?;
        let connections = ConnectionManager::new(Target::parse(&self.url), self.lock_timeout);

        if self.connect_eagerly && connections.acquire().is_err() {
            tracing::warn!("Connection is not available yet - will try to reconnect on first report");
        }

        Ok(SqlReporter::new(
            self.filter,
            QueryBuilder::new(mapper),
            connections,
        ))
    }
}
