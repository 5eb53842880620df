//! Storage-specific error types.
//!
//! [`StorageError`] is returned by the fallible building blocks (connection
//! manager, query builder, schema resolver). The reporter itself never
//! surfaces it; it classifies failures into [`StoreErrorKind`] and logs.

use thiserror::Error;

use crate::storage::types::ColumnType;

/// Errors that can occur in the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database operation failed (duckdb error).
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// No connection to the store could be obtained.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A sample or tag value has no storage column type.
    #[error("unsupported value type '{type_name}' for column '{column}'")]
    UnsupportedValue { column: String, type_name: String },

    /// A tag collides with a reserved column (`TIME` or `VALUE`).
    #[error("tag '{0}' collides with a reserved column")]
    ReservedColumn(String),

    /// An identifier or type name cannot be used in generated SQL.
    #[error("invalid identifier: '{0}'")]
    InvalidIdentifier(String),

    /// Internal error (e.g., inconsistent connection state).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Structured classification of a failed statement.
///
/// Derived from the live catalog rather than from driver error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Target table does not exist.
    TableNotFound,
    /// Table exists but lacks these tag columns, in tag order.
    ColumnNotFound(Vec<(String, ColumnType)>),
    /// The object a DDL statement tried to create already exists.
    DuplicateObject,
    /// Anything else.
    Other,
}

/// Failure to open a connection.
///
/// Both classes make the store unavailable for the current sample only.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// Expected to recover without intervention (e.g., volume not mounted yet).
    #[error("{0}")]
    Transient(String),

    /// The engine refused to open the database.
    #[error("{0}")]
    Fatal(#[from] duckdb::Error),
}
