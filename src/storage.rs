//! Storage Layer
//!
//! Self-healing DuckDB sink for metric samples. Each metric is written to its
//! own table with a `TIME` column, one column per tag and a `VALUE` column;
//! tables and columns are created as new shapes appear.
//!
//! # Components
//!
//! - [`SqlReporter`]: Report pipeline, never fails the caller
//! - [`ReporterBuilder`]: Construction from URL or [`DatabaseConfig`](crate::config::DatabaseConfig)
//! - [`ConnectionManager`]: Lazily opened single connection
//! - [`QueryBuilder`] / [`TypeMapper`]: SQL generation and value typing
//! - [`schema`]: Catalog inspection and failure classification

mod builder;
pub mod connection;
mod error;
pub mod mapping;
pub mod query;
mod reporter;
pub mod schema;
pub mod statements;
mod types;

pub use builder::ReporterBuilder;
pub use connection::{ConnectionGuard, ConnectionManager, LiveConnection, Target};
pub use error::{ConnectError, StorageError, StoreErrorKind};
pub use mapping::TypeMapper;
pub use query::{InsertStatement, QueryBuilder};
pub use reporter::{DropReason, ReportOutcome, ReporterStats, SqlReporter, StatsSnapshot};
pub use statements::StatementCache;
pub use types::{ColumnType, MetricSample, SampleValue, TagSet};
