//! metric-sink - Self-healing relational sink for metric samples
//!
//! Persists `(timestamp, key, tags, value)` samples into DuckDB tables whose
//! names and columns are derived from the metric key and tag set. Unknown
//! tables and columns are created on the fly; failures are logged and the
//! sample is dropped, never propagated to the producer.
//!
//! # Architecture
//!
//! - **Filter**: Metric key to table name resolution ([`filter`])
//! - **Storage**: Type mapping, SQL generation, connection and schema handling ([`storage`])
//! - **Config**: YAML configuration for the binary and [`ReporterBuilder`] ([`config`])
//!
//! # Example
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use metric_sink::{AllowList, ReporterBuilder, TagSet};
//!
//! let reporter = ReporterBuilder::new("data/metrics.duckdb", AllowList::record_all())
//!     .build()?;
//! let tags = TagSet::new().with("host", "node-1").with("pid", 4711_i64);
//! reporter.report(Utc::now(), &tags, "process_cpu_used-percent", &12.5_f64.into());
//! # Ok::<(), metric_sink::StorageError>(())
//! ```

pub mod config;
pub mod filter;
pub mod storage;

pub use filter::{AllowList, TableFilter};
pub use storage::{
    MetricSample, ReportOutcome, ReporterBuilder, SampleValue, SqlReporter, StorageError, TagSet,
};
