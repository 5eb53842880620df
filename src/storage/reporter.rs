//! Report pipeline.
//!
//! Each sample walks `resolve table → acquire connection → insert`. When the
//! insert fails because the table or some tag columns are missing, the schema
//! is fixed and the triggering sample is dropped; the next sample with the
//! same shape goes through. Nothing in here returns an error to the producer.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use duckdb::Connection;
use strum_macros::Display;

use crate::filter::TableFilter;
use crate::storage::connection::ConnectionManager;
use crate::storage::error::StoreErrorKind;
use crate::storage::query::{QueryBuilder, index_name};
use crate::storage::schema;
use crate::storage::types::{ColumnType, MetricSample, SampleValue, TagSet};
use crate::storage::StorageError;

// =============================================================================
// Outcomes
// =============================================================================

/// What happened to a reported sample.
///
/// Informational only; producers are free to ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// One row was written.
    Inserted,
    /// The table was missing and has been created; the sample was not written.
    TableCreated,
    /// This many tag columns were added; the sample was not written.
    ColumnsAdded(usize),
    /// The sample was not written.
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    /// The metric key maps to no table.
    Filtered,
    /// No connection to the store.
    Unavailable,
    /// A value or tag cannot be stored.
    Rejected,
    /// Another writer fixed the same schema gap first.
    SchemaRace,
    /// Any other store failure.
    StoreError,
}

// =============================================================================
// Statistics
// =============================================================================

/// Lock-free counters, updated once per report.
#[derive(Debug, Default)]
pub struct ReporterStats {
    inserted: AtomicU64,
    filtered: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
    failed: AtomicU64,
    tables_created: AtomicU64,
    columns_added: AtomicU64,
}

/// Point-in-time copy of [`ReporterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub inserted: u64,
    pub filtered: u64,
    pub rejected: u64,
    pub unavailable: u64,
    pub failed: u64,
    pub tables_created: u64,
    pub columns_added: u64,
}

impl ReporterStats {
    fn record(&self, outcome: ReportOutcome) {
        let counter = match outcome {
            ReportOutcome::Inserted => &self.inserted,
            ReportOutcome::TableCreated => &self.tables_created,
            ReportOutcome::ColumnsAdded(n) => {
                self.columns_added.fetch_add(n as u64, Ordering::Relaxed);
                return;
            }
            ReportOutcome::Dropped(DropReason::Filtered) => &self.filtered,
            ReportOutcome::Dropped(DropReason::Rejected) => &self.rejected,
            ReportOutcome::Dropped(DropReason::Unavailable) => &self.unavailable,
            ReportOutcome::Dropped(DropReason::SchemaRace | DropReason::StoreError) => {
                &self.failed
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inserted: self.inserted.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            tables_created: self.tables_created.load(Ordering::Relaxed),
            columns_added: self.columns_added.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Reporter
// =============================================================================

/// Writes metric samples into per-metric tables, creating tables and columns
/// as new shapes appear.
///
/// Safe to share between producer threads; all store access goes through the
/// single connection owned by the [`ConnectionManager`].
pub struct SqlReporter<F> {
    filter: F,
    builder: QueryBuilder,
    connections: ConnectionManager,
    stats: ReporterStats,
}

impl<F> std::fmt::Debug for SqlReporter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlReporter")
            .field("connections", &self.connections)
            .finish_non_exhaustive()
    }
}

impl<F: TableFilter> SqlReporter<F> {
    pub fn new(filter: F, builder: QueryBuilder, connections: ConnectionManager) -> Self {
        Self {
            filter,
            builder,
            connections,
            stats: ReporterStats::default(),
        }
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Close the store connection. A later report reconnects.
    pub fn close(&self) {
        self.connections.close();
    }

    pub fn report_sample(&self, sample: &MetricSample) -> ReportOutcome {
        self.report(sample.timestamp, &sample.tags, &sample.key, &sample.value)
    }

    /// Persist one sample, best effort.
    pub fn report(
        &self,
        timestamp: DateTime<Utc>,
        tags: &TagSet,
        key: &str,
        value: &SampleValue,
    ) -> ReportOutcome {
        let outcome = self.write(timestamp, tags, key, value);
        if let ReportOutcome::Dropped(reason) = outcome {
            tracing::trace!(%timestamp, key, %reason, "Sample dropped");
        }
        self.stats.record(outcome);
        outcome
    }

    fn write(
        &self,
        timestamp: DateTime<Utc>,
        tags: &TagSet,
        key: &str,
        value: &SampleValue,
    ) -> ReportOutcome {
        let Some(table) = self.filter.table_name(key) else {
            tracing::debug!(%timestamp, key, "Report skipped - key was filtered out");
            return ReportOutcome::Dropped(DropReason::Filtered);
        };

        let mut live = match self.connections.acquire() {
            Ok(live) => live,
            Err(e) => {
                tracing::warn!(%timestamp, key, error = %e, "Report skipped - connection is not available");
                return ReportOutcome::Dropped(DropReason::Unavailable);
            }
        };

        let insert = match self.builder.insert(&table, tags, value, timestamp) {
            Ok(insert) => insert,
            Err(e) => {
                tracing::warn!(%timestamp, key, %table, error = %e, "Report skipped - sample cannot be stored");
                return ReportOutcome::Dropped(DropReason::Rejected);
            }
        };

        let result = live.prepare(&insert.sql).and_then(|mut statement| {
            statement.execute(duckdb::params_from_iter(insert.params.iter()))
        });
        let err = match result {
            Ok(_) => {
                tracing::trace!(sql = %insert.sql, "Row inserted");
                return ReportOutcome::Inserted;
            }
            Err(e) => e,
        };
        tracing::debug!(%table, error = %err, "Insert failed");

        let conn = live.conn();
        match schema::diagnose(conn, &table, tags, self.builder.mapper()) {
            Ok(StoreErrorKind::TableNotFound) => self.create_table(conn, &table, tags, value),
            Ok(StoreErrorKind::ColumnNotFound(missing)) => {
                self.add_missing_columns(conn, &table, &missing)
            }
            Ok(StoreErrorKind::DuplicateObject | StoreErrorKind::Other) => {
                tracing::error!(sql = %insert.sql, error = %err, "Failed to insert row");
                ReportOutcome::Dropped(DropReason::StoreError)
            }
            Err(e) => {
                tracing::error!(
                    sql = %insert.sql,
                    error = %err,
                    catalog_error = %e,
                    "Failed to insert row and to inspect the catalog"
                );
                ReportOutcome::Dropped(DropReason::StoreError)
            }
        }
    }

    fn create_table(
        &self,
        conn: &Connection,
        table: &str,
        tags: &TagSet,
        value: &SampleValue,
    ) -> ReportOutcome {
        let sql = match self.builder.create_table(table, tags, value) {
            Ok(sql) => sql,
            Err(e) => {
                tracing::warn!(table, error = %e, "Failed to create table");
                return ReportOutcome::Dropped(DropReason::Rejected);
            }
        };

        if let Err(e) = conn.execute_batch(&sql) {
            return match classify_ddl(schema::table_exists(conn, table)) {
                StoreErrorKind::DuplicateObject => {
                    tracing::debug!(table, "Table was created concurrently");
                    ReportOutcome::Dropped(DropReason::SchemaRace)
                }
                _ => {
                    tracing::warn!(table, %sql, error = %e, "Failed to create table");
                    ReportOutcome::Dropped(DropReason::StoreError)
                }
            };
        }
        tracing::info!(table, "Table successfully created");

        if let Err(e) = self.create_index(conn, table) {
            tracing::warn!(table, error = %e, "Failed to create index");
        }
        ReportOutcome::TableCreated
    }

    fn create_index(&self, conn: &Connection, table: &str) -> Result<(), StorageError> {
        let sql = self.builder.create_index(table)?;
        tracing::debug!(table, %sql, "Creating index");
        if let Err(e) = conn.execute_batch(&sql) {
            if schema::index_exists(conn, &index_name(table))? {
                tracing::debug!(table, "Index was created concurrently");
                return Ok(());
            }
            return Err(e.into());
        }
        tracing::debug!(table, "Index successfully created");
        Ok(())
    }

    fn add_missing_columns(
        &self,
        conn: &Connection,
        table: &str,
        missing: &[(String, ColumnType)],
    ) -> ReportOutcome {
        let mut added = 0;
        let mut raced = 0;

        for (column, column_type) in missing {
            match self.add_column(conn, table, column, column_type) {
                Ok(()) => {
                    tracing::debug!(table, %column, %column_type, "Added new column");
                    added += 1;
                }
                Err(StoreErrorKind::DuplicateObject) => {
                    tracing::debug!(table, %column, "Column was added concurrently");
                    raced += 1;
                }
                Err(_) => {}
            }
        }

        match (added, raced) {
            (0, 0) => ReportOutcome::Dropped(DropReason::StoreError),
            (0, _) => ReportOutcome::Dropped(DropReason::SchemaRace),
            (n, _) => ReportOutcome::ColumnsAdded(n),
        }
    }

    /// Add one column, classifying failures. Non-duplicate errors are logged here.
    fn add_column(
        &self,
        conn: &Connection,
        table: &str,
        column: &str,
        column_type: &ColumnType,
    ) -> Result<(), StoreErrorKind> {
        let sql = match self.builder.add_column(table, column, column_type) {
            Ok(sql) => sql,
            Err(e) => {
                tracing::error!(table, column, error = %e, "Failed to build add column query");
                return Err(StoreErrorKind::Other);
            }
        };
        tracing::debug!(%sql, "Add column query");

        let Err(e) = conn.execute_batch(&sql) else {
            return Ok(());
        };
        match classify_ddl(schema::column_exists(conn, table, column)) {
            StoreErrorKind::DuplicateObject => Err(StoreErrorKind::DuplicateObject),
            kind => {
                tracing::error!(%sql, error = %e, "Failed to execute add column query");
                Err(kind)
            }
        }
    }
}

/// A failed DDL statement whose object exists afterwards lost a race.
fn classify_ddl(exists_now: Result<bool, StorageError>) -> StoreErrorKind {
    match exists_now {
        Ok(true) => StoreErrorKind::DuplicateObject,
        _ => StoreErrorKind::Other,
    }
}
