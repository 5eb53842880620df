//! Live catalog inspection.
//!
//! Reads `information_schema` to decide why a statement failed and which tag
//! columns a table is missing. Lookups only see base tables of the current
//! database and schema, where unqualified DDL lands. Nothing here mutates the
//! store.

use std::collections::HashSet;

use duckdb::Connection;

use crate::storage::StorageError;
use crate::storage::error::StoreErrorKind;
use crate::storage::mapping::TypeMapper;
use crate::storage::types::{ColumnType, TagSet};

const TABLE_EXISTS_SQL: &str = "SELECT COUNT(*) FROM information_schema.tables \
     WHERE table_catalog = current_database() AND table_schema = current_schema() \
     AND table_type = 'BASE TABLE' AND lower(table_name) = lower(?)";

const TABLE_COLUMNS_SQL: &str = "SELECT c.column_name FROM information_schema.columns c \
     JOIN information_schema.tables t ON c.table_catalog = t.table_catalog \
     AND c.table_schema = t.table_schema AND c.table_name = t.table_name \
     WHERE t.table_catalog = current_database() AND t.table_schema = current_schema() \
     AND t.table_type = 'BASE TABLE' AND lower(t.table_name) = lower(?) \
     ORDER BY c.ordinal_position";

const INDEX_EXISTS_SQL: &str = "SELECT COUNT(*) FROM duckdb_indexes() \
     WHERE database_name = current_database() AND schema_name = current_schema() \
     AND lower(index_name) = lower(?)";

const EXISTING_TABLES_SQL: &str = "SELECT table_schema, table_name FROM information_schema.tables \
     WHERE table_type = 'BASE TABLE' ORDER BY table_schema, table_name";

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool, StorageError> {
    let count: i64 = conn.query_row(TABLE_EXISTS_SQL, [table], |row| row.get(0))?;
    Ok(count > 0)
}

pub fn index_exists(conn: &Connection, index: &str) -> Result<bool, StorageError> {
    let count: i64 = conn.query_row(INDEX_EXISTS_SQL, [index], |row| row.get(0))?;
    Ok(count > 0)
}

/// Column names of `table` in ordinal order, as stored.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(TABLE_COLUMNS_SQL)?;
    let columns = stmt
        .query_map([table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

pub fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, StorageError> {
    Ok(table_columns(conn, table)?
        .iter()
        .any(|c| c.eq_ignore_ascii_case(column)))
}

/// `schema.table` for every base table, for connect-time diagnostics.
pub fn existing_tables(conn: &Connection) -> Result<Vec<String>, StorageError> {
    let mut stmt = conn.prepare(EXISTING_TABLES_SQL)?;
    let tables = stmt
        .query_map([], |row| {
            let schema: String = row.get(0)?;
            let table: String = row.get(1)?;
            Ok(format!("{schema}.{table}"))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tables)
}

/// Tags of `tags` that have no column in `table`, in tag order, typed from
/// the tag values.
///
/// Tags whose value has no column type are skipped; such a sample is
/// rejected before it reaches the store.
pub fn missing_columns(
    conn: &Connection,
    table: &str,
    tags: &TagSet,
    mapper: &TypeMapper,
) -> Result<Vec<(String, ColumnType)>, StorageError> {
    let existing: HashSet<String> = table_columns(conn, table)?
        .into_iter()
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let missing: Vec<_> = tags
        .iter()
        .filter(|(name, _)| !existing.contains(&name.to_ascii_uppercase()))
        .filter_map(|(name, value)| {
            mapper
                .column_type(value)
                .map(|column_type| (name.to_string(), column_type))
        })
        .collect();

    tracing::debug!(table, ?missing, "Computed missing columns");
    Ok(missing)
}

/// Classify a failed insert against the live catalog.
pub fn diagnose(
    conn: &Connection,
    table: &str,
    tags: &TagSet,
    mapper: &TypeMapper,
) -> Result<StoreErrorKind, StorageError> {
    if !table_exists(conn, table)? {
        return Ok(StoreErrorKind::TableNotFound);
    }

    let missing = missing_columns(conn, table, tags, mapper)?;
    if missing.is_empty() {
        Ok(StoreErrorKind::Other)
    } else {
        Ok(StoreErrorKind::ColumnNotFound(missing))
    }
}
