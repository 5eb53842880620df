//! SQL generation for metric tables.
//!
//! A metric table always has a `TIME` column, one column per tag and a
//! `VALUE` column. Identifiers are double-quoted; values are bound as
//! positional parameters and never interpolated.

use chrono::{DateTime, Utc};
use duckdb::types::Value;

use crate::storage::StorageError;
use crate::storage::mapping::{TypeMapper, bind_timestamp, bind_value};
use crate::storage::types::{ColumnType, SampleValue, TagSet};

/// Reserved timestamp column.
pub const TIME_COLUMN: &str = "TIME";

/// Reserved value column.
pub const VALUE_COLUMN: &str = "VALUE";

/// A generated INSERT with its bound parameters, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Builds INSERT / CREATE TABLE / CREATE INDEX / ALTER TABLE statements.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    mapper: TypeMapper,
}

impl QueryBuilder {
    pub fn new(mapper: TypeMapper) -> Self {
        Self { mapper }
    }

    pub fn mapper(&self) -> &TypeMapper {
        &self.mapper
    }

    /// `INSERT INTO "t" ("TIME", <tags...>, "VALUE") VALUES (?, ..., ?)`.
    pub fn insert(
        &self,
        table: &str,
        tags: &TagSet,
        value: &SampleValue,
        timestamp: DateTime<Utc>,
    ) -> Result<InsertStatement, StorageError> {
        let mut columns = Vec::with_capacity(tags.len() + 2);
        let mut params = Vec::with_capacity(tags.len() + 2);

        columns.push(quote_ident(TIME_COLUMN)?);
        params.push(bind_timestamp(timestamp));

        for (name, tag_value) in tags.iter() {
            check_tag_name(name)?;
            columns.push(quote_ident(name)?);
            params.push(bind_value(name, tag_value)?);
        }

        columns.push(quote_ident(VALUE_COLUMN)?);
        params.push(bind_value(VALUE_COLUMN, value)?);

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table)?,
            columns.join(", "),
            placeholders
        );
        tracing::trace!(%sql, "Generated insert query");

        Ok(InsertStatement { sql, params })
    }

    /// `CREATE TABLE` typed from the sample that revealed the table was missing.
    pub fn create_table(
        &self,
        table: &str,
        tags: &TagSet,
        value: &SampleValue,
    ) -> Result<String, StorageError> {
        let mut columns = Vec::with_capacity(tags.len() + 2);
        columns.push(format!(
            "{} {}",
            quote_ident(TIME_COLUMN)?,
            ColumnType::Timestamp
        ));

        for (name, tag_value) in tags.iter() {
            check_tag_name(name)?;
            let column_type = self.mapper.require_column_type(name, tag_value)?;
            columns.push(format!("{} {}", quote_ident(name)?, column_type));
        }

        let value_type = self.mapper.require_column_type(VALUE_COLUMN, value)?;
        columns.push(format!("{} {}", quote_ident(VALUE_COLUMN)?, value_type));

        let sql = format!("CREATE TABLE {} ({})", quote_ident(table)?, columns.join(", "));
        tracing::debug!(%sql, "Generated create table query");
        Ok(sql)
    }

    /// Ascending index on `TIME`, named after the table.
    pub fn create_index(&self, table: &str) -> Result<String, StorageError> {
        Ok(format!(
            "CREATE INDEX {} ON {} ({})",
            quote_ident(&index_name(table))?,
            quote_ident(table)?,
            quote_ident(TIME_COLUMN)?
        ))
    }

    pub fn add_column(
        &self,
        table: &str,
        column: &str,
        column_type: &ColumnType,
    ) -> Result<String, StorageError> {
        check_tag_name(column)?;
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table)?,
            quote_ident(column)?,
            column_type
        ))
    }
}

/// Deterministic name of the `TIME` index for a table.
pub fn index_name(table: &str) -> String {
    format!("idx_{table}_time")
}

/// Double-quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> Result<String, StorageError> {
    if name.trim().is_empty() || name.contains('\0') {
        return Err(StorageError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Whether a column name is one of the reserved metric columns.
pub fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case(TIME_COLUMN) || name.eq_ignore_ascii_case(VALUE_COLUMN)
}

fn check_tag_name(name: &str) -> Result<(), StorageError> {
    if is_reserved(name) {
        return Err(StorageError::ReservedColumn(name.to_string()));
    }
    Ok(())
}
