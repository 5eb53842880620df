//! Per-connection prepared statement cache.
//!
//! Statements are memoized by their exact SQL text, so every tag-set shape
//! gets its own entry. The compiled handles live in duckdb's connection-level
//! cache; this type tracks the shapes seen so far and grows that cache so it
//! never evicts one.

use std::collections::HashSet;

use duckdb::{CachedStatement, Connection};

/// Capacity duckdb starts its statement cache with.
const MIN_CAPACITY: usize = 16;

#[derive(Debug, Default)]
pub struct StatementCache {
    shapes: HashSet<String>,
}

impl StatementCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare `sql` on `conn`, reusing the compiled statement if this shape
    /// was prepared before on the same connection.
    pub fn prepare<'c>(
        &mut self,
        conn: &'c Connection,
        sql: &str,
    ) -> duckdb::Result<CachedStatement<'c>> {
        if self.shapes.contains(sql) {
            return conn.prepare_cached(sql);
        }

        conn.set_prepared_statement_cache_capacity((self.shapes.len() + 1).max(MIN_CAPACITY));
        let statement = conn.prepare_cached(sql)?;
        self.shapes.insert(sql.to_string());
        tracing::debug!(shapes = self.shapes.len(), %sql, "Prepared new statement shape");
        Ok(statement)
    }

    pub fn contains(&self, sql: &str) -> bool {
        self.shapes.contains(sql)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Drop every cached statement of `conn`.
    pub fn clear(&mut self, conn: &Connection) {
        conn.flush_prepared_statement_cache();
        self.shapes.clear();
    }
}
