//! Metric key to table name resolution.
//!
//! A [`TableFilter`] decides which metric keys are written and to which
//! table. `None` means the sample is skipped without touching the store.

use std::collections::HashMap;

/// Resolves a metric key to a table name.
pub trait TableFilter: Send + Sync {
    fn table_name(&self, metric_key: &str) -> Option<String>;
}

impl<F> TableFilter for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn table_name(&self, metric_key: &str) -> Option<String> {
        self(metric_key)
    }
}

/// Explicit metric key → table name mapping.
///
/// With `record_all` set, keys that are not listed are still written, to a
/// table named by [`to_table_name`].
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    tables: HashMap<String, String>,
    record_all: bool,
}

impl AllowList {
    pub fn new<I, K, V>(tables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            tables: tables
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            record_all: false,
        }
    }

    /// Write every key, deriving table names for unlisted ones.
    pub fn record_all() -> Self {
        Self {
            tables: HashMap::new(),
            record_all: true,
        }
    }

    pub fn with_record_all(mut self, record_all: bool) -> Self {
        self.record_all = record_all;
        self
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl TableFilter for AllowList {
    fn table_name(&self, metric_key: &str) -> Option<String> {
        if let Some(table) = self.tables.get(metric_key) {
            return Some(table.clone());
        }
        if self.record_all {
            to_table_name(metric_key)
        } else {
            None
        }
    }
}

/// Derive a table name from a metric key.
///
/// Lowercases, replaces every character outside `[a-z0-9_]` with `_` and
/// prefixes `_` when the result would start with a digit. Keys without any
/// alphanumeric character yield `None`.
pub fn to_table_name(metric_key: &str) -> Option<String> {
    if !metric_key.chars().any(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    let mut name: String = metric_key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    Some(name)
}
