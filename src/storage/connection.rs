//! Single shared store connection with lazy (re)connect.
//!
//! The connection is created on first use under the manager's lock, so
//! concurrent callers never open more than one. A failed attempt is not
//! remembered: the next [`ConnectionManager::acquire`] tries again.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use duckdb::{CachedStatement, Connection};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::storage::StorageError;
use crate::storage::error::ConnectError;
use crate::storage::schema;
use crate::storage::statements::StatementCache;

/// Default time a caller waits for the shared connection.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Memory,
    File(PathBuf),
}

impl Target {
    /// Parse a connection URL.
    ///
    /// Accepts `:memory:`, `duckdb::memory:`, `duckdb:<path>`,
    /// `duckdb://<path>` and plain paths.
    pub fn parse(url: &str) -> Self {
        let url = url.trim();
        let rest = url
            .strip_prefix("duckdb://")
            .or_else(|| url.strip_prefix("duckdb:"))
            .unwrap_or(url);
        if rest.is_empty() || rest == ":memory:" {
            Self::Memory
        } else {
            Self::File(PathBuf::from(rest))
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory => f.write_str(":memory:"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// An open connection together with its statement cache.
pub struct LiveConnection {
    conn: Connection,
    statements: StatementCache,
}

impl LiveConnection {
    fn new(conn: Connection) -> Self {
        Self {
            conn,
            statements: StatementCache::new(),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Prepare through the statement cache.
    pub fn prepare(&mut self, sql: &str) -> duckdb::Result<CachedStatement<'_>> {
        self.statements.prepare(&self.conn, sql)
    }

    pub fn statements(&self) -> &StatementCache {
        &self.statements
    }

    fn close(mut self, target: &Target) {
        self.statements.clear(&self.conn);
        if let Err((_, e)) = self.conn.close() {
            tracing::warn!(db = %target, error = %e, "Failed to close connection");
        }
    }
}

/// Exclusive access to the live connection.
pub type ConnectionGuard<'a> = MappedMutexGuard<'a, LiveConnection>;

/// Owns the one connection shared by all reporters of a sink.
pub struct ConnectionManager {
    target: Target,
    lock_timeout: Duration,
    live: Mutex<Option<LiveConnection>>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.target)
            .field("lock_timeout", &self.lock_timeout)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn new(target: Target, lock_timeout: Duration) -> Self {
        Self {
            target,
            lock_timeout,
            live: Mutex::new(None),
        }
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Get the connection, connecting first if there is none.
    ///
    /// Returns [`StorageError::Unavailable`] if the lock is not obtained
    /// within the lock timeout or the connect attempt fails.
    pub fn acquire(&self) -> Result<ConnectionGuard<'_>, StorageError> {
        let Some(mut slot) = self.live.try_lock_for(self.lock_timeout) else {
            tracing::warn!(
                db = %self.target,
                timeout = ?self.lock_timeout,
                "Timed out waiting for the store connection"
            );
            return Err(StorageError::Unavailable(format!(
                "connection busy for more than {:?}",
                self.lock_timeout
            )));
        };

        if slot.is_none() {
            *slot = Some(self.connect()?);
        }

        MutexGuard::try_map(slot, Option::as_mut)
            .map_err(|_| StorageError::Internal("connection slot empty after connect".to_string()))
    }

    /// Whether a connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.live.lock().is_some()
    }

    /// Close the connection and drop its cached statements.
    ///
    /// The next [`acquire`](Self::acquire) reconnects.
    pub fn close(&self) {
        if let Some(live) = self.live.lock().take() {
            live.close(&self.target);
            tracing::info!(db = %self.target, "Connection closed");
        }
    }

    fn connect(&self) -> Result<LiveConnection, StorageError> {
        tracing::debug!(db = %self.target, "Connecting");

        match open(&self.target) {
            Ok(conn) => {
                tracing::info!(db = %self.target, "Connected");
                if tracing::enabled!(tracing::Level::DEBUG) {
                    match schema::existing_tables(&conn) {
                        Ok(tables) => tracing::debug!(?tables, "Existing tables"),
                        Err(e) => tracing::debug!(error = %e, "Failed to list existing tables"),
                    }
                }
                Ok(LiveConnection::new(conn))
            }
            Err(ConnectError::Transient(reason)) => {
                tracing::warn!(db = %self.target, %reason, "Failed to connect");
                Err(StorageError::Unavailable(reason))
            }
            Err(ConnectError::Fatal(e)) => {
                tracing::error!(db = %self.target, error = %e, "Failed to connect");
                Err(StorageError::Unavailable(e.to_string()))
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(live) = self.live.get_mut().take() {
            live.close(&self.target);
        }
    }
}

fn open(target: &Target) -> Result<Connection, ConnectError> {
    match target {
        Target::Memory => Ok(Connection::open_in_memory()?),
        Target::File(path) => {
            check_parent_dir(path)?;
            Connection::open(path).map_err(classify_open_failure)
        }
    }
}

/// Another process holding the database file is expected to go away; every
/// other refusal to open is fatal.
fn classify_open_failure(e: duckdb::Error) -> ConnectError {
    let message = e.to_string();
    if is_lock_conflict(&message) {
        ConnectError::Transient(message)
    } else {
        ConnectError::Fatal(e)
    }
}

fn is_lock_conflict(message: &str) -> bool {
    message.contains("Could not set lock on file")
}

/// A missing parent directory usually means a volume that is not mounted yet.
fn check_parent_dir(path: &Path) -> Result<(), ConnectError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.is_dir()
    {
        return Err(ConnectError::Transient(format!(
            "database directory '{}' is not available",
            parent.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn test_target_parse() {
        assert_eq!(Target::parse(":memory:"), Target::Memory);
        assert_eq!(Target::parse("duckdb::memory:"), Target::Memory);
        assert_eq!(
            Target::parse("duckdb:data/m.db"),
            Target::File(PathBuf::from("data/m.db"))
        );
        assert_eq!(
            Target::parse("duckdb:///var/lib/m.db"),
            Target::File(PathBuf::from("/var/lib/m.db"))
        );
        assert_eq!(
            Target::parse("m.db"),
            Target::File(PathBuf::from("m.db"))
        );
    }

    #[test]
    fn test_lazy_connect() {
        let manager = ConnectionManager::new(Target::Memory, DEFAULT_LOCK_TIMEOUT);
        assert!(!manager.is_connected());

        {
            let live = manager.acquire().unwrap();
            let one: i32 = live.conn().query_row("SELECT 1", [], |r| r.get(0)).unwrap();
            assert_eq!(one, 1);
        }
        assert!(manager.is_connected());
    }

    #[test]
    fn test_failure_is_not_cached() {
        let dir = tempdir().unwrap();
        let db_dir = dir.path().join("not-yet");
        let manager = ConnectionManager::new(
            Target::File(db_dir.join("metrics.db")),
            DEFAULT_LOCK_TIMEOUT,
        );

        assert!(matches!(
            manager.acquire(),
            Err(StorageError::Unavailable(_))
        ));
        assert!(!manager.is_connected());

        std::fs::create_dir(&db_dir).unwrap();
        assert!(manager.acquire().is_ok());
        assert!(manager.is_connected());
    }

    #[test]
    fn test_close_clears_statements_and_reconnects() {
        let manager = ConnectionManager::new(Target::Memory, DEFAULT_LOCK_TIMEOUT);
        {
            let mut live = manager.acquire().unwrap();
            live.prepare("SELECT 42").unwrap();
            assert_eq!(live.statements().len(), 1);
        }

        manager.close();
        assert!(!manager.is_connected());

        let live = manager.acquire().unwrap();
        assert!(live.statements().is_empty());
    }

    #[test]
    fn test_lock_timeout_reports_unavailable() {
        let manager = Arc::new(ConnectionManager::new(
            Target::Memory,
            Duration::from_millis(50),
        ));
        let held = manager.acquire().unwrap();

        let other = Arc::clone(&manager);
        let result = std::thread::spawn(move || other.acquire().is_err())
            .join()
            .unwrap();
        assert!(result);
        drop(held);
    }

    #[test]
    fn test_single_connection_across_threads() {
        let dir = tempdir().unwrap();
        let manager = Arc::new(ConnectionManager::new(
            Target::File(dir.path().join("shared.db")),
            DEFAULT_LOCK_TIMEOUT,
        ));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let manager = Arc::clone(&manager);
                std::thread::spawn(move || {
                    let live = manager.acquire().unwrap();
                    live.conn()
                        .execute_batch(&format!("CREATE TABLE t{i} (a INTEGER)"))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // All threads wrote through the same database instance
        let live = manager.acquire().unwrap();
        assert_eq!(schema::existing_tables(live.conn()).unwrap().len(), 8);
    }

    #[test]
    fn test_lock_conflict_is_transient() {
        let message = "IO Error: Could not set lock on file \"/data/metrics.duckdb\": \
                       Conflicting lock is held in /usr/bin/metric-sink (PID 4711)";
        assert!(is_lock_conflict(message));
        assert!(!is_lock_conflict(
            "IO Error: The file \"/data/metrics.duckdb\" exists, but it is not a valid DuckDB database file!"
        ));
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("metrics.duckdb");
        std::fs::write(&path, b"definitely not a duckdb database file, just some text padding").unwrap();

        assert!(matches!(
            open(&Target::File(path.clone())),
            Err(ConnectError::Fatal(_))
        ));

        let manager = ConnectionManager::new(Target::File(path), DEFAULT_LOCK_TIMEOUT);
        assert!(matches!(
            manager.acquire(),
            Err(StorageError::Unavailable(_))
        ));
    }
}
