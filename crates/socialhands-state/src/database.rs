//! Shared SQLite database handle.

use std::path::Path;
use std::time::Duration;

use tokio_rusqlite::Connection;
use tracing::debug;

use crate::error::StateError;

/// Concurrent workers wait this long for the write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the SQLite database holding jobs and control state.
///
/// Cloning is cheap; all clones share one background connection thread.
#[derive(Clone)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a file-backed database in WAL mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StateError::Connection(e.to_string()))?;
            }
        }

        let conn = Connection::open(&path)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        conn.call(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            Ok(mode)
        })
        .await
        .map(|mode| debug!("Opened database {:?} (journal_mode={})", path, mode))
        .map_err(|e| StateError::Connection(e.to_string()))?;

        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    /// The underlying async connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Connectivity probe.
    pub async fn ping(&self) -> Result<(), StateError> {
        self.conn
            .call(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
                Ok(())
            })
            .await
            .map_err(StateError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let db = Database::open(&path).await.unwrap();
        db.ping().await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_in_memory_ping() {
        let db = Database::in_memory().await.unwrap();
        assert!(db.ping().await.is_ok());
    }
}
