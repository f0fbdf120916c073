//! Durable local FIFO queue over SQLite for buffering samples before upload.
//!
//! This is the no-loss backbone of the pipeline: samples are written to the
//! spool before any upload attempt and deleted only after the server
//! acknowledges them. The database runs in WAL journal mode so the queue
//! survives process restarts and abrupt power loss.
//!
//! The blocking `rusqlite` connection sits behind a mutex and every
//! operation runs on the blocking thread pool, so the daemon's two loops
//! serialize on the spool without stalling the runtime.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{params, params_from_iter, Connection};
use thiserror::Error;

const CREATE_TABLE_SQL: &str = "\
CREATE TABLE IF NOT EXISTS spool (
    rowid INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
)";

const INSERT_SQL: &str = "INSERT INTO spool (payload) VALUES (?1)";

const PEEK_SQL: &str = "SELECT rowid, payload FROM spool ORDER BY rowid ASC LIMIT ?1";

const COUNT_SQL: &str = "SELECT COUNT(*) FROM spool";

/// Errors from spool operations.
#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("spool database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("spool task failed: {0}")]
    Task(String),
}

/// Durable FIFO queue backed by a single SQLite file.
///
/// Payloads are opaque TEXT blobs; the caller owns serialization. Rows are
/// ordered by their auto-incremented `rowid`, stable across restarts.
#[derive(Clone)]
pub struct Spool {
    conn: Arc<Mutex<Connection>>,
}

impl Spool {
    /// Opens (creating if needed) the spool database at `path`, switches it
    /// to WAL journal mode, and ensures the schema exists.
    pub fn open(path: &Path) -> Result<Self, SpoolError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute(CREATE_TABLE_SQL, [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts one payload; the row is committed before this returns.
    pub async fn enqueue(&self, payload: String) -> Result<(), SpoolError> {
        self.blocking(move |conn| {
            conn.execute(INSERT_SQL, params![payload])?;
            Ok(())
        })
        .await
    }

    /// Returns up to `n` oldest rows as `(rowid, payload)` without removing
    /// them, ordered FIFO.
    pub async fn peek(&self, n: usize) -> Result<Vec<(i64, String)>, SpoolError> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(PEEK_SQL)?;
            let rows = stmt
                .query_map(params![n as i64], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Deletes the listed rows in a single transaction. Nonexistent rowids
    /// are silently ignored; an empty list is a no-op.
    pub async fn ack(&self, rowids: Vec<i64>) -> Result<(), SpoolError> {
        if rowids.is_empty() {
            return Ok(());
        }
        self.blocking(move |conn| {
            let placeholders = vec!["?"; rowids.len()].join(",");
            let sql = format!("DELETE FROM spool WHERE rowid IN ({placeholders})");
            let tx = conn.transaction()?;
            tx.execute(&sql, params_from_iter(rowids.iter()))?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Number of pending (unacknowledged) rows.
    pub async fn count(&self) -> Result<i64, SpoolError> {
        self.blocking(|conn| Ok(conn.query_row(COUNT_SQL, [], |row| row.get(0))?))
            .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, SpoolError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, SpoolError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| SpoolError::Task("spool mutex poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|err| SpoolError::Task(err.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_spool() -> (tempfile::TempDir, Spool) {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(&dir.path().join("spool.db")).unwrap();
        (dir, spool)
    }

    #[tokio::test]
    async fn enqueue_peek_preserves_fifo_order() {
        let (_dir, spool) = temp_spool();
        spool.enqueue("first".to_string()).await.unwrap();
        spool.enqueue("second".to_string()).await.unwrap();
        spool.enqueue("third".to_string()).await.unwrap();

        let rows = spool.peek(2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].1, "first");
        assert_eq!(rows[1].1, "second");

        // Peek is non-destructive.
        assert_eq!(spool.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn ack_deletes_exactly_the_listed_rows() {
        let (_dir, spool) = temp_spool();
        for i in 0..5 {
            spool.enqueue(format!("payload-{i}")).await.unwrap();
        }
        let rows = spool.peek(2).await.unwrap();
        let rowids: Vec<i64> = rows.iter().map(|(id, _)| *id).collect();

        spool.ack(rowids).await.unwrap();
        assert_eq!(spool.count().await.unwrap(), 3);

        let remaining = spool.peek(10).await.unwrap();
        assert_eq!(remaining[0].1, "payload-2");
    }

    #[tokio::test]
    async fn ack_ignores_unknown_rowids_and_empty_lists() {
        let (_dir, spool) = temp_spool();
        spool.enqueue("only".to_string()).await.unwrap();
        spool.ack(vec![]).await.unwrap();
        spool.ack(vec![9999]).await.unwrap();
        assert_eq!(spool.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn enqueue_peek_ack_returns_to_initial_state() {
        let (_dir, spool) = temp_spool();
        assert_eq!(spool.count().await.unwrap(), 0);

        spool.enqueue("transient".to_string()).await.unwrap();
        let rows = spool.peek(1).await.unwrap();
        spool.ack(rows.into_iter().map(|(id, _)| id).collect())
            .await
            .unwrap();

        assert_eq!(spool.count().await.unwrap(), 0);
        assert!(spool.peek(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fifo_order_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spool.db");
        {
            let spool = Spool::open(&path).unwrap();
            spool.enqueue("older".to_string()).await.unwrap();
            spool.enqueue("newer".to_string()).await.unwrap();
        }

        let spool = Spool::open(&path).unwrap();
        assert_eq!(spool.count().await.unwrap(), 2);
        let rows = spool.peek(10).await.unwrap();
        assert_eq!(rows[0].1, "older");
        assert_eq!(rows[1].1, "newer");
    }

    #[tokio::test]
    async fn peek_zero_returns_nothing() {
        let (_dir, spool) = temp_spool();
        spool.enqueue("row".to_string()).await.unwrap();
        assert!(spool.peek(0).await.unwrap().is_empty());
    }
}
