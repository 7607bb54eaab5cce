//! SQLite session store

use super::{spawn_sweeper, SessionStore, StoreError, StoreResult, Sweeper};
use crate::state_machine::Session;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    conversation_id TEXT PRIMARY KEY,
    state INTEGER NOT NULL DEFAULT 0,
    slots TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at);
";

/// Fixed-width UTC timestamps so that text comparison orders them
pub(super) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Thread-safe connection plus expiry settings, shared with the sweeper
#[derive(Clone)]
struct Db {
    conn: Arc<Mutex<Connection>>,
    ttl: Option<Duration>,
}

impl Db {
    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("session database lock poisoned".to_string()))
    }

    /// Rows last written before this instant are expired
    fn cutoff(&self) -> Option<String> {
        let ttl = chrono::Duration::from_std(self.ttl?).ok()?;
        Utc::now().checked_sub_signed(ttl).map(timestamp)
    }

    fn load(conn: &Connection, id: &str, cutoff: Option<&str>) -> StoreResult<Option<Session>> {
        let row: Option<(i32, String)> = conn
            .query_row(
                "SELECT state, slots FROM sessions
                 WHERE conversation_id = ?1 AND (?2 IS NULL OR updated_at >= ?2)",
                params![id, cutoff],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(state, slots_json)| {
            let slots: HashMap<String, String> =
                serde_json::from_str(&slots_json).map_err(|e| StoreError::Corrupt {
                    id: id.to_string(),
                    reason: format!("invalid slots: {e}"),
                })?;
            Ok(Session { state, slots })
        })
        .transpose()
    }

    fn purge(&self) -> StoreResult<usize> {
        let Some(cutoff) = self.cutoff() else {
            return Ok(0);
        };
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM sessions WHERE updated_at < ?1", params![cutoff])?)
    }

    fn exists_sync(&self, id: &str) -> StoreResult<bool> {
        let cutoff = self.cutoff();
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM sessions
                 WHERE conversation_id = ?1 AND (?2 IS NULL OR updated_at >= ?2)",
                params![id, cutoff],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn get_sync(&self, id: &str) -> StoreResult<Session> {
        let cutoff = self.cutoff();
        let conn = self.conn()?;
        Self::load(&conn, id, cutoff.as_deref())?.ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn set_sync(&self, id: &str, session: &Session) -> StoreResult<()> {
        let cutoff = self.cutoff();
        let now = timestamp(Utc::now());
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        match Self::load(&tx, id, cutoff.as_deref())? {
            Some(mut stored) => {
                stored.merge_from(session);
                tx.execute(
                    "UPDATE sessions SET state = ?1, slots = ?2, updated_at = ?3
                     WHERE conversation_id = ?4",
                    params![stored.state, serde_json::to_string(&stored.slots)?, now, id],
                )?;
            }
            None => {
                // An expired row may still be waiting for the sweeper
                tx.execute("DELETE FROM sessions WHERE conversation_id = ?1", params![id])?;
                tx.execute(
                    "INSERT INTO sessions (conversation_id, state, slots, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    params![id, session.state, serde_json::to_string(&session.slots)?, now],
                )?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn delete_sync(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM sessions WHERE conversation_id = ?1", params![id])?;
        Ok(())
    }

    /// Run `f` on the blocking pool so SQLite I/O never stalls the runtime
    async fn blocking<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Db) -> StoreResult<T> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| StoreError::Unavailable(format!("session database task failed: {e}")))?
    }
}

/// Sessions persisted in a SQLite database
pub struct SqlStore {
    db: Db,
    _sweeper: Option<Sweeper>,
}

impl SqlStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P, ttl: Option<Duration>) -> StoreResult<Self> {
        Self::init(Connection::open(path)?, ttl)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(ttl: Option<Duration>) -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?, ttl)
    }

    fn init(conn: Connection, ttl: Option<Duration>) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Db {
                conn: Arc::new(Mutex::new(conn)),
                ttl,
            },
            _sweeper: None,
        })
    }

    /// Delete expired rows every `interval` in the background
    pub fn with_sweeper(self, interval: Duration) -> Self {
        let db = self.db.clone();
        let sweeper = spawn_sweeper("sql", interval, move || {
            let db = db.clone();
            async move { db.blocking(|db| db.purge()).await }
        });
        Self {
            _sweeper: Some(sweeper),
            ..self
        }
    }

    /// Delete expired rows now; returns how many were removed
    pub fn purge_expired(&self) -> StoreResult<usize> {
        self.db.purge()
    }

    /// Rows in the table, including expired ones not yet purged
    pub fn row_count(&self) -> StoreResult<usize> {
        let conn = self.db.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl SessionStore for SqlStore {
    async fn exists(&self, id: &str) -> StoreResult<bool> {
        let id = id.to_string();
        self.db.blocking(move |db| db.exists_sync(&id)).await
    }

    async fn get(&self, id: &str) -> StoreResult<Session> {
        let id = id.to_string();
        self.db.blocking(move |db| db.get_sync(&id)).await
    }

    async fn set(&self, id: &str, session: &Session) -> StoreResult<()> {
        let id = id.to_string();
        let session = session.clone();
        self.db.blocking(move |db| db.set_sync(&id, &session)).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db.blocking(move |db| db.delete_sync(&id)).await
    }

    fn backend(&self) -> &'static str {
        "sql"
    }
}
