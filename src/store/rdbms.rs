//! Session store on a database server (PostgreSQL or MySQL)
//!
//! Uses sqlx's `Any` driver so one implementation serves every dialect.
//! Timestamps are stored as fixed-width text, the same as the SQLite store,
//! so expiry compares strings.

use super::sql::timestamp;
use super::{spawn_sweeper, SessionStore, StoreError, StoreResult, Sweeper};
use crate::state_machine::Session;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::collections::HashMap;
use std::time::Duration;

const MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

const SELECT_SESSION: &str =
    "SELECT state, slots FROM sessions WHERE conversation_id = ? AND updated_at >= ?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    MySql,
    Sqlite,
}

impl Dialect {
    /// Dialect for a connection URL, from its scheme
    pub fn from_url(url: &str) -> Option<Self> {
        let (scheme, _) = url.split_once(':')?;
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "mysql" | "mariadb" => Some(Self::MySql),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::MySql => "mysql",
            Self::Sqlite => "sqlite",
        }
    }

    fn schema(self) -> &'static [&'static str] {
        match self {
            // No CREATE INDEX IF NOT EXISTS in MySQL
            Self::MySql => &["CREATE TABLE IF NOT EXISTS sessions (
                conversation_id VARCHAR(255) PRIMARY KEY,
                state BIGINT NOT NULL DEFAULT 0,
                slots TEXT NOT NULL,
                created_at VARCHAR(32) NOT NULL,
                updated_at VARCHAR(32) NOT NULL,
                INDEX idx_sessions_updated (updated_at)
            )"],
            Self::Postgres | Self::Sqlite => &[
                "CREATE TABLE IF NOT EXISTS sessions (
                    conversation_id VARCHAR(255) PRIMARY KEY,
                    state BIGINT NOT NULL DEFAULT 0,
                    slots TEXT NOT NULL,
                    created_at VARCHAR(32) NOT NULL,
                    updated_at VARCHAR(32) NOT NULL
                )",
                "CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions (updated_at)",
            ],
        }
    }

    /// Statements are written with `?` placeholders; PostgreSQL numbers them
    fn sql(self, statement: &str) -> String {
        if self != Self::Postgres {
            return statement.to_string();
        }
        let mut out = String::with_capacity(statement.len() + 8);
        let mut n = 0;
        for c in statement.chars() {
            if c == '?' {
                n += 1;
                out.push('$');
                out.push_str(&n.to_string());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Row lock for read-modify-write inside a transaction
    fn lock_clause(self) -> &'static str {
        match self {
            Self::Postgres | Self::MySql => " FOR UPDATE",
            Self::Sqlite => "",
        }
    }
}

/// Pool plus expiry settings, shared with the sweeper
#[derive(Clone)]
struct Db {
    pool: AnyPool,
    dialect: Dialect,
    ttl: Option<Duration>,
}

impl Db {
    /// Rows last written before this are expired; empty when nothing expires
    fn cutoff(&self) -> String {
        self.ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
            .map(timestamp)
            .unwrap_or_default()
    }

    fn decode(id: &str, row: &AnyRow) -> StoreResult<Session> {
        let state: i64 = row.try_get("state")?;
        let slots: String = row.try_get("slots")?;
        let state = i32::try_from(state).map_err(|_| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("state {state} out of range"),
        })?;
        let slots: HashMap<String, String> =
            serde_json::from_str(&slots).map_err(|e| StoreError::Corrupt {
                id: id.to_string(),
                reason: format!("invalid slots: {e}"),
            })?;
        Ok(Session { state, slots })
    }

    async fn purge(&self) -> StoreResult<usize> {
        if self.ttl.is_none() {
            return Ok(0);
        }
        let statement = self.dialect.sql("DELETE FROM sessions WHERE updated_at < ?");
        let result = sqlx::query(&statement)
            .bind(self.cutoff())
            .execute(&self.pool)
            .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}

/// Sessions persisted on a PostgreSQL or MySQL server
pub struct RdbmsStore {
    db: Db,
    _sweeper: Option<Sweeper>,
}

impl RdbmsStore {
    /// Connect to `url` and create the sessions table if needed
    pub async fn connect(url: &str, ttl: Option<Duration>) -> StoreResult<Self> {
        let dialect = Dialect::from_url(url)
            .ok_or_else(|| StoreError::Unavailable("unsupported database url scheme".to_string()))?;
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(url)
            .await?;
        for statement in dialect.schema() {
            sqlx::query(statement).execute(&pool).await?;
        }
        tracing::info!(dialect = dialect.name(), "Connected to session database");

        Ok(Self {
            db: Db { pool, dialect, ttl },
            _sweeper: None,
        })
    }

    pub fn dialect(&self) -> Dialect {
        self.db.dialect
    }

    /// Delete expired rows every `interval` in the background
    pub fn with_sweeper(self, interval: Duration) -> Self {
        let db = self.db.clone();
        let sweeper = spawn_sweeper("rdbms", interval, move || {
            let db = db.clone();
            async move { db.purge().await }
        });
        Self {
            _sweeper: Some(sweeper),
            ..self
        }
    }

    /// Delete expired rows now; returns how many were removed
    pub async fn purge_expired(&self) -> StoreResult<usize> {
        self.db.purge().await
    }

    /// Rows in the table, including expired ones not yet purged
    pub async fn row_count(&self) -> StoreResult<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM sessions")
            .fetch_one(&self.db.pool)
            .await?;
        let count: i64 = row.try_get("n")?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[async_trait]
impl SessionStore for RdbmsStore {
    async fn exists(&self, id: &str) -> StoreResult<bool> {
        let statement = self.db.dialect.sql(SELECT_SESSION);
        let row = sqlx::query(&statement)
            .bind(id)
            .bind(self.db.cutoff())
            .fetch_optional(&self.db.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get(&self, id: &str) -> StoreResult<Session> {
        let statement = self.db.dialect.sql(SELECT_SESSION);
        let row = sqlx::query(&statement)
            .bind(id)
            .bind(self.db.cutoff())
            .fetch_optional(&self.db.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Db::decode(id, &row)
    }

    async fn set(&self, id: &str, session: &Session) -> StoreResult<()> {
        let dialect = self.db.dialect;
        let now = timestamp(Utc::now());
        let mut tx = self.db.pool.begin().await?;

        let select = dialect.sql(&format!("{SELECT_SESSION}{}", dialect.lock_clause()));
        let stored = sqlx::query(&select)
            .bind(id)
            .bind(self.db.cutoff())
            .fetch_optional(&mut *tx)
            .await?;

        match stored {
            Some(row) => {
                let mut stored = Db::decode(id, &row)?;
                stored.merge_from(session);
                let update = dialect.sql(
                    "UPDATE sessions SET state = ?, slots = ?, updated_at = ? WHERE conversation_id = ?",
                );
                sqlx::query(&update)
                    .bind(i64::from(stored.state))
                    .bind(serde_json::to_string(&stored.slots)?)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            }
            None => {
                // An expired row may still be waiting for the sweeper
                let delete = dialect.sql("DELETE FROM sessions WHERE conversation_id = ?");
                sqlx::query(&delete).bind(id).execute(&mut *tx).await?;
                let insert = dialect.sql(
                    "INSERT INTO sessions (conversation_id, state, slots, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?)",
                );
                sqlx::query(&insert)
                    .bind(id)
                    .bind(i64::from(session.state))
                    .bind(serde_json::to_string(&session.slots)?)
                    .bind(now.clone())
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let statement = self.db.dialect.sql("DELETE FROM sessions WHERE conversation_id = ?");
        sqlx::query(&statement).bind(id).execute(&self.db.pool).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        self.db.dialect.name()
    }
}
