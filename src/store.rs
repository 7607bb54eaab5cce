//! Session persistence
//!
//! Interchangeable backends behind [`SessionStore`]: an in-process cache, a
//! remote key-value server, a SQLite file and a PostgreSQL or MySQL server.
//! Every backend expires sessions that have not been written for the
//! configured TTL.

mod cache;
mod rdbms;
mod remote;
mod sql;
mod sweep;

pub use cache::CacheStore;
pub use rdbms::{Dialect, RdbmsStore};
pub use remote::{KvClient, RedisClient, RemoteStore};
pub use sql::SqlStore;
pub use sweep::{spawn_sweeper, Sweeper};

use crate::config::{StoreConfig, StoreKind};
use crate::state_machine::Session;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt session {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Database server error: {0}")]
    Rdbms(#[from] sqlx::Error),
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage for per-conversation sessions.
///
/// `set` overwrites the state, merges the given slots into the stored ones
/// and refreshes the expiry.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn exists(&self, id: &str) -> StoreResult<bool>;

    /// Fails with [`StoreError::NotFound`] for unknown or expired ids
    async fn get(&self, id: &str) -> StoreResult<Session>;

    async fn set(&self, id: &str, session: &Session) -> StoreResult<()>;

    /// Remove a session; a missing id is not an error
    async fn delete(&self, id: &str) -> StoreResult<()>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn exists(&self, id: &str) -> StoreResult<bool> {
        (**self).exists(id).await
    }

    async fn get(&self, id: &str) -> StoreResult<Session> {
        (**self).get(id).await
    }

    async fn set(&self, id: &str, session: &Session) -> StoreResult<()> {
        (**self).set(id, session).await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        (**self).delete(id).await
    }

    fn backend(&self) -> &'static str {
        (**self).backend()
    }
}

/// Build the configured backend.
///
/// A backend that cannot be reached at startup is replaced by the in-memory
/// cache so the bot keeps answering. Must run inside a Tokio runtime.
pub async fn open(config: &StoreConfig) -> Arc<dyn SessionStore> {
    match try_open(config).await {
        Ok(store) => {
            tracing::info!(
                backend = store.backend(),
                ttl_secs = config.ttl.map(|t| t.as_secs()),
                "Session store ready"
            );
            store
        }
        Err(e) => {
            tracing::warn!(
                backend = ?config.kind,
                error = %e,
                "Session store unavailable, falling back to in-memory cache"
            );
            Arc::new(cache_store(config))
        }
    }
}

/// Build the configured backend without falling back
pub async fn try_open(config: &StoreConfig) -> StoreResult<Arc<dyn SessionStore>> {
    let purge = config.purge_interval();
    Ok(match config.kind {
        StoreKind::Cache => Arc::new(cache_store(config)),
        StoreKind::Redis => {
            let client = RedisClient::connect(&config.redis_url).await?;
            Arc::new(RemoteStore::new(client, config.ttl))
        }
        StoreKind::Sql => match &config.sql_url {
            None => {
                let mut store = SqlStore::open(&config.sql_path, config.ttl)?;
                if let Some(interval) = purge {
                    store = store.with_sweeper(interval);
                }
                Arc::new(store)
            }
            Some(url) => {
                let mut store = RdbmsStore::connect(url, config.ttl).await?;
                if let Some(interval) = purge {
                    store = store.with_sweeper(interval);
                }
                Arc::new(store)
            }
        },
    })
}

fn cache_store(config: &StoreConfig) -> CacheStore {
    let store = CacheStore::new(config.ttl);
    match config.purge_interval() {
        Some(interval) => store.with_sweeper(interval),
        None => store,
    }
}
