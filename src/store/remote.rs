//! Remote key-value session store
//!
//! A session is split across two keys: `{id}:state` holds the state id as a
//! string and `{id}:slots` is a hash of slot values. Expiry is delegated to
//! the server, so no sweeper runs for this backend. Every store operation is
//! a single round trip.

use super::{SessionStore, StoreError, StoreResult};
use crate::state_machine::Session;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::collections::HashMap;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// The key-value operations the store needs, one round trip each
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Read a string key and a hash key together. A missing hash reads as empty.
    async fn read(&self, key: &str, hash_key: &str)
        -> StoreResult<(Option<String>, HashMap<String, String>)>;

    /// Set a string key and merge `fields` into a hash key atomically,
    /// expiring both after `ttl` when given
    async fn write(
        &self,
        key: &str,
        value: &str,
        hash_key: &str,
        fields: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> StoreResult<()>;

    async fn delete(&self, keys: &[&str]) -> StoreResult<()>;
}

/// [`KvClient`] backed by a Redis server
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    /// Connect to `url` (`redis://host:port/db`)
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = tokio::time::timeout(CONNECT_TIMEOUT, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Unavailable(format!("timed out connecting to {url}")))??;
        tracing::info!(url = %url, "Connected to redis");
        Ok(Self { manager })
    }
}

/// Whole seconds for the server, never zero
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvClient for RedisClient {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut con = self.manager.clone();
        let count: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut con).await?;
        Ok(count > 0)
    }

    async fn read(
        &self,
        key: &str,
        hash_key: &str,
    ) -> StoreResult<(Option<String>, HashMap<String, String>)> {
        let mut con = self.manager.clone();
        Ok(redis::pipe()
            .atomic()
            .cmd("GET")
            .arg(key)
            .cmd("HGETALL")
            .arg(hash_key)
            .query_async(&mut con)
            .await?)
    }

    async fn write(
        &self,
        key: &str,
        value: &str,
        hash_key: &str,
        fields: &[(&str, &str)],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let mut con = self.manager.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().cmd("SET").arg(key).arg(value);
        if let Some(ttl) = ttl {
            pipe.arg("EX").arg(ttl_secs(ttl));
        }
        pipe.ignore();

        if !fields.is_empty() {
            pipe.cmd("HSET").arg(hash_key);
            for (field, value) in fields {
                pipe.arg(*field).arg(*value);
            }
            pipe.ignore();
        }
        if let Some(ttl) = ttl {
            pipe.cmd("EXPIRE").arg(hash_key).arg(ttl_secs(ttl)).ignore();
        }

        let () = pipe.query_async(&mut con).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[&str]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut con = self.manager.clone();
        let mut cmd = redis::cmd("DEL");
        for key in keys {
            cmd.arg(*key);
        }
        let () = cmd.query_async(&mut con).await?;
        Ok(())
    }
}

/// Sessions kept in a remote key-value server
pub struct RemoteStore<C> {
    client: C,
    ttl: Option<Duration>,
}

impl<C: KvClient> RemoteStore<C> {
    pub fn new(client: C, ttl: Option<Duration>) -> Self {
        Self { client, ttl }
    }

    fn state_key(id: &str) -> String {
        format!("{id}:state")
    }

    fn slots_key(id: &str) -> String {
        format!("{id}:slots")
    }
}

#[async_trait]
impl<C: KvClient> SessionStore for RemoteStore<C> {
    async fn exists(&self, id: &str) -> StoreResult<bool> {
        self.client.exists(&Self::state_key(id)).await
    }

    async fn get(&self, id: &str) -> StoreResult<Session> {
        let (raw, slots) = self
            .client
            .read(&Self::state_key(id), &Self::slots_key(id))
            .await?;
        let raw = raw.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let state = raw.trim().parse().map_err(|_| StoreError::Corrupt {
            id: id.to_string(),
            reason: format!("state is not an integer: {raw:?}"),
        })?;
        Ok(Session { state, slots })
    }

    async fn set(&self, id: &str, session: &Session) -> StoreResult<()> {
        let fields: Vec<(&str, &str)> = session
            .slots
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.client
            .write(
                &Self::state_key(id),
                &session.state.to_string(),
                &Self::slots_key(id),
                &fields,
                self.ttl,
            )
            .await
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        let state_key = Self::state_key(id);
        let slots_key = Self::slots_key(id);
        self.client.delete(&[&state_key, &slots_key]).await
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}
