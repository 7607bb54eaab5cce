//! In-process session cache

use super::{spawn_sweeper, SessionStore, StoreError, StoreResult, Sweeper};
use crate::state_machine::Session;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    session: Session,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        !matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Sessions held in a concurrent map. Lost on restart.
pub struct CacheStore {
    entries: Arc<DashMap<String, Entry>>,
    ttl: Option<Duration>,
    _sweeper: Option<Sweeper>,
}

impl CacheStore {
    /// `ttl` of `None` keeps sessions until deleted
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl,
            _sweeper: None,
        }
    }

    /// Purge expired entries every `interval` in the background
    pub fn with_sweeper(self, interval: Duration) -> Self {
        let entries = self.entries.clone();
        let sweeper = spawn_sweeper("cache", interval, move || {
            std::future::ready(Ok(purge(&entries)))
        });
        Self {
            _sweeper: Some(sweeper),
            ..self
        }
    }

    /// Drop expired entries now; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        purge(&self.entries)
    }

    /// Entries held, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expiry(&self, now: Instant) -> Option<Instant> {
        self.ttl.and_then(|ttl| now.checked_add(ttl))
    }
}

fn purge(entries: &DashMap<String, Entry>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live(now));
    before.saturating_sub(entries.len())
}

#[async_trait]
impl SessionStore for CacheStore {
    async fn exists(&self, id: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self.entries.get(id).is_some_and(|e| e.is_live(now)))
    }

    async fn get(&self, id: &str) -> StoreResult<Session> {
        let now = Instant::now();
        self.entries
            .get(id)
            .filter(|e| e.is_live(now))
            .map(|e| e.session.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn set(&self, id: &str, session: &Session) -> StoreResult<()> {
        let now = Instant::now();
        let expires_at = self.expiry(now);
        let mut entry = self.entries.entry(id.to_string()).or_insert_with(|| Entry {
            session: Session::new(),
            expires_at,
        });
        if !entry.is_live(now) {
            entry.session = Session::new();
        }
        entry.session.merge_from(session);
        entry.expires_at = expires_at;
        Ok(())
    }

    async fn delete(&self, id: &str) -> StoreResult<()> {
        self.entries.remove(id);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "cache"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = CacheStore::new(None);
        assert!(!store.exists("u1").await.unwrap());
        assert!(matches!(store.get("u1").await, Err(StoreError::NotFound(id)) if id == "u1"));

        let session = Session::with_state(3).with_slot("name", "Ada");
        store.set("u1", &session).await.unwrap();
        assert!(store.exists("u1").await.unwrap());
        assert_eq!(store.get("u1").await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_set_merges_slots() {
        let store = CacheStore::new(None);
        store
            .set("u1", &Session::with_state(1).with_slot("a", "1").with_slot("b", "2"))
            .await
            .unwrap();
        store
            .set("u1", &Session::with_state(2).with_slot("b", "3"))
            .await
            .unwrap();

        let stored = store.get("u1").await.unwrap();
        assert_eq!(stored.state, 2);
        assert_eq!(stored.slot("a"), Some("1"));
        assert_eq!(stored.slot("b"), Some("3"));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = CacheStore::new(None);
        store.set("u1", &Session::new()).await.unwrap();
        store.delete("u1").await.unwrap();
        store.delete("never-existed").await.unwrap();
        assert!(!store.exists("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_expiry_hides_sessions_before_purge() {
        let store = CacheStore::new(Some(Duration::from_millis(40)));
        store
            .set("u1", &Session::with_state(1).with_slot("k", "v"))
            .await
            .unwrap();
        assert!(store.exists("u1").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!store.exists("u1").await.unwrap());
        assert!(matches!(store.get("u1").await, Err(StoreError::NotFound(_))));
        assert_eq!(store.len(), 1);

        assert_eq!(store.purge_expired(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_expired_slots_are_not_merged() {
        let store = CacheStore::new(Some(Duration::from_millis(40)));
        store
            .set("u1", &Session::with_state(1).with_slot("old", "x"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        store.set("u1", &Session::with_state(2)).await.unwrap();
        let stored = store.get("u1").await.unwrap();
        assert_eq!(stored, Session::with_state(2));
    }

    #[tokio::test]
    async fn test_set_refreshes_ttl() {
        let store = CacheStore::new(Some(Duration::from_millis(100)));
        store.set("u1", &Session::new()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.set("u1", &Session::with_state(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(store.exists("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_sweeper_purges_in_background() {
        let store =
            CacheStore::new(Some(Duration::from_millis(20))).with_sweeper(Duration::from_millis(20));
        store.set("u1", &Session::new()).await.unwrap();
        store.set("u2", &Session::new()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.is_empty());
    }
}
