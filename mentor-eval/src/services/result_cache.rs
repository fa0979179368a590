//! Short-lived cache of status and result responses
//!
//! **[ME-CA-010]** Never authoritative: entries expire after the configured TTL
//! and are invalidated whenever a session completes, fails or restarts.

use mentor_common::config::CacheConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// In-memory TTL map shared through application state
#[derive(Clone)]
pub struct ResultCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
    enabled: bool,
}

/// Cache key for a session's result payload
pub fn results_key(session_id: Uuid) -> String {
    format!("results:{}", session_id)
}

/// Cache key for a session's status payload
pub fn status_key(session_id: Uuid) -> String {
    format!("status:{}", session_id)
}

impl ResultCache {
    pub fn new(enabled: bool, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            enabled,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.enabled, Duration::from_secs(config.ttl_seconds))
    }

    /// Disabled cache: every lookup misses
    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.enabled {
            return None;
        }

        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    pub async fn put(&self, key: String, value: Value) {
        if !self.enabled {
            return;
        }

        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drop both cached payloads of a session
    pub async fn invalidate_session(&self, session_id: Uuid) {
        let mut entries = self.entries.write().await;
        entries.remove(&results_key(session_id));
        entries.remove(&status_key(session_id));
        tracing::debug!(session_id = %session_id, "Result cache invalidated");
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_and_invalidate() {
        let cache = ResultCache::new(true, Duration::from_secs(60));
        let id = Uuid::new_v4();

        cache.put(status_key(id), json!({"status": "processing"})).await;
        cache.put(results_key(id), json!({"mentor_score": 8.1})).await;
        assert_eq!(cache.get(&status_key(id)).await, Some(json!({"status": "processing"})));

        cache.invalidate_session(id).await;
        assert!(cache.get(&status_key(id)).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let cache = ResultCache::new(true, Duration::from_millis(20));
        let id = Uuid::new_v4();

        cache.put(status_key(id), json!("x")).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(cache.get(&status_key(id)).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let cache = ResultCache::disabled();
        let id = Uuid::new_v4();

        cache.put(status_key(id), json!("x")).await;
        assert!(cache.get(&status_key(id)).await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn test_keys() {
        let id = Uuid::nil();
        assert_eq!(results_key(id), format!("results:{}", id));
        assert_eq!(status_key(id), format!("status:{}", id));
    }
}
