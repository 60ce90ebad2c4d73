use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::domain::errors::GatewayResult;
use crate::domain::ports::CacheStore;

struct Entry {
    value: Vec<u8>,
    /// Epoch-ms expiry, `None` means no expiry.
    expires_at: Option<i64>,
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// In-process key/value store with native TTL, guarded the way
/// `SpreadCache` guards its map: both read and write locks recover from
/// poisoning instead of panicking, since one task's panic must not take
/// the whole cache down with it.
///
/// A remote store (e.g. Redis) is a drop-in implementor of the same
/// `CacheStore` trait; none of the corpus this gateway was built against
/// pulls in a Redis client crate, so this in-process store is what ships.
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn is_live(entry: &Entry) -> bool {
        match entry.expires_at {
            Some(exp) => exp > now_ms(),
            None => true,
        }
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get_bytes(&self, key: &str) -> GatewayResult<Option<Vec<u8>>> {
        let guard = match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard
            .get(key)
            .filter(|e| Self::is_live(e))
            .map(|e| e.value.clone()))
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl_seconds: Option<u64>) -> GatewayResult<()> {
        let expires_at = ttl_seconds.map(|ttl| now_ms() + (ttl as i64) * 1000);
        let mut guard = match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> GatewayResult<()> {
        let mut guard = match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.remove(key);
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> GatewayResult<u64> {
        let mut guard = match self.entries.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let victims: Vec<String> = guard.keys().filter(|k| k.starts_with(prefix)).cloned().collect();
        let count = victims.len() as u64;
        for k in victims {
            guard.remove(&k);
        }
        Ok(count)
    }

    async fn keys(&self, prefix: &str) -> GatewayResult<Vec<String>> {
        let guard = match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(guard
            .iter()
            .filter(|(k, e)| k.starts_with(prefix) && Self::is_live(e))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn ttl(&self, key: &str) -> GatewayResult<i64> {
        let guard = match self.entries.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.get(key) {
            None => Ok(-2),
            Some(entry) if !Self::is_live(entry) => Ok(-2),
            Some(Entry { expires_at: None, .. }) => Ok(-1),
            Some(Entry { expires_at: Some(exp), .. }) => Ok(((exp - now_ms()).max(0)) / 1000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryCacheStore::new();
        store.set_bytes("k1", b"hello".to_vec(), None).await.unwrap();
        let v = store.get_bytes("k1").await.unwrap();
        assert_eq!(v, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn missing_key_has_ttl_negative_two() {
        let store = InMemoryCacheStore::new();
        assert_eq!(store.ttl("nope").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn no_ttl_reports_negative_one() {
        let store = InMemoryCacheStore::new();
        store.set_bytes("k1", b"x".to_vec(), None).await.unwrap();
        assert_eq!(store.ttl("k1").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn expired_entry_reads_as_absent() {
        let store = InMemoryCacheStore::new();
        store.set_bytes("k1", b"x".to_vec(), Some(0)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(store.get_bytes("k1").await.unwrap(), None);
        assert_eq!(store.ttl("k1").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn clear_prefix_removes_matching_keys_only() {
        let store = InMemoryCacheStore::new();
        store.set_bytes("midas:cache:a", b"1".to_vec(), None).await.unwrap();
        store.set_bytes("midas:cache:b", b"2".to_vec(), None).await.unwrap();
        store.set_bytes("other:c", b"3".to_vec(), None).await.unwrap();
        let cleared = store.clear_prefix("midas:cache:").await.unwrap();
        assert_eq!(cleared, 2);
        assert_eq!(store.keys("").await.unwrap().len(), 1);
    }
}
