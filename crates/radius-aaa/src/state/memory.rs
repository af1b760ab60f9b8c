//! In-memory key-value backend

use super::{StateBackend, StateError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// HashMap-backed [`StateBackend`] for single-node deployments and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryStateBackend {
    store: Arc<RwLock<HashMap<String, StoredValue>>>,
}

#[derive(Debug, Clone)]
struct StoredValue {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

impl MemoryStateBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys, expired ones included
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }
}

#[async_trait]
impl StateBackend for MemoryStateBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        let store = self.store.read().await;
        Ok(store
            .get(key)
            .filter(|value| !value.is_expired())
            .map(|value| value.data.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StateError> {
        self.store
            .write()
            .await
            .insert(key.to_string(), StoredValue::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StateError> {
        self.store.write().await.remove(key);
        Ok(())
    }

    async fn cleanup_expired(&self) -> usize {
        let mut store = self.store.write().await;
        let before = store.len();
        store.retain(|_, value| !value.is_expired());
        before - store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = MemoryStateBackend::new();
        backend.set("k", b"v", None).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));

        backend.delete("k").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);
        backend.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn test_expiry() {
        let backend = MemoryStateBackend::new();
        backend
            .set("short", b"v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        backend.set("long", b"v", None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.get("short").await.unwrap(), None);
        assert_eq!(backend.cleanup_expired().await, 1);
        assert_eq!(backend.len().await, 1);
    }
}
