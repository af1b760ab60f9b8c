//! [`EapStateStore`] implementations

use super::{EapState, EapStateStore, StateBackend, StateError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Debug)]
struct Entry {
    state: EapState,
    stored_at: Instant,
}

/// Single-lock in-memory store.
///
/// Every read and write clones, so no caller ever holds a reference into
/// the map. Entries older than `ttl` are treated as absent and removed by
/// [`EapStateStore::sweep_expired`].
#[derive(Debug)]
pub struct MemoryEapStateStore {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
}

impl MemoryEapStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl EapStateStore for MemoryEapStateStore {
    async fn get_state(&self, token: &str) -> Result<EapState, StateError> {
        let mut entries = self.entries.lock().await;
        match entries.get(token) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Ok(entry.state.clone()),
            Some(_) => {
                entries.remove(token);
                Err(StateError::NotFound(token.to_string()))
            }
            None => Err(StateError::NotFound(token.to_string())),
        }
    }

    async fn set_state(&self, token: &str, state: EapState) -> Result<(), StateError> {
        self.entries.lock().await.insert(
            token.to_string(),
            Entry {
                state,
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn delete_state(&self, token: &str) -> Result<(), StateError> {
        self.entries.lock().await.remove(token);
        Ok(())
    }

    async fn sweep_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        before - entries.len()
    }
}

/// Store that serializes state as JSON into a [`StateBackend`]
pub struct BackendEapStateStore {
    backend: Arc<dyn StateBackend>,
    ttl: Duration,
}

impl BackendEapStateStore {
    pub fn new(backend: Arc<dyn StateBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    fn key(token: &str) -> String {
        format!("eap_state:{}", token)
    }
}

#[async_trait]
impl EapStateStore for BackendEapStateStore {
    async fn get_state(&self, token: &str) -> Result<EapState, StateError> {
        let bytes = self
            .backend
            .get(&Self::key(token))
            .await?
            .ok_or_else(|| StateError::NotFound(token.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn set_state(&self, token: &str, state: EapState) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(&state)?;
        self.backend
            .set(&Self::key(token), &bytes, Some(self.ttl))
            .await
    }

    async fn delete_state(&self, token: &str) -> Result<(), StateError> {
        self.backend.delete(&Self::key(token)).await
    }

    async fn sweep_expired(&self) -> usize {
        self.backend.cleanup_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryStateBackend;

    fn sample() -> EapState {
        let mut state = EapState::new("alice", "eap-mschapv2");
        state.challenge = vec![1, 2, 3];
        state.data.insert("mschapv2_id".to_string(), "7".to_string());
        state
    }

    async fn exercise(store: &dyn EapStateStore) {
        assert!(matches!(
            store.get_state("missing").await,
            Err(StateError::NotFound(_))
        ));

        store.set_state("t1", sample()).await.unwrap();
        let mut copy = store.get_state("t1").await.unwrap();
        assert_eq!(copy, sample());

        // Mutating the copy leaves the stored value alone
        copy.challenge.clear();
        assert_eq!(store.get_state("t1").await.unwrap(), sample());

        store.set_state("t1", copy.clone()).await.unwrap();
        assert!(store.get_state("t1").await.unwrap().challenge.is_empty());

        store.delete_state("t1").await.unwrap();
        assert!(store.get_state("t1").await.is_err());
        store.delete_state("t1").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_contract() {
        exercise(&MemoryEapStateStore::new(Duration::from_secs(60))).await;
    }

    #[tokio::test]
    async fn test_backend_store_contract() {
        let backend = Arc::new(MemoryStateBackend::new());
        exercise(&BackendEapStateStore::new(backend, Duration::from_secs(60))).await;
    }

    #[tokio::test]
    async fn test_memory_store_ttl() {
        let store = MemoryEapStateStore::new(Duration::from_millis(20));
        store.set_state("a", sample()).await.unwrap();
        store.set_state("b", sample()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(matches!(store.get_state("a").await, Err(StateError::NotFound(_))));
        assert_eq!(store.sweep_expired().await, 1);
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_isolated() {
        let store = Arc::new(MemoryEapStateStore::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let token = format!("tok-{}", i);
                let state = EapState::new(format!("user{}", i), "eap-md5");
                store.set_state(&token, state).await.unwrap();
                store.get_state(&token).await.unwrap().username
            }));
        }
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), format!("user{}", i));
        }
    }
}
