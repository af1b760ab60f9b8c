//! EAP negotiation state
//!
//! An [`EapState`] lives from the moment a challenge is issued until the
//! response that consumes it has been verified. It is keyed by the opaque
//! token the server puts in the RADIUS State attribute.
//!
//! Two stores ship with the crate:
//!
//! - [`MemoryEapStateStore`]: one mutex-guarded map, entries cloned in and
//!   out, expired by TTL
//! - [`BackendEapStateStore`]: JSON over any [`StateBackend`] key-value
//!   store, so state can live outside the process
//!
//! ```rust
//! use radius_aaa::state::{EapState, EapStateStore, MemoryEapStateStore};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), radius_aaa::state::StateError> {
//! let store = MemoryEapStateStore::new(Duration::from_secs(60));
//! store.set_state("token", EapState::new("alice", "eap-md5")).await?;
//! let state = store.get_state("token").await?;
//! assert_eq!(state.username, "alice");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod eap_store;
pub mod error;
pub mod memory;

pub use config::{EapStoreKind, StateConfig};
pub use eap_store::{BackendEapStateStore, MemoryEapStateStore};
pub use error::StateError;
pub use memory::MemoryStateBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// In-flight negotiation context for one EAP round trip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EapState {
    pub username: String,
    /// Configured method name, e.g. `eap-md5`
    pub method: String,
    /// Challenge bytes sent to the peer
    pub challenge: Vec<u8>,
    /// Method-specific carry-over, e.g. the MS-CHAPv2 identifier
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl EapState {
    pub fn new(username: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            method: method.into(),
            ..Default::default()
        }
    }
}

/// Token → [`EapState`] storage.
///
/// Implementations hand out owned copies: mutating a returned state has no
/// effect until it is written back with `set_state`.
#[async_trait]
pub trait EapStateStore: Send + Sync {
    /// `StateError::NotFound` when the token is unknown or expired
    async fn get_state(&self, token: &str) -> Result<EapState, StateError>;

    async fn set_state(&self, token: &str, state: EapState) -> Result<(), StateError>;

    /// Deleting an unknown token is not an error
    async fn delete_state(&self, token: &str) -> Result<(), StateError>;

    /// Drop expired entries, returning how many were removed
    async fn sweep_expired(&self) -> usize {
        0
    }
}

/// Raw key-value backend with per-key TTL
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// `Ok(None)` if the key is missing or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StateError>;

    async fn delete(&self, key: &str) -> Result<(), StateError>;

    /// Remove expired keys, returning how many were removed
    async fn cleanup_expired(&self) -> usize;
}

/// Build the store selected by configuration
pub fn build_store(config: &StateConfig) -> Arc<dyn EapStateStore> {
    let ttl = Duration::from_secs(config.ttl_secs);
    match config.kind {
        EapStoreKind::Memory => Arc::new(MemoryEapStateStore::new(ttl)),
        EapStoreKind::KeyValue => Arc::new(BackendEapStateStore::new(
            Arc::new(MemoryStateBackend::new()),
            ttl,
        )),
    }
}

/// Periodically sweep expired state so abandoned negotiations do not pile up
pub fn spawn_sweeper(
    store: Arc<dyn EapStateStore>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let removed = store.sweep_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Swept expired EAP state");
            }
        }
    })
}
