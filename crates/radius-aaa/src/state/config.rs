//! EAP state store configuration

use serde::{Deserialize, Serialize};

/// Which [`super::EapStateStore`] to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EapStoreKind {
    /// Mutex-guarded map (default)
    #[default]
    Memory,

    /// JSON values in a [`super::StateBackend`]
    KeyValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub kind: EapStoreKind,

    /// Lifetime of an unanswered challenge, in seconds (default: 60)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Sweep period in seconds (default: 30)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    30
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            kind: EapStoreKind::Memory,
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}
