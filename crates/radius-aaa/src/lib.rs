//! RADIUS/EAP AAA server
//!
//! Authenticates subscribers for network access servers (PAP, CHAP,
//! MS-CHAPv2, EAP-MD5, EAP-MSCHAPv2, EAP-OTP), keeps online sessions and
//! accounting history, and kicks subscribers that were disabled while online.
//! Protocol codecs live in `radius-proto`.
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_aaa::{Config, RadiusServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.json")?;
//!     let server = Arc::new(RadiusServer::from_config(&config).await?);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod accounting;
pub mod audit;
pub mod auth;
pub mod config;
pub mod disconnect;
pub mod eap;
pub mod error;
pub mod metrics;
pub mod models;
pub mod ratelimit;
pub mod repository;
pub mod server;
pub mod state;

pub use accounting::AccountingEngine;
pub use audit::{AuditEntry, AuditEventType, AuditLogger};
pub use auth::{AuthEngine, AuthSettings};
pub use config::{Config, ConfigError, NasConfig, UserConfig};
pub use disconnect::{DisconnectError, DisconnectNotifier, UdpDisconnectNotifier};
pub use eap::{EapCoordinator, EapMethodHandler};
pub use error::{AuthError, RejectReason};
pub use metrics::Metrics;
pub use models::{Nas, RadiusAccounting, RadiusOnline, RadiusUser, UserStatus};
pub use ratelimit::{AuthRateCache, RateLimitConfig, RejectCache};
pub use repository::{MemoryRepository, RepositoryError, SessionRepository};
pub use server::{RadiusServer, ServerError};
pub use state::{EapState, EapStateStore, StateError};
