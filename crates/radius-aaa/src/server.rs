//! UDP listeners for authentication and accounting
//!
//! Each socket loop receives datagrams and hands every packet to its own
//! task, bounded by a semaphore of `max_workers` permits. The engine runs in
//! an inner task so a panic only costs that one request: the auth listener
//! answers it with an `internal-error` reject, the accounting listener logs
//! it.

use crate::accounting::AccountingEngine;
use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::auth::{AuthEngine, AuthSettings};
use crate::config::{Config, ConfigError};
use crate::disconnect::{DisconnectNotifier, UdpDisconnectNotifier};
use crate::eap::{EapCoordinator, TotpVerifier};
use crate::metrics::Metrics;
use crate::ratelimit::{AuthRateCache, RejectCache, spawn_cleanup};
use crate::repository::{MemoryRepository, RepositoryError, SessionRepository};
use crate::state::{EapStateStore, build_store, spawn_sweeper};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

const MAX_DATAGRAM: usize = 4096;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listener {
    Auth,
    Accounting,
}

impl Listener {
    fn name(self) -> &'static str {
        match self {
            Listener::Auth => "auth",
            Listener::Accounting => "accounting",
        }
    }
}

pub struct RadiusServer {
    auth_socket: Arc<UdpSocket>,
    acct_socket: Arc<UdpSocket>,
    auth: Arc<AuthEngine>,
    accounting: Arc<AccountingEngine>,
    store: Arc<dyn EapStateStore>,
    rate_cache: Arc<AuthRateCache>,
    metrics: Arc<Metrics>,
    audit: Arc<AuditLogger>,
    max_workers: usize,
    sweep_interval: Duration,
}

/// Repository selected by configuration: PostgreSQL when `database_url` is
/// set, otherwise the NAS and users listed in the file
pub async fn build_repository(
    config: &Config,
) -> Result<Arc<dyn SessionRepository>, ServerError> {
    match &config.database_url {
        #[cfg(feature = "postgres")]
        Some(url) => {
            let max_connections = u32::try_from(config.max_workers).unwrap_or(u32::MAX).min(64);
            let repo = crate::repository::PostgresRepository::from_url(
                url,
                max_connections,
                config.repository_timeout(),
            )
            .await?;
            repo.migrate().await?;
            Ok(Arc::new(repo))
        }
        #[cfg(not(feature = "postgres"))]
        Some(_) => Err(ServerError::Config(ConfigError::Invalid(
            "database_url requires the postgres feature".to_string(),
        ))),
        None => Ok(Arc::new(MemoryRepository::from_config(config))),
    }
}

impl RadiusServer {
    /// Bind both listeners with the repository chosen by configuration
    pub async fn from_config(config: &Config) -> Result<Self, ServerError> {
        let repo = build_repository(config).await?;
        let notifier = Arc::new(UdpDisconnectNotifier::new(config.disconnect_timeout()));
        Self::with_repository(config, repo, notifier).await
    }

    /// Bind both listeners over an existing repository
    pub async fn with_repository(
        config: &Config,
        repo: Arc<dyn SessionRepository>,
        notifier: Arc<dyn DisconnectNotifier>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        if !config.is_known_eap_method() {
            warn!(method = %config.eap_method, "Unknown EAP method, falling back to eap-md5");
        }

        let metrics = Arc::new(Metrics::new());
        let audit = Arc::new(AuditLogger::new(config.audit_log_path.clone())?);
        let store = build_store(&config.state);
        let coordinator = EapCoordinator::with_default_handlers(
            Arc::clone(&store),
            config.eap_method.as_str(),
            &config.server_name,
            Arc::new(TotpVerifier::default()),
        );

        let limits = config.rate_limit();
        let rate_cache = Arc::new(AuthRateCache::new(limits.auth_interval));
        let auth = AuthEngine::new(
            Arc::clone(&repo),
            Arc::new(coordinator),
            Arc::clone(&rate_cache),
            Arc::new(RejectCache::new(limits.reject_capacity)),
            Arc::clone(&metrics),
            Arc::clone(&audit),
            AuthSettings::from_config(config),
        );
        let accounting = AccountingEngine::new(
            repo,
            notifier,
            Arc::clone(&metrics),
            Arc::clone(&audit),
            config.repository_timeout(),
        );

        let auth_socket = UdpSocket::bind(config.auth_addr()?).await?;
        let acct_socket = UdpSocket::bind(config.acct_addr()?).await?;
        info!(
            auth = %auth_socket.local_addr()?,
            accounting = %acct_socket.local_addr()?,
            eap_method = %config.eap_method,
            "RADIUS server listening"
        );

        Ok(RadiusServer {
            auth_socket: Arc::new(auth_socket),
            acct_socket: Arc::new(acct_socket),
            auth: Arc::new(auth),
            accounting: Arc::new(accounting),
            store,
            rate_cache,
            metrics,
            audit,
            max_workers: config.max_workers,
            sweep_interval: Duration::from_secs(config.state.sweep_interval_secs.max(1)),
        })
    }

    /// Address of the authentication socket; useful when bound to port 0
    pub fn auth_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.auth_socket.local_addr()?)
    }

    pub fn acct_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.acct_socket.local_addr()?)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Serve both listeners until one of them fails
    pub async fn run(self: Arc<Self>) -> Result<(), ServerError> {
        let sweeper = spawn_sweeper(Arc::clone(&self.store), self.sweep_interval);
        let cleanup = spawn_cleanup(Arc::clone(&self.rate_cache), self.sweep_interval);
        self.audit
            .log(AuditEntry::new(AuditEventType::ServerStart).with_details(format!(
                "auth={} accounting={}",
                self.auth_addr()?,
                self.acct_addr()?
            )))
            .await;

        let result = tokio::try_join!(
            Arc::clone(&self).serve(Listener::Auth),
            Arc::clone(&self).serve(Listener::Accounting),
        );

        sweeper.abort();
        cleanup.abort();
        self.audit.log(AuditEntry::new(AuditEventType::ServerStop)).await;
        result.map(|_| ())
    }

    async fn serve(self: Arc<Self>, listener: Listener) -> Result<(), ServerError> {
        let socket = match listener {
            Listener::Auth => Arc::clone(&self.auth_socket),
            Listener::Accounting => Arc::clone(&self.acct_socket),
        };
        let workers = Arc::new(Semaphore::new(self.max_workers));
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, peer) = socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();

            let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
                return Ok(());
            };
            let server = Arc::clone(&self);
            let socket = Arc::clone(&socket);

            tokio::spawn(async move {
                let _permit = permit;
                let Some(reply) = server.process(listener, data, peer).await else {
                    return;
                };
                if let Err(e) = socket.send_to(&reply, peer).await {
                    warn!(client_addr = %peer, error = %e, "Failed to send reply");
                } else {
                    debug!(client_addr = %peer, listener = listener.name(), "Sent reply");
                }
            });
        }
    }

    /// Run the engine in its own task; a panic becomes a JoinError here
    async fn process(
        &self,
        listener: Listener,
        data: Vec<u8>,
        peer: SocketAddr,
    ) -> Option<Vec<u8>> {
        let data = Arc::new(data);
        let worker = {
            let data = Arc::clone(&data);
            let auth = Arc::clone(&self.auth);
            let accounting = Arc::clone(&self.accounting);
            tokio::spawn(async move {
                match listener {
                    Listener::Auth => auth.handle(&data, peer.ip()).await,
                    Listener::Accounting => accounting.handle(&data, peer.ip()).await,
                }
            })
        };

        match worker.await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    client_addr = %peer,
                    listener = listener.name(),
                    error = %e,
                    "Request worker failed"
                );
                match listener {
                    Listener::Auth => self.auth.reject_internal(&data, peer.ip()).await,
                    Listener::Accounting => {
                        self.metrics.acct_error();
                        None
                    }
                }
            }
        }
    }
}
