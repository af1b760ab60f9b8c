//! Persistence seam for NAS, subscriber, online-session and accounting records
//!
//! The engines only ever talk to a [`SessionRepository`]. The crate ships an
//! in-memory implementation, seeded from configuration, and a PostgreSQL one
//! behind the `postgres` feature.

use crate::models::{AcctStop, Nas, RadiusAccounting, RadiusOnline, RadiusUser, UserField};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use radius_proto::AcctCounters;
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryRepository;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRepository;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Online session already exists: {0}")]
    DuplicateSession(String),
    #[error("Invalid value {value:?} for field {field}")]
    InvalidValue { field: UserField, value: String },
    #[error("Repository call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Repository backend error: {0}")]
    Backend(String),
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        RepositoryError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// NAS whose address range contains `ip`, falling back to `identifier`
    async fn find_nas(&self, ip: IpAddr, identifier: &str)
    -> Result<Option<Nas>, RepositoryError>;

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<RadiusUser>, RepositoryError>;

    /// `mac` is in normalized colon form
    async fn find_user_by_mac(&self, mac: &str) -> Result<Option<RadiusUser>, RepositoryError>;

    /// `LastOnline` values are RFC 3339 timestamps, VLAN ids decimal
    async fn update_user_field(
        &self,
        username: &str,
        field: UserField,
        value: &str,
    ) -> Result<(), RepositoryError>;

    async fn count_active_sessions(&self, username: &str) -> Result<u32, RepositoryError>;

    /// Fails with [`RepositoryError::DuplicateSession`] when the id is taken
    async fn insert_online_session(&self, session: RadiusOnline) -> Result<(), RepositoryError>;

    /// Overwrites the counters; returns false when no session matched
    async fn update_online_session(
        &self,
        session_id: &str,
        counters: &AcctCounters,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;

    async fn delete_online_session(&self, session_id: &str) -> Result<(), RepositoryError>;

    async fn exists_online_session(&self, session_id: &str) -> Result<bool, RepositoryError>;

    async fn find_online_session(
        &self,
        session_id: &str,
    ) -> Result<Option<RadiusOnline>, RepositoryError>;

    async fn insert_accounting_record(
        &self,
        record: RadiusAccounting,
    ) -> Result<(), RepositoryError>;

    /// Overwrites the counters and, when given, the stop time and terminate
    /// cause. Returns false when no record matched.
    async fn update_accounting_record(
        &self,
        session_id: &str,
        counters: &AcctCounters,
        stop: Option<AcctStop>,
    ) -> Result<bool, RepositoryError>;

    /// Returns the number of sessions removed
    async fn clear_online_sessions_for_nas(&self, nas_addr: &str) -> Result<u64, RepositoryError>;

    /// Sets `stop_time` on every open record of the NAS
    async fn close_accounting_records_for_nas(
        &self,
        nas_addr: &str,
        stop_time: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
}

/// Bounds one repository call by `limit`
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| RepositoryError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let value = with_timeout(Duration::from_secs(1), async { Ok::<_, RepositoryError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_with_timeout_elapses() {
        let result = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RepositoryError>(())
        })
        .await;
        assert!(matches!(result, Err(RepositoryError::Timeout(_))));
    }
}
