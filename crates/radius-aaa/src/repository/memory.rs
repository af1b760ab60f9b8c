//! DashMap-backed repository for single-node deployments and tests

use super::{RepositoryError, SessionRepository};
use crate::config::Config;
use crate::models::{
    AcctStop, Nas, RadiusAccounting, RadiusOnline, RadiusUser, UserField, UserStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use ipnetwork::IpNetwork;
use radius_proto::AcctCounters;
use std::net::IpAddr;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    nas: RwLock<Vec<Nas>>,
    users: DashMap<String, RadiusUser>,
    online: DashMap<String, RadiusOnline>,
    accounting: DashMap<String, RadiusAccounting>,
}

fn nas_matches(nas: &Nas, ip: IpAddr) -> bool {
    let network = nas
        .ipaddr
        .parse::<IpNetwork>()
        .ok()
        .or_else(|| nas.ipaddr.parse::<IpAddr>().ok().map(IpNetwork::from));
    network.is_some_and(|net| net.contains(ip))
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeded with the NAS and users listed in the configuration file
    pub fn from_config(config: &Config) -> Self {
        let repo = Self::new();
        for (id, nas) in (1..).zip(&config.nas) {
            repo.add_nas(nas.to_nas(id));
        }
        for (id, user) in (1..).zip(&config.users) {
            repo.add_user(user.to_user(id));
        }
        repo
    }

    pub fn add_nas(&self, nas: Nas) {
        if let Ok(mut list) = self.nas.write() {
            list.push(nas);
        }
    }

    pub fn add_user(&self, user: RadiusUser) {
        self.users.insert(user.username.clone(), user);
    }

    pub fn user(&self, username: &str) -> Option<RadiusUser> {
        self.users.get(username).map(|u| u.clone())
    }

    pub fn set_user_status(&self, username: &str, status: UserStatus) {
        if let Some(mut user) = self.users.get_mut(username) {
            user.status = status;
        }
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn accounting_record(&self, session_id: &str) -> Option<RadiusAccounting> {
        self.accounting.get(session_id).map(|r| r.clone())
    }
}

#[async_trait]
impl SessionRepository for MemoryRepository {
    async fn find_nas(
        &self,
        ip: IpAddr,
        identifier: &str,
    ) -> Result<Option<Nas>, RepositoryError> {
        let list = self
            .nas
            .read()
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        let by_ip = list.iter().find(|nas| nas_matches(nas, ip));
        let found = by_ip.or_else(|| {
            list.iter()
                .find(|nas| !identifier.is_empty() && nas.identifier == identifier)
        });
        Ok(found.cloned())
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<RadiusUser>, RepositoryError> {
        Ok(self.user(username))
    }

    async fn find_user_by_mac(&self, mac: &str) -> Result<Option<RadiusUser>, RepositoryError> {
        Ok(self
            .users
            .iter()
            .find(|user| user.mac_addr.eq_ignore_ascii_case(mac))
            .map(|user| user.clone()))
    }

    async fn update_user_field(
        &self,
        username: &str,
        field: UserField,
        value: &str,
    ) -> Result<(), RepositoryError> {
        let invalid = || RepositoryError::InvalidValue {
            field,
            value: value.to_string(),
        };

        let Some(mut user) = self.users.get_mut(username) else {
            return Ok(());
        };
        match field {
            UserField::MacAddr => user.mac_addr = value.to_string(),
            UserField::Vlanid1 => user.vlanid1 = value.parse().map_err(|_| invalid())?,
            UserField::Vlanid2 => user.vlanid2 = value.parse().map_err(|_| invalid())?,
            UserField::LastOnline => {
                let at = DateTime::parse_from_rfc3339(value).map_err(|_| invalid())?;
                user.last_online = Some(at.with_timezone(&Utc));
            }
        }
        Ok(())
    }

    async fn count_active_sessions(&self, username: &str) -> Result<u32, RepositoryError> {
        let count = self.online.iter().filter(|s| s.username == username).count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn insert_online_session(&self, session: RadiusOnline) -> Result<(), RepositoryError> {
        match self.online.entry(session.acct_session_id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::DuplicateSession(session.acct_session_id)),
            Entry::Vacant(slot) => {
                slot.insert(session);
                Ok(())
            }
        }
    }

    async fn update_online_session(
        &self,
        session_id: &str,
        counters: &AcctCounters,
        updated_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let Some(mut session) = self.online.get_mut(session_id) else {
            return Ok(false);
        };
        session.acct_session_time = counters.session_time;
        session.acct_input_total = counters.input_octets;
        session.acct_output_total = counters.output_octets;
        session.acct_input_packets = counters.input_packets;
        session.acct_output_packets = counters.output_packets;
        session.last_update = updated_at;
        Ok(true)
    }

    async fn delete_online_session(&self, session_id: &str) -> Result<(), RepositoryError> {
        self.online.remove(session_id);
        Ok(())
    }

    async fn exists_online_session(&self, session_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.online.contains_key(session_id))
    }

    async fn find_online_session(
        &self,
        session_id: &str,
    ) -> Result<Option<RadiusOnline>, RepositoryError> {
        Ok(self.online.get(session_id).map(|s| s.clone()))
    }

    async fn insert_accounting_record(
        &self,
        record: RadiusAccounting,
    ) -> Result<(), RepositoryError> {
        // one record per session; a repeated insert keeps the first
        self.accounting.entry(record.acct_session_id.clone()).or_insert(record);
        Ok(())
    }

    async fn update_accounting_record(
        &self,
        session_id: &str,
        counters: &AcctCounters,
        stop: Option<AcctStop>,
    ) -> Result<bool, RepositoryError> {
        let Some(mut record) = self.accounting.get_mut(session_id) else {
            return Ok(false);
        };
        record.acct_session_time = counters.session_time;
        record.acct_input_total = counters.input_octets;
        record.acct_output_total = counters.output_octets;
        record.acct_input_packets = counters.input_packets;
        record.acct_output_packets = counters.output_packets;
        record.last_update = Utc::now();
        if let Some(stop) = stop {
            record.acct_stop_time = Some(stop.at);
            record.acct_terminate_cause = stop.terminate_cause;
        }
        Ok(true)
    }

    async fn clear_online_sessions_for_nas(&self, nas_addr: &str) -> Result<u64, RepositoryError> {
        let before = self.online.len();
        self.online.retain(|_, session| session.nas_addr != nas_addr);
        Ok((before - self.online.len()) as u64)
    }

    async fn close_accounting_records_for_nas(
        &self,
        nas_addr: &str,
        stop_time: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut closed = 0;
        for mut record in self.accounting.iter_mut() {
            if record.nas_addr == nas_addr && record.acct_stop_time.is_none() {
                record.acct_stop_time = Some(stop_time);
                closed += 1;
            }
        }
        Ok(closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nas(ipaddr: &str, identifier: &str) -> Nas {
        Nas {
            id: 1,
            name: "edge".to_string(),
            ipaddr: ipaddr.to_string(),
            identifier: identifier.to_string(),
            secret: "nastest".to_string(),
            vendor_code: 0,
            status: UserStatus::Enabled,
            coa_port: 3799,
        }
    }

    fn online(session_id: &str, nas_addr: &str) -> RadiusOnline {
        RadiusOnline {
            username: "alice".to_string(),
            nas_addr: nas_addr.to_string(),
            acct_session_id: session_id.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_from_config_seeds_example() {
        let repo = MemoryRepository::from_config(&Config::example());
        let nas = repo.find_nas("10.0.0.1".parse().unwrap(), "").await.unwrap();
        assert_eq!(nas.map(|n| n.secret), Some("nastest".to_string()));
        assert_eq!(repo.user("alice").map(|u| u.password), Some("secret1".to_string()));
    }

    #[tokio::test]
    async fn test_find_nas_by_ip_then_identifier() {
        let repo = MemoryRepository::new();
        repo.add_nas(nas("10.0.0.0/24", "bras-1"));

        let by_ip = repo.find_nas("10.0.0.9".parse().unwrap(), "").await.unwrap();
        assert!(by_ip.is_some());

        let by_id = repo
            .find_nas("192.0.2.1".parse().unwrap(), "bras-1")
            .await
            .unwrap();
        assert!(by_id.is_some());

        let none = repo.find_nas("192.0.2.1".parse().unwrap(), "").await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_single_online_session_per_id() {
        let repo = MemoryRepository::new();
        repo.insert_online_session(online("s1", "10.0.0.1")).await.unwrap();
        let dup = repo.insert_online_session(online("s1", "10.0.0.1")).await;
        assert!(matches!(dup, Err(RepositoryError::DuplicateSession(_))));
        assert_eq!(repo.count_active_sessions("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_user_fields() {
        let repo = MemoryRepository::new();
        repo.add_user(RadiusUser {
            username: "alice".to_string(),
            ..Default::default()
        });

        repo.update_user_field("alice", UserField::MacAddr, "aa:bb:cc:00:11:22")
            .await
            .unwrap();
        repo.update_user_field("alice", UserField::Vlanid1, "100")
            .await
            .unwrap();
        repo.update_user_field("alice", UserField::LastOnline, "2026-01-02T03:04:05Z")
            .await
            .unwrap();
        let bad = repo.update_user_field("alice", UserField::Vlanid2, "x").await;
        assert!(matches!(bad, Err(RepositoryError::InvalidValue { .. })));

        let user = repo.user("alice").unwrap();
        assert_eq!(user.vlanid1, 100);
        assert!(user.last_online.is_some());
        let found = repo.find_user_by_mac("AA:BB:CC:00:11:22").await.unwrap();
        assert_eq!(found.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_nas_bulk_cleanup() {
        let repo = MemoryRepository::new();
        repo.insert_online_session(online("s1", "10.0.0.1")).await.unwrap();
        repo.insert_online_session(online("s2", "10.0.0.2")).await.unwrap();
        repo.insert_accounting_record(RadiusAccounting::from_online(&online("s1", "10.0.0.1")))
            .await
            .unwrap();

        assert_eq!(repo.clear_online_sessions_for_nas("10.0.0.1").await.unwrap(), 1);
        assert_eq!(repo.online_count(), 1);

        let now = Utc::now();
        assert_eq!(
            repo.close_accounting_records_for_nas("10.0.0.1", now).await.unwrap(),
            1
        );
        assert_eq!(repo.accounting_record("s1").unwrap().acct_stop_time, Some(now));
        assert_eq!(
            repo.close_accounting_records_for_nas("10.0.0.1", now).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_accounting_record_stop_keeps_terminate_cause() {
        let repo = MemoryRepository::new();
        let mut first = RadiusAccounting::from_online(&online("s1", "10.0.0.1"));
        first.acct_input_total = 5000;
        repo.insert_accounting_record(first).await.unwrap();
        repo.insert_accounting_record(RadiusAccounting::from_online(&online("s1", "10.0.0.1")))
            .await
            .unwrap();
        assert_eq!(repo.accounting_record("s1").unwrap().acct_input_total, 5000);

        let stop = AcctStop {
            at: Utc::now(),
            terminate_cause: 1,
        };
        let counters = AcctCounters {
            input_octets: 6000,
            ..Default::default()
        };
        assert!(repo.update_accounting_record("s1", &counters, Some(stop)).await.unwrap());
        assert!(!repo.update_accounting_record("s9", &counters, Some(stop)).await.unwrap());

        let record = repo.accounting_record("s1").unwrap();
        assert_eq!(record.acct_input_total, 6000);
        assert_eq!(record.acct_stop_time, Some(stop.at));
        assert_eq!(record.acct_terminate_cause, 1);
    }
}
