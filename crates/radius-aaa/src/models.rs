//! Records exchanged with the session repository

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Network access server allowed to send requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nas {
    pub id: i64,
    pub name: String,
    /// Address or CIDR range the NAS sends from
    pub ipaddr: String,
    pub identifier: String,
    pub secret: String,
    /// Selects vendor rate-limit attributes on Access-Accept
    pub vendor_code: u32,
    pub status: UserStatus,
    pub coa_port: u16,
}

impl Nas {
    /// Stand-in for a source that matched no NAS, answered with `secret`
    pub fn unknown(source: IpAddr, secret: &str) -> Self {
        Nas {
            id: 0,
            name: "unknown".to_string(),
            ipaddr: source.to_string(),
            identifier: String::new(),
            secret: secret.to_string(),
            vendor_code: 0,
            status: UserStatus::Disabled,
            coa_port: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Enabled,
    Disabled,
}

impl UserStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UserStatus::Enabled => "enabled",
            UserStatus::Disabled => "disabled",
        }
    }
}

/// Subscriber account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusUser {
    pub id: i64,
    pub username: String,
    pub password: String,
    pub status: UserStatus,
    pub expire_time: Option<DateTime<Utc>>,
    /// Concurrent session limit, 0 for unlimited
    pub active_num: u32,
    pub bind_mac: bool,
    pub bind_vlan: bool,
    pub mac_addr: String,
    pub vlanid1: u32,
    pub vlanid2: u32,
    /// Static Framed-IP-Address
    pub ip_addr: String,
    /// Framed-Pool name
    pub addr_pool: String,
    /// kbps
    pub up_rate: u32,
    /// kbps
    pub down_rate: u32,
    pub otp_secret: String,
    pub last_online: Option<DateTime<Utc>>,
}

impl RadiusUser {
    pub fn is_enabled(&self) -> bool {
        self.status == UserStatus::Enabled
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_time.is_some_and(|at| at <= now)
    }
}

/// Currently active session, one per accounting session id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusOnline {
    pub id: i64,
    pub username: String,
    pub nas_id: String,
    pub nas_addr: String,
    pub nas_paddr: String,
    pub session_timeout: u32,
    pub framed_ipaddr: String,
    pub framed_netmask: String,
    pub mac_addr: String,
    pub nas_port: u32,
    pub nas_port_id: String,
    pub acct_session_id: String,
    pub acct_session_time: u32,
    pub acct_input_total: u64,
    pub acct_output_total: u64,
    pub acct_input_packets: u32,
    pub acct_output_packets: u32,
    pub acct_start_time: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

/// Durable accounting history row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadiusAccounting {
    pub id: i64,
    pub username: String,
    pub acct_session_id: String,
    pub nas_id: String,
    pub nas_addr: String,
    pub nas_paddr: String,
    pub session_timeout: u32,
    pub framed_ipaddr: String,
    pub framed_netmask: String,
    pub mac_addr: String,
    pub nas_port: u32,
    pub nas_port_id: String,
    pub acct_session_time: u32,
    pub acct_input_total: u64,
    pub acct_output_total: u64,
    pub acct_input_packets: u32,
    pub acct_output_packets: u32,
    pub acct_start_time: Option<DateTime<Utc>>,
    pub acct_stop_time: Option<DateTime<Utc>>,
    pub acct_terminate_cause: u32,
    pub last_update: DateTime<Utc>,
}

impl RadiusAccounting {
    /// Open record mirroring an online session
    pub fn from_online(online: &RadiusOnline) -> Self {
        RadiusAccounting {
            id: 0,
            username: online.username.clone(),
            acct_session_id: online.acct_session_id.clone(),
            nas_id: online.nas_id.clone(),
            nas_addr: online.nas_addr.clone(),
            nas_paddr: online.nas_paddr.clone(),
            session_timeout: online.session_timeout,
            framed_ipaddr: online.framed_ipaddr.clone(),
            framed_netmask: online.framed_netmask.clone(),
            mac_addr: online.mac_addr.clone(),
            nas_port: online.nas_port,
            nas_port_id: online.nas_port_id.clone(),
            acct_session_time: online.acct_session_time,
            acct_input_total: online.acct_input_total,
            acct_output_total: online.acct_output_total,
            acct_input_packets: online.acct_input_packets,
            acct_output_packets: online.acct_output_packets,
            acct_start_time: Some(online.acct_start_time),
            acct_stop_time: None,
            acct_terminate_cause: 0,
            last_update: online.last_update,
        }
    }
}

/// How a session ended, written onto its accounting record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcctStop {
    pub at: DateTime<Utc>,
    /// Acct-Terminate-Cause, 0 when the NAS sent none
    pub terminate_cause: u32,
}

/// Subscriber fields the auth engine writes back after an accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserField {
    MacAddr,
    Vlanid1,
    Vlanid2,
    LastOnline,
}

impl UserField {
    pub fn column(self) -> &'static str {
        match self {
            UserField::MacAddr => "mac_addr",
            UserField::Vlanid1 => "vlanid1",
            UserField::Vlanid2 => "vlanid2",
            UserField::LastOnline => "last_online",
        }
    }
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Lowercase colon-separated form of a MAC address.
///
/// Accepts `-`, `:`, `.` separators or none; anything that is not twelve hex
/// digits returns `None`.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let lower = digits.to_ascii_lowercase();
    let pairs: Vec<&str> = (0..6).map(|i| &lower[i * 2..i * 2 + 2]).collect();
    Some(pairs.join(":"))
}

/// Outer and inner VLAN ids encoded in a NAS-Port-Id.
///
/// Understands `slot=2;subslot=0;port=1;vlanid=100;vlanid2=200;` and the
/// `eth 0/1/0:100.200` form. Missing ids are 0.
pub fn parse_vlans(nas_port_id: &str) -> (u32, u32) {
    let lower = nas_port_id.to_ascii_lowercase();

    if lower.contains("vlanid=") {
        let mut vlan1 = 0;
        let mut vlan2 = 0;
        for part in lower.split([';', ',', ' ']) {
            if let Some(v) = part.strip_prefix("vlanid=") {
                vlan1 = v.trim().parse().unwrap_or(0);
            } else if let Some(v) = part.strip_prefix("vlanid2=") {
                vlan2 = v.trim().parse().unwrap_or(0);
            }
        }
        return (vlan1, vlan2);
    }

    if let Some((_, tail)) = lower.rsplit_once(':') {
        let mut ids = tail.trim().splitn(2, '.');
        let vlan1 = ids.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        let vlan2 = ids.next().and_then(|v| v.parse().ok()).unwrap_or(0);
        return (vlan1, vlan2);
    }

    (0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(
            normalize_mac("AA-BB-CC-00-11-22").as_deref(),
            Some("aa:bb:cc:00:11:22")
        );
        assert_eq!(
            normalize_mac("aabb.cc00.1122").as_deref(),
            Some("aa:bb:cc:00:11:22")
        );
        assert_eq!(normalize_mac("alice"), None);
        assert_eq!(normalize_mac(""), None);
    }

    #[test]
    fn test_parse_vlans() {
        assert_eq!(
            parse_vlans("slot=2;subslot=0;port=1;vlanid=100;vlanid2=200;"),
            (100, 200)
        );
        assert_eq!(parse_vlans("slot=2;vlanid=42;"), (42, 0));
        assert_eq!(parse_vlans("eth 0/1/0:100.200"), (100, 200));
        assert_eq!(parse_vlans("eth 0/1/0:300"), (300, 0));
        assert_eq!(parse_vlans("3/0/1"), (0, 0));
    }

    #[test]
    fn test_user_expiry() {
        let now = Utc::now();
        let mut user = RadiusUser::default();
        assert!(!user.is_expired(now));

        user.expire_time = Some(now - Duration::seconds(1));
        assert!(user.is_expired(now));

        user.expire_time = Some(now + Duration::days(1));
        assert!(!user.is_expired(now));
    }
}
