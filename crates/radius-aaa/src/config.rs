use crate::eap::{Md5Handler, MsChapV2Handler, OtpHandler};
use crate::models::{Nas, RadiusUser, UserStatus};
use crate::ratelimit::RateLimitConfig;
use crate::state::StateConfig;
use chrono::{DateTime, Utc};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Access device allowed to talk to the server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NasConfig {
    /// Source IP address or network (supports CIDR notation)
    pub address: String,
    /// Shared secret for this NAS
    pub secret: String,
    /// NAS-Identifier, used when the source address does not match
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub name: Option<String>,
    /// 0 standard, 9 Cisco, 2011 Huawei, 3902 ZTE, 14988 Mikrotik, 25506 H3C
    #[serde(default)]
    pub vendor_code: u32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Port for Disconnect-Requests (RFC 5176)
    #[serde(default = "default_coa_port")]
    pub coa_port: u16,
}

fn default_enabled() -> bool {
    true
}

fn default_coa_port() -> u16 {
    3799
}

impl NasConfig {
    /// Parse the NAS address as an IP network
    pub fn parse_network(&self) -> Result<IpNetwork, ConfigError> {
        if let Ok(network) = self.address.parse::<IpNetwork>() {
            return Ok(network);
        }
        if let Ok(ip) = self.address.parse::<IpAddr>() {
            return Ok(IpNetwork::from(ip));
        }

        Err(ConfigError::Invalid(format!(
            "Invalid NAS address: {}",
            self.address
        )))
    }

    /// Check if a source IP address matches this NAS
    pub fn matches(&self, source_ip: IpAddr) -> Result<bool, ConfigError> {
        let network = self.parse_network()?;
        Ok(network.contains(source_ip))
    }

    pub fn to_nas(&self, id: i64) -> Nas {
        Nas {
            id,
            name: self.name.clone().unwrap_or_default(),
            ipaddr: self.address.clone(),
            identifier: self.identifier.clone(),
            secret: self.secret.clone(),
            vendor_code: self.vendor_code,
            status: if self.enabled {
                UserStatus::Enabled
            } else {
                UserStatus::Disabled
            },
            coa_port: self.coa_port,
        }
    }
}

/// Subscriber defined inline in the configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    pub status: UserStatus,
    pub expire_time: Option<DateTime<Utc>>,
    pub active_num: u32,
    pub bind_mac: bool,
    pub bind_vlan: bool,
    pub mac_addr: String,
    pub vlanid1: u32,
    pub vlanid2: u32,
    pub ip_addr: String,
    pub addr_pool: String,
    pub up_rate: u32,
    pub down_rate: u32,
    pub otp_secret: String,
}

impl UserConfig {
    pub fn to_user(&self, id: i64) -> RadiusUser {
        RadiusUser {
            id,
            username: self.username.clone(),
            password: self.password.clone(),
            status: self.status,
            expire_time: self.expire_time,
            active_num: self.active_num,
            bind_mac: self.bind_mac,
            bind_vlan: self.bind_vlan,
            mac_addr: self.mac_addr.clone(),
            vlanid1: self.vlanid1,
            vlanid2: self.vlanid2,
            ip_addr: self.ip_addr.clone(),
            addr_pool: self.addr_pool.clone(),
            up_rate: self.up_rate,
            down_rate: self.down_rate,
            otp_secret: self.otp_secret.clone(),
            last_online: None,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_auth_port")]
    pub auth_port: u16,

    #[serde(default = "default_acct_port")]
    pub acct_port: u16,

    /// EAP method offered on EAP-Identity: "eap-md5", "eap-mschapv2" or
    /// "eap-otp". Unknown names fall back to eap-md5.
    #[serde(default = "default_eap_method")]
    pub eap_method: String,

    /// Name sent in EAP-MD5 and EAP-MSCHAPv2 challenges
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Minimum time between two attempts for one username
    #[serde(default = "default_auth_rate_interval_ms")]
    pub auth_rate_interval_ms: u64,

    /// Rejects tolerated within the lockout window
    #[serde(default = "default_reject_max")]
    pub reject_max: u32,

    #[serde(default = "default_reject_cache_capacity")]
    pub reject_cache_capacity: usize,

    /// Packets processed concurrently per socket
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// EAP state storage
    #[serde(default)]
    pub state: StateConfig,

    /// Acct-Interim-Interval sent on Access-Accept, seconds
    #[serde(default = "default_acct_interim_interval")]
    pub acct_interim_interval: u32,

    /// Upper bound for Session-Timeout, seconds
    #[serde(default = "default_max_session_timeout")]
    pub max_session_timeout: u32,

    #[serde(default = "default_repository_timeout_ms")]
    pub repository_timeout_ms: u64,

    #[serde(default = "default_disconnect_timeout_ms")]
    pub disconnect_timeout_ms: u64,

    /// Log level: "trace", "debug", "info", "warn", "error" (default: "info")
    #[serde(default)]
    pub log_level: Option<String>,

    /// Audit log file path (JSON lines, optional)
    #[serde(default)]
    pub audit_log_path: Option<String>,

    /// Secret for answering sources that match no NAS with an
    /// `unauthorized-device` reject. Without it those requests are dropped.
    #[serde(default)]
    pub unknown_nas_secret: Option<String>,

    /// PostgreSQL URL; without it NAS and users come from this file
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub nas: Vec<NasConfig>,

    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_auth_port() -> u16 {
    1812
}

fn default_acct_port() -> u16 {
    1813
}

fn default_eap_method() -> String {
    Md5Handler::NAME.to_string()
}

fn default_server_name() -> String {
    "radius-aaa".to_string()
}

fn default_auth_rate_interval_ms() -> u64 {
    1000
}

fn default_reject_max() -> u32 {
    7
}

fn default_reject_cache_capacity() -> usize {
    65536
}

fn default_max_workers() -> usize {
    256
}

fn default_acct_interim_interval() -> u32 {
    300
}

fn default_max_session_timeout() -> u32 {
    86400
}

fn default_repository_timeout_ms() -> u64 {
    5000
}

fn default_disconnect_timeout_ms() -> u64 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen_address: default_listen_address(),
            auth_port: default_auth_port(),
            acct_port: default_acct_port(),
            eap_method: default_eap_method(),
            server_name: default_server_name(),
            auth_rate_interval_ms: default_auth_rate_interval_ms(),
            reject_max: default_reject_max(),
            reject_cache_capacity: default_reject_cache_capacity(),
            max_workers: default_max_workers(),
            state: StateConfig::default(),
            acct_interim_interval: default_acct_interim_interval(),
            max_session_timeout: default_max_session_timeout(),
            repository_timeout_ms: default_repository_timeout_ms(),
            disconnect_timeout_ms: default_disconnect_timeout_ms(),
            log_level: None,
            audit_log_path: None,
            unknown_nas_secret: None,
            database_url: None,
            nas: vec![],
            users: vec![],
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn listen_ip(&self) -> Result<IpAddr, ConfigError> {
        self.listen_address.parse().map_err(|_| {
            ConfigError::Invalid(format!("Invalid listen address: {}", self.listen_address))
        })
    }

    pub fn auth_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.listen_ip()?, self.auth_port))
    }

    pub fn acct_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.listen_ip()?, self.acct_port))
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            auth_interval: Duration::from_millis(self.auth_rate_interval_ms),
            reject_max: self.reject_max,
            reject_capacity: self.reject_cache_capacity,
        }
    }

    pub fn repository_timeout(&self) -> Duration {
        Duration::from_millis(self.repository_timeout_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    /// Whether `eap_method` names a built-in handler
    pub fn is_known_eap_method(&self) -> bool {
        [Md5Handler::NAME, MsChapV2Handler::NAME, OtpHandler::NAME]
            .contains(&self.eap_method.as_str())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_ip()?;

        // 0 lets the OS pick a port for that listener
        if self.auth_port != 0 && self.auth_port == self.acct_port {
            return Err(ConfigError::Invalid(
                "auth_port and acct_port must differ".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers cannot be 0".to_string()));
        }
        if self.unknown_nas_secret.as_deref() == Some("") {
            return Err(ConfigError::Invalid("unknown_nas_secret cannot be empty".to_string()));
        }
        if self.state.ttl_secs == 0 {
            return Err(ConfigError::Invalid("state.ttl_secs cannot be 0".to_string()));
        }

        for nas in &self.nas {
            if nas.secret.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "NAS {} has empty secret",
                    nas.address
                )));
            }
            nas.parse_network()?;
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                return Err(ConfigError::Invalid("User has empty username".to_string()));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate user {}",
                    user.username
                )));
            }
        }

        Ok(())
    }

    /// Create an example configuration file
    pub fn example() -> Self {
        Config {
            log_level: Some("info".to_string()),
            audit_log_path: Some("/var/log/radius/audit.log".to_string()),
            nas: vec![
                NasConfig {
                    address: "10.0.0.1".to_string(),
                    secret: "nastest".to_string(),
                    identifier: "bras-1".to_string(),
                    name: Some("Core BRAS".to_string()),
                    vendor_code: 14988,
                    enabled: true,
                    coa_port: 3799,
                },
                NasConfig {
                    address: "192.168.1.0/24".to_string(),
                    secret: "wifi_secret".to_string(),
                    identifier: String::new(),
                    name: Some("Wireless controllers".to_string()),
                    vendor_code: 0,
                    enabled: true,
                    coa_port: 3799,
                },
            ],
            users: vec![
                UserConfig {
                    username: "alice".to_string(),
                    password: "secret1".to_string(),
                    up_rate: 10240,
                    down_rate: 20480,
                    ..Default::default()
                },
                UserConfig {
                    username: "bob".to_string(),
                    password: "secret2".to_string(),
                    active_num: 1,
                    bind_mac: true,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn nas(address: &str) -> NasConfig {
        NasConfig {
            address: address.to_string(),
            secret: "secret".to_string(),
            identifier: String::new(),
            name: Some("Test".to_string()),
            vendor_code: 0,
            enabled: true,
            coa_port: 3799,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth_port, 1812);
        assert_eq!(config.acct_port, 1813);
        assert_eq!(config.eap_method, "eap-md5");
        assert_eq!(config.max_workers, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_json_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"nas": [{"address": "10.0.0.1", "secret": "nastest"}],
                "users": [{"username": "alice", "password": "secret1"}]}"#,
        )
        .unwrap();

        assert_eq!(config.nas[0].coa_port, 3799);
        assert!(config.nas[0].enabled);
        assert_eq!(config.users[0].status, UserStatus::Enabled);
        assert_eq!(config.rate_limit().auth_interval, Duration::from_secs(1));
        assert_eq!(config.repository_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.auth_port = 1813;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.nas = vec![NasConfig {
            secret: String::new(),
            ..nas("10.0.0.1")
        }];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.users = vec![
            UserConfig {
                username: "alice".into(),
                ..Default::default()
            },
            UserConfig {
                username: "alice".into(),
                ..Default::default()
            },
        ];
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.unknown_nas_secret = Some(String::new());
        assert!(config.validate().is_err());
        config.unknown_nas_secret = Some("fallback".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nas_parse_network() {
        let single = nas("192.168.1.1").parse_network().unwrap();
        assert!(single.contains("192.168.1.1".parse().unwrap()));
        assert!(!single.contains("192.168.1.2".parse().unwrap()));

        let cidr = nas("10.0.0.0/8");
        assert!(cidr.matches("10.255.255.255".parse().unwrap()).unwrap());
        assert!(!cidr.matches("11.0.0.1".parse().unwrap()).unwrap());

        assert!(nas("invalid").parse_network().is_err());
    }

    #[test]
    fn test_nas_to_model() {
        let mut cfg = nas("10.0.0.1");
        cfg.enabled = false;
        cfg.vendor_code = 2011;
        let model = cfg.to_nas(3);
        assert_eq!(model.id, 3);
        assert_eq!(model.status, UserStatus::Disabled);
        assert_eq!(model.vendor_code, 2011);
    }

    #[test]
    fn test_known_eap_methods() {
        let mut config = Config::default();
        assert!(config.is_known_eap_method());
        config.eap_method = "eap-ttls".to_string();
        assert!(!config.is_known_eap_method());
    }

    #[test]
    fn test_file_round_trip() {
        let example = Config::example();
        let file = NamedTempFile::new().unwrap();
        example.to_file(file.path()).unwrap();

        let loaded = Config::from_file(file.path()).unwrap();
        assert_eq!(loaded.nas.len(), 2);
        assert_eq!(loaded.users[0].username, "alice");
    }

    #[test]
    fn test_from_file_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"listen_address": "not-an-ip"}}"#).unwrap();
        assert!(matches!(
            Config::from_file(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }
}
