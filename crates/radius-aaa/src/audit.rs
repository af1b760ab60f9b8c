//! Audit trail of authentication and accounting decisions
//!
//! One JSON object per line, so the file can be shipped to a log pipeline
//! as-is. Every reject carries its reason code.

use crate::error::RejectReason;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AuthAccept,
    AuthReject,
    AuthChallenge,
    Accounting,
    Disconnect,
    ServerStart,
    ServerStop,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// RFC 3339, UTC
    pub timestamp: String,
    pub event_type: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nas_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub server_version: String,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType) -> Self {
        AuditEntry {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            event_type,
            username: None,
            client_ip: None,
            nas_name: None,
            request_id: None,
            reason: None,
            session_id: None,
            details: None,
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_client_ip(mut self, ip: IpAddr) -> Self {
        self.client_ip = Some(ip.to_string());
        self
    }

    pub fn with_nas_name(mut self, name: impl Into<String>) -> Self {
        self.nas_name = Some(name.into());
        self
    }

    pub fn with_request_id(mut self, id: u8) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_reason(mut self, reason: RejectReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Appends entries to a file; a logger without a path discards them
#[derive(Debug, Default)]
pub struct AuditLogger {
    file_path: Option<String>,
    file: Option<Arc<Mutex<std::fs::File>>>,
}

impl AuditLogger {
    pub fn new(file_path: Option<String>) -> std::io::Result<Self> {
        let file = match file_path {
            Some(ref path) => {
                let f = OpenOptions::new().create(true).append(true).open(path)?;
                Some(Arc::new(Mutex::new(f)))
            }
            None => None,
        };

        Ok(AuditLogger { file_path, file })
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn log(&self, entry: AuditEntry) {
        let Some(ref file) = self.file else {
            return;
        };
        match serde_json::to_string(&entry) {
            Ok(json) => {
                let mut f = file.lock().await;
                if let Err(e) = writeln!(f, "{}", json) {
                    error!("Failed to write audit log: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize audit entry: {}", e),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::NamedTempFile;

    #[test]
    fn test_entry_serialization() {
        let entry = AuditEntry::new(AuditEventType::AuthReject)
            .with_username("alice")
            .with_client_ip("10.0.0.1".parse().unwrap())
            .with_reason(RejectReason::PasswordMismatch)
            .with_request_id(42);

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"event_type\":\"auth_reject\""));
        assert!(json.contains("\"reason\":\"password-mismatch\""));
        assert!(json.contains("\"client_ip\":\"10.0.0.1\""));
        assert!(!json.contains("session_id"));
        assert!(entry.timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_logger_writes_json_lines() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap().to_string();

        let logger = AuditLogger::new(Some(path.clone())).unwrap();
        assert!(logger.is_enabled());

        logger
            .log(AuditEntry::new(AuditEventType::AuthAccept).with_username("alice"))
            .await;
        logger
            .log(
                AuditEntry::new(AuditEventType::Accounting)
                    .with_username("alice")
                    .with_session_id("s1")
                    .with_details("start"),
            )
            .await;

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: AuditEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.event_type, AuditEventType::Accounting);
        assert_eq!(second.session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_logger_disabled() {
        let logger = AuditLogger::disabled();
        assert!(!logger.is_enabled());
        assert_eq!(logger.file_path(), None);
    }
}
