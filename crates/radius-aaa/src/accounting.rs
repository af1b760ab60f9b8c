//! Accounting engine (RFC 2866)
//!
//! Keeps the online-session table and accounting history in step with the
//! NAS. Repository failures are logged and never surface to the NAS: every
//! Accounting-Request with a valid authenticator gets an Accounting-Response.

use crate::audit::{AuditEntry, AuditEventType, AuditLogger};
use crate::disconnect::{DisconnectNotifier, DisconnectTarget};
use crate::metrics::Metrics;
use crate::models::{AcctStop, Nas, RadiusAccounting, RadiusOnline, normalize_mac};
use crate::repository::{RepositoryError, SessionRepository, with_timeout};
use chrono::{DateTime, Utc};
use radius_proto::auth::{encode_response, verify_accounting_request_authenticator};
use radius_proto::{AcctCounters, AcctStatusType, AttributeType, Code, Packet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct AccountingEngine {
    repo: Arc<dyn SessionRepository>,
    notifier: Arc<dyn DisconnectNotifier>,
    metrics: Arc<Metrics>,
    audit: Arc<AuditLogger>,
    timeout: Duration,
}

/// Online session described by an Accounting-Request.
///
/// The NAS address is NAS-IP-Address when present, the datagram source
/// otherwise.
pub fn online_from_request(request: &Packet, source: IpAddr, now: DateTime<Utc>) -> RadiusOnline {
    let string = |t: AttributeType| request.get_string(t).unwrap_or_default();
    let ip = |t: AttributeType| {
        request
            .get_ipv4(t)
            .map(|addr| addr.to_string())
            .unwrap_or_default()
    };
    let counters = AcctCounters::from_packet(request);

    let nas_addr = request
        .get_ipv4(AttributeType::NasIpAddress)
        .map(IpAddr::V4)
        .unwrap_or(source);
    let calling = string(AttributeType::CallingStationId);
    let session_time = i64::from(counters.session_time);

    RadiusOnline {
        id: 0,
        username: string(AttributeType::UserName),
        nas_id: string(AttributeType::NasIdentifier),
        nas_addr: nas_addr.to_string(),
        nas_paddr: source.to_string(),
        session_timeout: request.get_integer(AttributeType::SessionTimeout).unwrap_or(0),
        framed_ipaddr: ip(AttributeType::FramedIpAddress),
        framed_netmask: ip(AttributeType::FramedIpNetmask),
        mac_addr: normalize_mac(&calling).unwrap_or(calling),
        nas_port: request.get_integer(AttributeType::NasPort).unwrap_or(0),
        nas_port_id: string(AttributeType::NasPortId),
        acct_session_id: string(AttributeType::AcctSessionId),
        acct_session_time: counters.session_time,
        acct_input_total: counters.input_octets,
        acct_output_total: counters.output_octets,
        acct_input_packets: counters.input_packets,
        acct_output_packets: counters.output_packets,
        acct_start_time: now - chrono::Duration::seconds(session_time),
        last_update: now,
    }
}

impl AccountingEngine {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        notifier: Arc<dyn DisconnectNotifier>,
        metrics: Arc<Metrics>,
        audit: Arc<AuditLogger>,
        timeout: Duration,
    ) -> Self {
        AccountingEngine {
            repo,
            notifier,
            metrics,
            audit,
            timeout,
        }
    }

    /// Process one datagram. `None` means the packet is dropped without an
    /// answer: undecodable, unknown NAS, or a bad Request Authenticator.
    pub async fn handle(&self, data: &[u8], source: IpAddr) -> Option<Vec<u8>> {
        let request = match Packet::decode(data) {
            Ok(packet) if packet.code == Code::AccountingRequest => packet,
            Ok(packet) => {
                debug!(client_ip = %source, code = ?packet.code, "Ignoring non-accounting packet");
                self.metrics.drop_packet();
                return None;
            }
            Err(e) => {
                debug!(client_ip = %source, error = %e, "Dropping malformed accounting packet");
                self.metrics.drop_packet();
                return None;
            }
        };

        let identifier = request.get_string(AttributeType::NasIdentifier).unwrap_or_default();
        let nas = match with_timeout(self.timeout, self.repo.find_nas(source, &identifier)).await {
            Ok(Some(nas)) => nas,
            Ok(None) => {
                warn!(client_ip = %source, "Accounting-Request from unknown NAS");
                self.metrics.drop_packet();
                return None;
            }
            Err(e) => {
                error!(client_ip = %source, error = %e, "NAS lookup failed");
                self.metrics.drop_packet();
                return None;
            }
        };

        if !verify_accounting_request_authenticator(data, nas.secret.as_bytes()) {
            warn!(
                client_ip = %source,
                request_id = request.identifier,
                "Accounting-Request authenticator mismatch"
            );
            self.metrics.drop_packet();
            return None;
        }

        self.account(&request, &nas, source).await;

        let mut response = Packet::new(Code::AccountingResponse, request.identifier, [0u8; 16]);
        match encode_response(&mut response, &request.authenticator, nas.secret.as_bytes()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                error!(error = %e, "Failed to encode Accounting-Response");
                None
            }
        }
    }

    /// Apply one Accounting-Request to the repository
    pub async fn account(&self, request: &Packet, nas: &Nas, source: IpAddr) {
        let Some(status) = request
            .get_integer(AttributeType::AcctStatusType)
            .and_then(AcctStatusType::from_u32)
        else {
            warn!(client_ip = %source, "Accounting-Request without a known Acct-Status-Type");
            return;
        };
        self.metrics.acct_request(status);

        let now = Utc::now();
        let online = online_from_request(request, source, now);
        debug!(
            username = %online.username,
            session_id = %online.acct_session_id,
            status = status.as_str(),
            "Accounting request"
        );

        let result = match status {
            AcctStatusType::Start => self.start(online).await,
            AcctStatusType::InterimUpdate => self.interim(online, request, nas, now).await,
            AcctStatusType::Stop => self.stop(online, request, now).await,
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff => {
                self.nas_reset(&online.nas_addr, now).await
            }
        };

        if let Err(e) = result {
            self.metrics.acct_error();
            error!(
                client_ip = %source,
                status = status.as_str(),
                error = %e,
                "Accounting update failed"
            );
        }

        if !status.is_nas_status() {
            let username = request.get_string(AttributeType::UserName).unwrap_or_default();
            let session_id = request.get_string(AttributeType::AcctSessionId).unwrap_or_default();
            self.audit
                .log(
                    AuditEntry::new(AuditEventType::Accounting)
                        .with_username(username)
                        .with_client_ip(source)
                        .with_nas_name(nas.name.clone())
                        .with_request_id(request.identifier)
                        .with_session_id(session_id)
                        .with_details(status.as_str()),
                )
                .await;
        }
    }

    async fn start(&self, online: RadiusOnline) -> Result<(), RepositoryError> {
        let record = RadiusAccounting::from_online(&online);
        let session_id = online.acct_session_id.clone();
        let username = online.username.clone();

        match with_timeout(self.timeout, self.repo.insert_online_session(online)).await {
            Err(RepositoryError::DuplicateSession(id)) => {
                warn!(session_id = %id, "Retransmitted Start for an online session, ignoring");
                return Ok(());
            }
            other => other?,
        }
        with_timeout(self.timeout, self.repo.insert_accounting_record(record)).await?;
        info!(username = %username, session_id = %session_id, "Session started");
        Ok(())
    }

    async fn interim(
        &self,
        online: RadiusOnline,
        request: &Packet,
        nas: &Nas,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.check_subscriber(&online, request, nas, now).await;

        let counters = AcctCounters::from_packet(request);
        let session_id = online.acct_session_id.clone();
        let exists =
            with_timeout(self.timeout, self.repo.exists_online_session(&session_id)).await?;

        if !exists {
            debug!(session_id = %session_id, "Interim-Update without Start, creating session");
            let record = RadiusAccounting::from_online(&online);
            with_timeout(self.timeout, self.repo.insert_online_session(online)).await?;
            let updated = with_timeout(
                self.timeout,
                self.repo.update_accounting_record(&session_id, &counters, None),
            )
            .await?;
            if !updated {
                with_timeout(self.timeout, self.repo.insert_accounting_record(record)).await?;
            }
            return Ok(());
        }

        with_timeout(
            self.timeout,
            self.repo.update_online_session(&session_id, &counters, now),
        )
        .await?;
        with_timeout(
            self.timeout,
            self.repo.update_accounting_record(&session_id, &counters, None),
        )
        .await?;
        Ok(())
    }

    async fn stop(
        &self,
        online: RadiusOnline,
        request: &Packet,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let counters = AcctCounters::from_packet(request);
        let session_id = online.acct_session_id.clone();
        let stop = AcctStop {
            at: now,
            terminate_cause: request.get_integer(AttributeType::AcctTerminateCause).unwrap_or(0),
        };

        let updated = with_timeout(
            self.timeout,
            self.repo.update_accounting_record(&session_id, &counters, Some(stop)),
        )
        .await?;
        if !updated {
            debug!(session_id = %session_id, "Stop without accounting record, inserting one");
            let mut record = RadiusAccounting::from_online(&online);
            record.acct_stop_time = Some(stop.at);
            record.acct_terminate_cause = stop.terminate_cause;
            with_timeout(self.timeout, self.repo.insert_accounting_record(record)).await?;
        }

        with_timeout(self.timeout, self.repo.delete_online_session(&session_id)).await?;
        info!(username = %online.username, session_id = %session_id, "Session stopped");
        Ok(())
    }

    async fn nas_reset(&self, nas_addr: &str, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let cleared =
            with_timeout(self.timeout, self.repo.clear_online_sessions_for_nas(nas_addr)).await?;
        let closed = with_timeout(
            self.timeout,
            self.repo.close_accounting_records_for_nas(nas_addr, now),
        )
        .await?;
        info!(nas = nas_addr, cleared, closed, "NAS reset its sessions");
        Ok(())
    }

    /// Kick the session off the NAS when its subscriber was disabled or
    /// expired. The disconnect runs in its own task.
    async fn check_subscriber(
        &self,
        online: &RadiusOnline,
        request: &Packet,
        nas: &Nas,
        now: DateTime<Utc>,
    ) {
        let user = match with_timeout(
            self.timeout,
            self.repo.find_user_by_username(&online.username),
        )
        .await
        {
            Ok(Some(user)) => user,
            Ok(None) => return,
            Err(e) => {
                warn!(username = %online.username, error = %e, "Subscriber lookup failed");
                return;
            }
        };
        if user.is_enabled() && !user.is_expired(now) {
            return;
        }

        let nas_ip = request
            .get_ipv4(AttributeType::NasIpAddress)
            .map(IpAddr::V4)
            .or_else(|| online.nas_paddr.parse().ok());
        let Some(nas_ip) = nas_ip else {
            return;
        };

        info!(
            username = %online.username,
            session_id = %online.acct_session_id,
            "Subscriber no longer allowed online, requesting disconnect"
        );
        self.spawn_disconnect(
            nas.clone(),
            DisconnectTarget {
                username: online.username.clone(),
                acct_session_id: online.acct_session_id.clone(),
                nas_ip,
            },
        );
    }

    fn spawn_disconnect(&self, nas: Nas, target: DisconnectTarget) -> tokio::task::JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let metrics = Arc::clone(&self.metrics);
        let audit = Arc::clone(&self.audit);

        tokio::spawn(async move {
            let outcome = notifier.disconnect(&nas, &target).await;
            let details = match &outcome {
                Ok(true) => "ack".to_string(),
                Ok(false) => "nak".to_string(),
                Err(e) => {
                    warn!(username = %target.username, error = %e, "Disconnect-Request failed");
                    e.to_string()
                }
            };
            metrics.disconnect(matches!(outcome, Ok(true)));
            audit
                .log(
                    AuditEntry::new(AuditEventType::Disconnect)
                        .with_username(target.username)
                        .with_client_ip(target.nas_ip)
                        .with_nas_name(nas.name)
                        .with_session_id(target.acct_session_id)
                        .with_details(details),
                )
                .await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disconnect::DisconnectError;
    use crate::models::{RadiusUser, UserStatus};
    use crate::repository::MemoryRepository;
    use async_trait::async_trait;
    use radius_proto::Attribute;
    use radius_proto::auth::encode_signed_request;
    use tokio::sync::mpsc;

    struct RecordingNotifier {
        sent: mpsc::UnboundedSender<DisconnectTarget>,
    }

    #[async_trait]
    impl DisconnectNotifier for RecordingNotifier {
        async fn disconnect(
            &self,
            _nas: &Nas,
            target: &DisconnectTarget,
        ) -> Result<bool, DisconnectError> {
            let _ = self.sent.send(target.clone());
            Ok(true)
        }
    }

    fn nas() -> Nas {
        Nas {
            id: 1,
            name: "bras".to_string(),
            ipaddr: "127.0.0.1".to_string(),
            identifier: String::new(),
            secret: "nastest".to_string(),
            vendor_code: 0,
            status: UserStatus::Enabled,
            coa_port: 3799,
        }
    }

    fn engine() -> (
        AccountingEngine,
        Arc<MemoryRepository>,
        Arc<Metrics>,
        mpsc::UnboundedReceiver<DisconnectTarget>,
    ) {
        let repo = Arc::new(MemoryRepository::new());
        repo.add_nas(nas());
        repo.add_user(RadiusUser {
            username: "alice".to_string(),
            password: "secret1".to_string(),
            ..Default::default()
        });
        let metrics = Arc::new(Metrics::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = AccountingEngine::new(
            repo.clone(),
            Arc::new(RecordingNotifier { sent: tx }),
            metrics.clone(),
            Arc::new(AuditLogger::disabled()),
            Duration::from_secs(1),
        );
        (engine, repo, metrics, rx)
    }

    fn request(status: AcctStatusType, session_id: &str, octets: u32) -> Packet {
        let mut packet = Packet::new(Code::AccountingRequest, 7, [0u8; 16]);
        packet.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap());
        packet.add_attribute(
            Attribute::integer(AttributeType::AcctStatusType.as_u8(), status.as_u32()).unwrap(),
        );
        packet.add_attribute(
            Attribute::string(AttributeType::AcctSessionId.as_u8(), session_id).unwrap(),
        );
        packet.add_attribute(
            Attribute::integer(AttributeType::AcctInputOctets.as_u8(), octets).unwrap(),
        );
        packet.add_attribute(
            Attribute::integer(AttributeType::AcctSessionTime.as_u8(), 60).unwrap(),
        );
        packet.add_attribute(
            Attribute::string(AttributeType::CallingStationId.as_u8(), "AA-BB-CC-00-11-22")
                .unwrap(),
        );
        packet
    }

    fn source() -> IpAddr {
        "127.0.0.1".parse().unwrap()
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let (engine, repo, _, _) = engine();

        engine.account(&request(AcctStatusType::Start, "s1", 0), &nas(), source()).await;
        assert_eq!(repo.online_count(), 1);
        let online = repo.find_online_session("s1").await.unwrap().unwrap();
        assert_eq!(online.mac_addr, "aa:bb:cc:00:11:22");
        assert_eq!(online.nas_addr, "127.0.0.1");

        engine.account(&request(AcctStatusType::Stop, "s1", 900), &nas(), source()).await;
        assert_eq!(repo.online_count(), 0);
        let record = repo.accounting_record("s1").unwrap();
        assert!(record.acct_stop_time.is_some());
        assert_eq!(record.acct_input_total, 900);
    }

    #[tokio::test]
    async fn test_stop_records_terminate_cause() {
        let (engine, repo, _, _) = engine();

        engine.account(&request(AcctStatusType::Start, "s10", 0), &nas(), source()).await;
        let mut stop = request(AcctStatusType::Stop, "s10", 700);
        stop.add_attribute(
            Attribute::integer(AttributeType::AcctTerminateCause.as_u8(), 1).unwrap(),
        );
        engine.account(&stop, &nas(), source()).await;

        let record = repo.accounting_record("s10").unwrap();
        assert_eq!(record.acct_terminate_cause, 1);
        assert_eq!(record.acct_input_total, 700);
        assert!(record.acct_stop_time.is_some());
    }

    #[tokio::test]
    async fn test_retransmitted_start_keeps_session_counters() {
        let (engine, repo, metrics, _) = engine();

        engine.account(&request(AcctStatusType::Start, "s11", 0), &nas(), source()).await;
        engine
            .account(&request(AcctStatusType::InterimUpdate, "s11", 5000), &nas(), source())
            .await;
        let started = repo.accounting_record("s11").unwrap().acct_start_time;

        engine.account(&request(AcctStatusType::Start, "s11", 0), &nas(), source()).await;

        let record = repo.accounting_record("s11").unwrap();
        assert_eq!(record.acct_input_total, 5000);
        assert_eq!(record.acct_start_time, started);
        let online = repo.find_online_session("s11").await.unwrap().unwrap();
        assert_eq!(online.acct_input_total, 5000);
        assert_eq!(repo.online_count(), 1);
        assert_eq!(metrics.acct_requests(AcctStatusType::Start), 2);
    }

    #[tokio::test]
    async fn test_interim_without_start_creates_session() {
        let (engine, repo, _, _) = engine();

        engine
            .account(&request(AcctStatusType::InterimUpdate, "s2", 4096), &nas(), source())
            .await;

        let online = repo.find_online_session("s2").await.unwrap().unwrap();
        assert_eq!(online.acct_input_total, 4096);
        assert_eq!(online.acct_session_time, 60);
        assert!(repo.accounting_record("s2").is_some());
    }

    #[tokio::test]
    async fn test_interim_overwrites_counters() {
        let (engine, repo, _, _) = engine();

        engine.account(&request(AcctStatusType::Start, "s3", 0), &nas(), source()).await;
        engine
            .account(&request(AcctStatusType::InterimUpdate, "s3", 500), &nas(), source())
            .await;
        engine
            .account(&request(AcctStatusType::InterimUpdate, "s3", 300), &nas(), source())
            .await;

        let online = repo.find_online_session("s3").await.unwrap().unwrap();
        assert_eq!(online.acct_input_total, 300);
    }

    #[tokio::test]
    async fn test_stop_without_record_inserts_closed_record() {
        let (engine, repo, metrics, _) = engine();

        let mut stop = request(AcctStatusType::Stop, "s4", 77);
        stop.add_attribute(
            Attribute::integer(AttributeType::AcctTerminateCause.as_u8(), 1).unwrap(),
        );
        engine.account(&stop, &nas(), source()).await;

        let record = repo.accounting_record("s4").unwrap();
        assert!(record.acct_stop_time.is_some());
        assert_eq!(record.acct_input_total, 77);
        assert_eq!(record.acct_terminate_cause, 1);
        assert_eq!(metrics.acct_requests(AcctStatusType::Stop), 1);
    }

    #[tokio::test]
    async fn test_disabled_subscriber_is_disconnected() {
        let (engine, repo, _, mut rx) = engine();
        repo.set_user_status("alice", UserStatus::Disabled);

        engine
            .account(&request(AcctStatusType::InterimUpdate, "s5", 10), &nas(), source())
            .await;

        let target = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.acct_session_id, "s5");
        assert_eq!(target.nas_ip, source());
        // The update itself still went through
        assert!(repo.exists_online_session("s5").await.unwrap());
    }

    #[tokio::test]
    async fn test_accounting_on_clears_nas_sessions() {
        let (engine, repo, _, _) = engine();

        engine.account(&request(AcctStatusType::Start, "a", 0), &nas(), source()).await;
        engine.account(&request(AcctStatusType::Start, "b", 0), &nas(), source()).await;
        assert_eq!(repo.online_count(), 2);

        let mut on = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
        on.add_attribute(
            Attribute::integer(
                AttributeType::AcctStatusType.as_u8(),
                AcctStatusType::AccountingOn.as_u32(),
            )
            .unwrap(),
        );
        engine.account(&on, &nas(), source()).await;

        assert_eq!(repo.online_count(), 0);
        assert!(repo.accounting_record("a").unwrap().acct_stop_time.is_some());
    }

    #[tokio::test]
    async fn test_handle_verifies_authenticator() {
        let (engine, _, metrics, _) = engine();

        let mut packet = request(AcctStatusType::Start, "s6", 0);
        let bytes = encode_signed_request(&mut packet, b"nastest").unwrap();
        let reply = engine.handle(&bytes, source()).await.unwrap();
        assert_eq!(Packet::decode(&reply).unwrap().code, Code::AccountingResponse);

        let mut forged = request(AcctStatusType::Start, "s7", 0);
        let bytes = encode_signed_request(&mut forged, b"wrong").unwrap();
        assert!(engine.handle(&bytes, source()).await.is_none());
        assert_eq!(metrics.dropped(), 1);
    }

    #[tokio::test]
    async fn test_unknown_nas_is_dropped() {
        let (engine, _, _, _) = engine();
        let mut packet = request(AcctStatusType::Start, "s8", 0);
        let bytes = encode_signed_request(&mut packet, b"nastest").unwrap();
        assert!(engine.handle(&bytes, "192.0.2.9".parse().unwrap()).await.is_none());
    }
}
