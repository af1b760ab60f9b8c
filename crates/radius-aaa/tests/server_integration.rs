//! End-to-end tests over UDP
//!
//! Each test binds a server on ephemeral loopback ports with a seeded
//! in-memory repository and talks to it like a NAS would.

use radius_aaa::{
    Config, MemoryRepository, NasConfig, RadiusServer, UdpDisconnectNotifier, UserConfig,
    UserStatus,
};
use radius_proto::eap::{EapPacket, add_eap_to_radius_packet, eap_from_radius_packet, eap_md5};
use radius_proto::message_auth::find_message_authenticator;
use radius_proto::{
    AcctStatusType, Attribute, AttributeType, Code, EapCode, Packet,
    calculate_message_authenticator, encode_signed_request, encrypt_user_password,
    generate_request_authenticator, verify_response_authenticator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::net::UdpSocket;
use tokio::time::timeout;

const SECRET: &[u8] = b"nastest";

fn test_config() -> Config {
    Config {
        listen_address: "127.0.0.1".to_string(),
        auth_port: 0,
        acct_port: 0,
        auth_rate_interval_ms: 0,
        nas: vec![NasConfig {
            address: "127.0.0.1".to_string(),
            secret: "nastest".to_string(),
            identifier: "bras-test".to_string(),
            name: Some("loopback".to_string()),
            vendor_code: 14988,
            enabled: true,
            coa_port: 3799,
        }],
        users: vec![
            UserConfig {
                username: "alice".to_string(),
                password: "secret1".to_string(),
                up_rate: 1024,
                down_rate: 2048,
                ..Default::default()
            },
            UserConfig {
                username: "carol".to_string(),
                password: "secret3".to_string(),
                status: UserStatus::Disabled,
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

async fn start_server(config: &Config) -> (Arc<RadiusServer>, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::from_config(config));
    let notifier = Arc::new(UdpDisconnectNotifier::new(Duration::from_millis(200)));
    let server = RadiusServer::with_repository(config, repo.clone(), notifier)
        .await
        .expect("server should bind");
    let server = Arc::new(server);
    tokio::spawn(Arc::clone(&server).run());
    (server, repo)
}

fn pap_request(username: &str, password: &str, identifier: u8) -> Packet {
    let req_auth = generate_request_authenticator();
    let mut packet = Packet::new(Code::AccessRequest, identifier, req_auth);
    packet.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), username).unwrap());
    let hidden = encrypt_user_password(password, SECRET, &req_auth);
    packet.add_attribute(Attribute::new(AttributeType::UserPassword.as_u8(), hidden).unwrap());
    packet
}

fn sign(packet: &mut Packet) -> Vec<u8> {
    packet.set_attribute(
        Attribute::new(AttributeType::MessageAuthenticator.as_u8(), vec![0u8; 16]).unwrap(),
    );
    let mut bytes = packet.encode().unwrap();
    let offset = find_message_authenticator(&bytes).unwrap();
    let mac = calculate_message_authenticator(&bytes, SECRET);
    bytes[offset..offset + 16].copy_from_slice(&mac);
    bytes
}

async fn exchange(bytes: &[u8], server_addr: SocketAddr) -> Option<Packet> {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    socket.send_to(bytes, server_addr).await.unwrap();

    let mut buf = vec![0u8; 4096];
    match timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await {
        Ok(Ok((len, _))) => Some(Packet::decode(&buf[..len]).unwrap()),
        _ => None,
    }
}

fn accounting_request(status: AcctStatusType, session_id: &str) -> Packet {
    let mut packet = Packet::new(Code::AccountingRequest, 9, [0u8; 16]);
    packet.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap());
    packet.add_attribute(
        Attribute::integer(AttributeType::AcctStatusType.as_u8(), status.as_u32()).unwrap(),
    );
    packet.add_attribute(
        Attribute::string(AttributeType::AcctSessionId.as_u8(), session_id).unwrap(),
    );
    packet.add_attribute(
        Attribute::ipv4(AttributeType::NasIpAddress.as_u8(), [127, 0, 0, 1]).unwrap(),
    );
    packet.add_attribute(Attribute::integer(AttributeType::AcctSessionTime.as_u8(), 30).unwrap());
    packet
}

#[tokio::test]
async fn test_pap_accept_and_reject_over_udp() {
    let config = test_config();
    let (server, _) = start_server(&config).await;
    let addr = server.auth_addr().unwrap();

    let request = pap_request("alice", "secret1", 1);
    let reply = exchange(&request.encode().unwrap(), addr).await.expect("accept");
    assert_eq!(reply.code, Code::AccessAccept);
    assert_eq!(reply.identifier, 1);
    assert!(verify_response_authenticator(&reply, &request.authenticator, SECRET));

    let request = pap_request("alice", "wrong", 2);
    let reply = exchange(&request.encode().unwrap(), addr).await.expect("reject");
    assert_eq!(reply.code, Code::AccessReject);
    assert_eq!(
        reply.get_string(AttributeType::ReplyMessage).as_deref(),
        Some("password mismatch")
    );

    let request = pap_request("carol", "secret3", 3);
    let reply = exchange(&request.encode().unwrap(), addr).await.expect("reject");
    assert_eq!(reply.code, Code::AccessReject);

    assert_eq!(server.metrics().accepts(), 1);
}

#[tokio::test]
async fn test_unknown_nas_gets_no_reply() {
    let mut config = test_config();
    config.nas[0].address = "10.9.9.9".to_string();
    let (server, _) = start_server(&config).await;

    let request = pap_request("alice", "secret1", 1);
    let reply = exchange(&request.encode().unwrap(), server.auth_addr().unwrap()).await;
    assert!(reply.is_none());
}

#[tokio::test]
async fn test_unknown_nas_rejected_under_fallback_secret() {
    let mut config = test_config();
    config.nas[0].address = "10.9.9.9".to_string();
    config.unknown_nas_secret = Some("fallback".to_string());
    let (server, _) = start_server(&config).await;

    let request = pap_request("alice", "secret1", 5);
    let reply = exchange(&request.encode().unwrap(), server.auth_addr().unwrap())
        .await
        .expect("reject");
    assert_eq!(reply.code, Code::AccessReject);
    assert!(verify_response_authenticator(&reply, &request.authenticator, b"fallback"));
    assert_eq!(server.metrics().accepts(), 0);
}

#[tokio::test]
async fn test_eap_md5_over_udp() {
    let config = test_config();
    let (server, _) = start_server(&config).await;
    let addr = server.auth_addr().unwrap();

    let mut first = Packet::new(Code::AccessRequest, 10, generate_request_authenticator());
    first.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap());
    add_eap_to_radius_packet(&mut first, &EapPacket::identity_response(1, "alice")).unwrap();
    let challenge = exchange(&sign(&mut first), addr).await.expect("challenge");
    assert_eq!(challenge.code, Code::AccessChallenge);

    let eap = eap_from_radius_packet(&challenge).unwrap().unwrap();
    let size = eap.data[0] as usize;
    let hash = eap_md5::compute_response_hash(eap.identifier, "secret1", &eap.data[1..1 + size]);
    let state = challenge.find_attribute(AttributeType::State.as_u8()).unwrap().clone();

    let mut second = Packet::new(Code::AccessRequest, 11, generate_request_authenticator());
    second.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap());
    let response = eap_md5::create_response(eap.identifier, &hash, "alice");
    add_eap_to_radius_packet(&mut second, &response).unwrap();
    second.add_attribute(state);
    let accept = exchange(&sign(&mut second), addr).await.expect("accept");

    assert_eq!(accept.code, Code::AccessAccept);
    let success = eap_from_radius_packet(&accept).unwrap().unwrap();
    assert_eq!(success.code, EapCode::Success);
}

#[tokio::test]
async fn test_accounting_start_stop_over_udp() {
    let config = test_config();
    let (server, repo) = start_server(&config).await;
    let addr = server.acct_addr().unwrap();

    let mut start = accounting_request(AcctStatusType::Start, "sess-1");
    let reply = exchange(&encode_signed_request(&mut start, SECRET).unwrap(), addr).await;
    assert_eq!(reply.expect("response").code, Code::AccountingResponse);
    assert_eq!(repo.online_count(), 1);

    let mut stop = accounting_request(AcctStatusType::Stop, "sess-1");
    let reply = exchange(&encode_signed_request(&mut stop, SECRET).unwrap(), addr).await;
    assert_eq!(reply.expect("response").code, Code::AccountingResponse);
    assert_eq!(repo.online_count(), 0);

    let record = repo.accounting_record("sess-1").unwrap();
    assert!(record.acct_stop_time.is_some());
}

#[tokio::test]
async fn test_accounting_with_wrong_secret_is_dropped() {
    let config = test_config();
    let (server, repo) = start_server(&config).await;

    let mut start = accounting_request(AcctStatusType::Start, "sess-2");
    let bytes = encode_signed_request(&mut start, b"not-the-secret").unwrap();
    assert!(exchange(&bytes, server.acct_addr().unwrap()).await.is_none());
    assert_eq!(repo.online_count(), 0);
}

#[tokio::test]
async fn test_audit_log_records_decisions() {
    let audit = NamedTempFile::new().unwrap();
    let mut config = test_config();
    config.audit_log_path = Some(audit.path().to_string_lossy().into_owned());
    let (server, _) = start_server(&config).await;

    let request = pap_request("alice", "wrong", 4);
    exchange(&request.encode().unwrap(), server.auth_addr().unwrap())
        .await
        .expect("reject");

    let contents = std::fs::read_to_string(audit.path()).unwrap();
    assert!(contents.contains("\"server_start\""));
    assert!(contents.contains("\"auth_reject\""));
    assert!(contents.contains("\"password-mismatch\""));
}
