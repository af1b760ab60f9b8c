//! Disconnect-Request client (RFC 5176)
//!
//! Used by the accounting engine to kick sessions of subscribers that were
//! disabled or expired while online. Callers spawn it; it never sits on the
//! accounting response path.

use crate::models::Nas;
use async_trait::async_trait;
use radius_proto::auth::{encode_signed_request, verify_response_authenticator};
use radius_proto::{Attribute, AttributeType, Code, Packet, PacketError};
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum DisconnectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("No reply from {0} within {1:?}")]
    Timeout(SocketAddr, Duration),
    #[error("Invalid reply from {0}: {1}")]
    InvalidResponse(SocketAddr, String),
}

/// Session to terminate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectTarget {
    pub username: String,
    pub acct_session_id: String,
    /// Address the NAS listens on for dynamic authorization
    pub nas_ip: IpAddr,
}

#[async_trait]
pub trait DisconnectNotifier: Send + Sync {
    /// `Ok(true)` on Disconnect-ACK, `Ok(false)` on Disconnect-NAK
    async fn disconnect(&self, nas: &Nas, target: &DisconnectTarget)
    -> Result<bool, DisconnectError>;
}

/// Sends one Disconnect-Request over UDP and waits for the answer
#[derive(Debug, Clone)]
pub struct UdpDisconnectNotifier {
    timeout: Duration,
}

impl UdpDisconnectNotifier {
    pub fn new(timeout: Duration) -> Self {
        UdpDisconnectNotifier { timeout }
    }
}

/// Signed Disconnect-Request for `target`
pub fn build_disconnect_request(
    target: &DisconnectTarget,
    identifier: u8,
    secret: &[u8],
) -> Result<(Packet, Vec<u8>), PacketError> {
    let mut request = Packet::new(Code::DisconnectRequest, identifier, [0u8; 16]);
    request.add_attribute(Attribute::string(
        AttributeType::UserName.as_u8(),
        target.username.as_str(),
    )?);
    request.add_attribute(Attribute::string(
        AttributeType::AcctSessionId.as_u8(),
        target.acct_session_id.as_str(),
    )?);
    request.add_attribute(Attribute::new(
        AttributeType::MessageAuthenticator.as_u8(),
        vec![0u8; 16],
    )?);

    let bytes = encode_signed_request(&mut request, secret)?;
    Ok((request, bytes))
}

#[async_trait]
impl DisconnectNotifier for UdpDisconnectNotifier {
    async fn disconnect(
        &self,
        nas: &Nas,
        target: &DisconnectTarget,
    ) -> Result<bool, DisconnectError> {
        let dest = SocketAddr::new(target.nas_ip, nas.coa_port);
        let bind: IpAddr = if dest.is_ipv4() {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        let socket = UdpSocket::bind(SocketAddr::new(bind, 0)).await?;

        let identifier: u8 = rand::rng().random();
        let (request, bytes) =
            build_disconnect_request(target, identifier, nas.secret.as_bytes())?;
        socket.send_to(&bytes, dest).await?;
        debug!(nas = %dest, username = %target.username, "Sent Disconnect-Request");

        let mut buf = [0u8; 4096];
        let (len, _) = tokio::time::timeout(self.timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| DisconnectError::Timeout(dest, self.timeout))??;

        let reply = Packet::decode(&buf[..len])?;
        if reply.identifier != identifier {
            return Err(DisconnectError::InvalidResponse(
                dest,
                format!("identifier {} does not match {}", reply.identifier, identifier),
            ));
        }
        if !verify_response_authenticator(&reply, &request.authenticator, nas.secret.as_bytes()) {
            return Err(DisconnectError::InvalidResponse(
                dest,
                "bad response authenticator".to_string(),
            ));
        }

        match reply.code {
            Code::DisconnectAck => {
                info!(nas = %dest, username = %target.username, "Session disconnected");
                Ok(true)
            }
            Code::DisconnectNak => {
                warn!(nas = %dest, username = %target.username, "Disconnect-Request refused");
                Ok(false)
            }
            other => Err(DisconnectError::InvalidResponse(
                dest,
                format!("unexpected code {:?}", other),
            )),
        }
    }
}
