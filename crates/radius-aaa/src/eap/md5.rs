//! EAP-MD5-Challenge (RFC 3748 Section 5.4)

use super::{
    EapChallenge, EapContext, EapMethodHandler, EapVerification, malformed, random_challenge,
};
use crate::error::{AuthError, RejectReason};
use crate::state::EapState;
use async_trait::async_trait;
use radius_proto::eap::{EapType, eap_md5};

#[derive(Debug, Clone, Default)]
pub struct Md5Handler {
    server_name: String,
}

impl Md5Handler {
    pub const NAME: &'static str = "eap-md5";

    pub fn new(server_name: impl Into<String>) -> Self {
        Md5Handler {
            server_name: server_name.into(),
        }
    }
}

#[async_trait]
impl EapMethodHandler for Md5Handler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn eap_type(&self) -> EapType {
        EapType::Md5Challenge
    }

    async fn handle_identity(&self, ctx: &EapContext<'_>) -> Result<EapChallenge, AuthError> {
        let challenge = random_challenge();
        let packet =
            eap_md5::create_challenge(ctx.next_identifier(), &challenge, &self.server_name);

        let mut state = EapState::new(ctx.username, Self::NAME);
        state.challenge = challenge.to_vec();
        Ok(EapChallenge { packet, state })
    }

    async fn handle_response(
        &self,
        ctx: &EapContext<'_>,
        state: &EapState,
    ) -> Result<EapVerification, AuthError> {
        let user = ctx.require_user()?;
        let received = eap_md5::parse_response(ctx.eap).map_err(malformed)?;
        let expected =
            eap_md5::compute_response_hash(ctx.eap.identifier, &user.password, &state.challenge);

        if received != expected {
            return Err(AuthError::new(
                RejectReason::PasswordMismatch,
                "EAP-MD5 response mismatch",
            ));
        }
        Ok(EapVerification::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RadiusUser;
    use radius_proto::eap::EapPacket;
    use radius_proto::{Code, Packet};

    fn alice() -> RadiusUser {
        RadiusUser {
            username: "alice".to_string(),
            password: "secret1".to_string(),
            ..Default::default()
        }
    }

    async fn issue(handler: &Md5Handler, request: &Packet) -> EapChallenge {
        let identity = EapPacket::identity_response(1, "alice");
        let ctx = EapContext::new(request, &identity, "alice", b"nastest");
        handler.handle_identity(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn test_challenge_layout() {
        let handler = Md5Handler::default();
        let request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        let challenge = issue(&handler, &request).await;

        assert_eq!(challenge.packet.identifier, 2);
        assert_eq!(challenge.packet.method(), Some(EapType::Md5Challenge));
        assert_eq!(challenge.packet.data[0], 16);
        assert_eq!(challenge.state.challenge.len(), 16);
        assert_eq!(&challenge.packet.data[1..17], challenge.state.challenge.as_slice());
        assert_eq!(challenge.state.method, "eap-md5");
    }

    #[tokio::test]
    async fn test_round_trip_and_bit_flips() {
        let handler = Md5Handler::default();
        let request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        let challenge = issue(&handler, &request).await;
        let user = alice();

        let id = challenge.packet.identifier;
        let hash = eap_md5::compute_response_hash(id, "secret1", &challenge.state.challenge);
        let response = eap_md5::create_response(id, &hash, "alice");
        let ctx = EapContext::new(&request, &response, "alice", b"nastest").with_user(&user);
        assert!(handler.handle_response(&ctx, &challenge.state).await.is_ok());

        for byte in 0..16 {
            for bit in 0..8 {
                let mut flipped = hash;
                flipped[byte] ^= 1 << bit;
                let response = eap_md5::create_response(id, &flipped, "alice");
                let ctx = EapContext::new(&request, &response, "alice", b"nastest").with_user(&user);
                let err = handler
                    .handle_response(&ctx, &challenge.state)
                    .await
                    .unwrap_err();
                assert_eq!(err.reason, RejectReason::PasswordMismatch);
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let handler = Md5Handler::default();
        let request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        let challenge = issue(&handler, &request).await;
        let user = alice();

        let id = challenge.packet.identifier;
        let hash = eap_md5::compute_response_hash(id, "secret2", &challenge.state.challenge);
        let response = eap_md5::create_response(id, &hash, "alice");
        let ctx = EapContext::new(&request, &response, "alice", b"nastest").with_user(&user);
        assert!(handler.handle_response(&ctx, &challenge.state).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_response_is_invalid() {
        let handler = Md5Handler::default();
        let request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        let state = EapState::new("alice", "eap-md5");
        let user = alice();

        let response = EapPacket::new(
            radius_proto::EapCode::Response,
            2,
            Some(EapType::Md5Challenge),
            vec![16, 1, 2, 3],
        );
        let ctx = EapContext::new(&request, &response, "alice", b"nastest").with_user(&user);
        let err = handler.handle_response(&ctx, &state).await.unwrap_err();
        assert_eq!(err.reason, RejectReason::InvalidRequest);
    }
}
