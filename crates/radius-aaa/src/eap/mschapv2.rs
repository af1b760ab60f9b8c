//! EAP-MSCHAPv2
//!
//! The challenge carries a random Authenticator Challenge; the MS-CHAPv2-ID
//! is kept in the state's auxiliary map under [`MsChapV2Handler::ID_KEY`].
//! A verified response yields the MPPE keys (RFC 3079), salt-encrypted for
//! the NAS (RFC 2548), and the Authenticator Response in an MS-CHAP2-Success
//! attribute.

use super::{
    EapChallenge, EapContext, EapMethodHandler, EapVerification, malformed, random_challenge,
};
use crate::error::{AuthError, RejectReason};
use crate::state::EapState;
use async_trait::async_trait;
use radius_proto::attributes::vendor::{encrypt_mppe_key, microsoft};
use radius_proto::eap::{EapType, eap_mschapv2};
use radius_proto::mschap::{derive_mppe_keys, generate_authenticator_response, verify_nt_response};
use radius_proto::{Attribute, VendorAttribute, VendorId};

#[derive(Debug, Clone)]
pub struct MsChapV2Handler {
    server_name: String,
}

impl Default for MsChapV2Handler {
    fn default() -> Self {
        Self::new("radius-aaa")
    }
}

impl MsChapV2Handler {
    pub const NAME: &'static str = "eap-mschapv2";
    pub const ID_KEY: &'static str = "mschapv2_id";

    pub fn new(server_name: impl Into<String>) -> Self {
        MsChapV2Handler {
            server_name: server_name.into(),
        }
    }
}

/// Microsoft VSAs for a successful MS-CHAPv2 exchange
pub fn success_attributes(
    ms_chap_id: u8,
    authenticator_response: &str,
    send_key: &[u8],
    recv_key: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Vec<Attribute>, AuthError> {
    let ms = VendorId::Microsoft.as_u32();

    let mut success = Vec::with_capacity(1 + authenticator_response.len());
    success.push(ms_chap_id);
    success.extend_from_slice(authenticator_response.as_bytes());

    let vsas = [
        VendorAttribute::new(ms, microsoft::MS_CHAP2_SUCCESS, success),
        VendorAttribute::new(
            ms,
            microsoft::MS_MPPE_SEND_KEY,
            encrypt_mppe_key(send_key, secret, request_authenticator),
        ),
        VendorAttribute::new(
            ms,
            microsoft::MS_MPPE_RECV_KEY,
            encrypt_mppe_key(recv_key, secret, request_authenticator),
        ),
        VendorAttribute::integer(
            ms,
            microsoft::MS_MPPE_ENCRYPTION_POLICY,
            microsoft::POLICY_REQUIRED,
        ),
        VendorAttribute::integer(
            ms,
            microsoft::MS_MPPE_ENCRYPTION_TYPES,
            microsoft::TYPES_RC4_40_128,
        ),
    ];

    vsas.iter()
        .map(|vsa| vsa.to_attribute().map_err(|e| AuthError::internal(e.to_string())))
        .collect()
}

#[async_trait]
impl EapMethodHandler for MsChapV2Handler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn eap_type(&self) -> EapType {
        EapType::MsChapV2
    }

    fn can_handle(&self, ctx: &EapContext<'_>) -> bool {
        ctx.eap.is_response_of(EapType::MsChapV2)
            && eap_mschapv2::op_code(ctx.eap) == Some(eap_mschapv2::OP_RESPONSE)
    }

    async fn handle_identity(&self, ctx: &EapContext<'_>) -> Result<EapChallenge, AuthError> {
        let identifier = ctx.next_identifier();
        let challenge = random_challenge();
        let packet =
            eap_mschapv2::create_challenge(identifier, identifier, &challenge, &self.server_name);

        let mut state = EapState::new(ctx.username, Self::NAME);
        state.challenge = challenge.to_vec();
        state.data.insert(Self::ID_KEY.to_string(), identifier.to_string());
        Ok(EapChallenge { packet, state })
    }

    async fn handle_response(
        &self,
        ctx: &EapContext<'_>,
        state: &EapState,
    ) -> Result<EapVerification, AuthError> {
        let user = ctx.require_user()?;
        let parsed = eap_mschapv2::parse_response(ctx.eap).map_err(malformed)?;

        let auth_challenge: [u8; 16] = state
            .challenge
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::internal("stored MS-CHAPv2 challenge is not 16 bytes"))?;
        let ms_chap_id = state
            .data
            .get(Self::ID_KEY)
            .and_then(|id| id.parse::<u8>().ok())
            .unwrap_or(parsed.ms_chap_id);

        let peer_name = if parsed.name.is_empty() {
            ctx.username
        } else {
            parsed.name.as_str()
        };
        let response = &parsed.response;

        if !verify_nt_response(
            &auth_challenge,
            &response.peer_challenge,
            peer_name,
            &user.password,
            &response.nt_response,
        ) {
            return Err(AuthError::new(
                RejectReason::PasswordMismatch,
                "MS-CHAPv2 NT-Response mismatch",
            ));
        }

        let authenticator_response = generate_authenticator_response(
            &user.password,
            &response.nt_response,
            &response.peer_challenge,
            &auth_challenge,
            peer_name,
        );
        let keys = derive_mppe_keys(&user.password, &response.nt_response);

        Ok(EapVerification {
            reply_attributes: success_attributes(
                ms_chap_id,
                &authenticator_response,
                &keys.send_key,
                &keys.recv_key,
                ctx.secret,
                &ctx.request.authenticator,
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RadiusUser;
    use radius_proto::attributes::vendor::decrypt_mppe_key;
    use radius_proto::eap::EapPacket;
    use radius_proto::mschap::generate_nt_response;
    use radius_proto::{Code, MsChapV2Response, Packet};

    const PEER_CHALLENGE: [u8; 16] = [
        0x21, 0x40, 0x23, 0x24, 0x25, 0x5E, 0x26, 0x2A, 0x28, 0x29, 0x5F, 0x2B, 0x3A, 0x33, 0x7C,
        0x7E,
    ];

    fn user() -> RadiusUser {
        RadiusUser {
            username: "User".to_string(),
            password: "clientPass".to_string(),
            ..Default::default()
        }
    }

    fn vsa(attrs: &[Attribute], vendor_type: u8) -> Vec<u8> {
        attrs
            .iter()
            .filter_map(|a| VendorAttribute::parse(a).ok())
            .flatten()
            .find(|v| v.vendor_type == vendor_type)
            .map(|v| v.value)
            .unwrap()
    }

    #[tokio::test]
    async fn test_challenge_records_identifier() {
        let handler = MsChapV2Handler::new("srv");
        let request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        let identity = EapPacket::identity_response(4, "User");
        let ctx = EapContext::new(&request, &identity, "User", b"nastest");

        let challenge = handler.handle_identity(&ctx).await.unwrap();
        assert_eq!(challenge.packet.identifier, 5);
        assert_eq!(
            challenge.state.data.get("mschapv2_id").map(String::as_str),
            Some("5")
        );
        // OpCode, ID, MS-Length, Value-Size
        assert_eq!(&challenge.packet.data[..5], &[1, 5, 0, 24, 16]);
        assert_eq!(&challenge.packet.data[21..], b"srv");
    }

    #[tokio::test]
    async fn test_round_trip_yields_distinct_keys() {
        let handler = MsChapV2Handler::default();
        let request = Packet::new(Code::AccessRequest, 1, [7u8; 16]);
        let identity = EapPacket::identity_response(1, "User");
        let ctx = EapContext::new(&request, &identity, "User", b"nastest");
        let challenge = handler.handle_identity(&ctx).await.unwrap();

        let auth_challenge: [u8; 16] = challenge.state.challenge.as_slice().try_into().unwrap();
        let nt_response =
            generate_nt_response(&auth_challenge, &PEER_CHALLENGE, "User", "clientPass");
        let answer = MsChapV2Response {
            peer_challenge: PEER_CHALLENGE,
            nt_response,
            flags: 0,
        };
        let id = challenge.packet.identifier;
        let response = eap_mschapv2::create_response(id, id, &answer, "User");

        let user = user();
        let ctx = EapContext::new(&request, &response, "User", b"nastest").with_user(&user);
        assert!(handler.can_handle(&ctx));
        let verified = handler.handle_response(&ctx, &challenge.state).await.unwrap();
        let attrs = verified.reply_attributes;

        let success = vsa(&attrs, microsoft::MS_CHAP2_SUCCESS);
        assert_eq!(success[0], id);
        assert!(success[1..].starts_with(b"S="));
        assert_eq!(success.len(), 1 + 42);

        let key = |vendor_type| {
            decrypt_mppe_key(&vsa(&attrs, vendor_type), b"nastest", &[7u8; 16]).unwrap()
        };
        let send = key(microsoft::MS_MPPE_SEND_KEY);
        let recv = key(microsoft::MS_MPPE_RECV_KEY);
        assert_eq!(send.len(), 16);
        assert_eq!(recv.len(), 16);
        assert_ne!(send, recv);
        assert!(send.iter().any(|b| *b != 0));
    }

    #[tokio::test]
    async fn test_wrong_password_rejected() {
        let handler = MsChapV2Handler::default();
        let request = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        let mut state = EapState::new("User", MsChapV2Handler::NAME);
        state.challenge = vec![0x11; 16];

        let nt_response = generate_nt_response(&[0x11; 16], &PEER_CHALLENGE, "User", "wrongPass");
        let answer = MsChapV2Response {
            peer_challenge: PEER_CHALLENGE,
            nt_response,
            flags: 0,
        };
        let response = eap_mschapv2::create_response(2, 2, &answer, "User");
        let user = user();
        let ctx = EapContext::new(&request, &response, "User", b"nastest").with_user(&user);

        let err = handler.handle_response(&ctx, &state).await.unwrap_err();
        assert_eq!(err.reason, RejectReason::PasswordMismatch);
    }
}
