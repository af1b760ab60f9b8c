//! EAP method handlers and the coordinator that routes between them
//!
//! A handler issues the challenge for its method and verifies the peer's
//! answer. It keeps nothing between calls: everything a later round needs
//! goes into the [`EapState`] it returns with the challenge, which the
//! [`EapCoordinator`] stores under a fresh token.

pub mod coordinator;
pub mod md5;
pub mod mschapv2;
pub mod otp;

pub use coordinator::{EapCoordinator, EapRound};
pub use md5::Md5Handler;
pub use mschapv2::MsChapV2Handler;
pub use otp::{OtpHandler, OtpVerifier, StaticOtpVerifier, TotpVerifier};

use crate::error::{AuthError, RejectReason};
use crate::models::RadiusUser;
use crate::state::EapState;
use async_trait::async_trait;
use radius_proto::eap::{EapPacket, EapType};
use radius_proto::{Attribute, Packet};

/// Everything a handler may look at for one request
#[derive(Debug, Clone, Copy)]
pub struct EapContext<'a> {
    /// The Access-Request carrying the EAP message
    pub request: &'a Packet,
    pub eap: &'a EapPacket,
    pub username: &'a str,
    /// Shared secret of the NAS the request came from
    pub secret: &'a [u8],
    /// Resolved subscriber, available once the auth engine looked it up
    pub user: Option<&'a RadiusUser>,
}

impl<'a> EapContext<'a> {
    pub fn new(
        request: &'a Packet,
        eap: &'a EapPacket,
        username: &'a str,
        secret: &'a [u8],
    ) -> Self {
        EapContext {
            request,
            eap,
            username,
            secret,
            user: None,
        }
    }

    pub fn with_user(self, user: &'a RadiusUser) -> Self {
        EapContext {
            user: Some(user),
            ..self
        }
    }

    /// Identifier for the next EAP-Request
    pub fn next_identifier(&self) -> u8 {
        self.eap.identifier.wrapping_add(1)
    }

    pub(crate) fn require_user(&self) -> Result<&'a RadiusUser, AuthError> {
        self.user
            .ok_or_else(|| AuthError::new(RejectReason::UserNotFound, "user not found"))
    }
}

/// Challenge produced by a handler: the EAP-Request to send and the state
/// needed to verify the answer
#[derive(Debug, Clone)]
pub struct EapChallenge {
    pub packet: EapPacket,
    pub state: EapState,
}

/// Outcome of a successful verification
#[derive(Debug, Clone, Default)]
pub struct EapVerification {
    /// Extra attributes for the Access-Accept, e.g. MPPE keys
    pub reply_attributes: Vec<Attribute>,
}

#[async_trait]
pub trait EapMethodHandler: Send + Sync {
    /// Configuration name, e.g. `eap-md5`
    fn name(&self) -> &'static str;

    fn eap_type(&self) -> EapType;

    /// Whether this exact message is something the handler understands
    fn can_handle(&self, ctx: &EapContext<'_>) -> bool {
        ctx.eap.is_response_of(self.eap_type())
    }

    async fn handle_identity(&self, ctx: &EapContext<'_>) -> Result<EapChallenge, AuthError>;

    /// `Err` with `password-mismatch` when the peer's answer is wrong
    async fn handle_response(
        &self,
        ctx: &EapContext<'_>,
        state: &EapState,
    ) -> Result<EapVerification, AuthError>;
}

fn random_challenge() -> [u8; 16] {
    use rand::Rng;
    let mut challenge = [0u8; 16];
    rand::rng().fill(&mut challenge);
    challenge
}

fn malformed(e: impl std::fmt::Display) -> AuthError {
    AuthError::new(RejectReason::InvalidRequest, format!("malformed EAP response: {}", e))
}
