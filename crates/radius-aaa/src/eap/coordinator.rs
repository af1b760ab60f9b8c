//! Routes EAP responses through Identity, Nak and method phases
//!
//! ```text
//! Response/Identity ──► configured handler ──► Access-Challenge
//! Response/Nak      ──► first suggested type ──► Access-Challenge
//! Response/<type>   ──► handler for <type> ──► verify (auth engine decides)
//! ```
//!
//! The coordinator never builds an Accept or Reject. It frames
//! EAP-Request/Success/Failure into RADIUS packets and deletes the state of
//! every round it resolves.

use super::{
    EapContext, EapMethodHandler, EapVerification, Md5Handler, MsChapV2Handler, OtpHandler,
    OtpVerifier,
};
use crate::error::{AuthError, RejectReason};
use crate::state::{EapState, EapStateStore};
use radius_proto::eap::{
    EapCode, EapPacket, EapType, add_eap_to_radius_packet, nak_desired_types,
};
use radius_proto::{Attribute, AttributeType, Packet};
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the auth engine should do next with an EAP request
pub enum EapRound {
    /// Send an Access-Challenge carrying `packet` and `token`
    Challenge { packet: EapPacket, token: String },
    /// The peer answered an earlier challenge. Verification runs through
    /// [`EapCoordinator::verify`] once the subscriber is known.
    Response {
        handler: Arc<dyn EapMethodHandler>,
        state: EapState,
        token: String,
    },
}

impl std::fmt::Debug for EapRound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EapRound::Challenge { packet, token } => f
                .debug_struct("Challenge")
                .field("packet", packet)
                .field("token", token)
                .finish(),
            EapRound::Response { handler, token, .. } => f
                .debug_struct("Response")
                .field("handler", &handler.name())
                .field("token", token)
                .finish(),
        }
    }
}

pub struct EapCoordinator {
    handlers: HashMap<u8, Arc<dyn EapMethodHandler>>,
    default_method: String,
    store: Arc<dyn EapStateStore>,
}

fn new_token() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn unsupported(message: impl Into<String>) -> AuthError {
    AuthError::new(RejectReason::UnsupportedEapType, message)
}

impl EapCoordinator {
    /// Empty registry; `default_method` names the handler used on Identity
    pub fn new(store: Arc<dyn EapStateStore>, default_method: impl Into<String>) -> Self {
        EapCoordinator {
            handlers: HashMap::new(),
            default_method: default_method.into(),
            store,
        }
    }

    /// Registry with the MD5, MSCHAPv2 and OTP handlers
    pub fn with_default_handlers(
        store: Arc<dyn EapStateStore>,
        default_method: impl Into<String>,
        server_name: &str,
        otp_verifier: Arc<dyn OtpVerifier>,
    ) -> Self {
        let mut coordinator = Self::new(store, default_method);
        coordinator.register(Arc::new(Md5Handler::new(server_name)));
        coordinator.register(Arc::new(MsChapV2Handler::new(server_name)));
        coordinator.register(Arc::new(OtpHandler::new(otp_verifier)));
        coordinator
    }

    /// Replaces any handler registered for the same EAP type
    pub fn register(&mut self, handler: Arc<dyn EapMethodHandler>) {
        self.handlers.insert(handler.eap_type().as_u8(), handler);
    }

    pub fn handler(&self, eap_type: u8) -> Option<Arc<dyn EapMethodHandler>> {
        self.handlers.get(&eap_type).cloned()
    }

    /// Handler for the configured method, MD5 when the name is unknown
    fn configured_handler(&self) -> Option<Arc<dyn EapMethodHandler>> {
        self.handlers
            .values()
            .find(|h| h.name() == self.default_method)
            .or_else(|| self.handlers.get(&EapType::Md5Challenge.as_u8()))
            .cloned()
    }

    /// First half of an EAP round: issue a challenge, or hand back what is
    /// needed to verify the peer's answer
    pub async fn begin(
        &self,
        ctx: &EapContext<'_>,
        state_token: Option<&str>,
    ) -> Result<EapRound, AuthError> {
        if ctx.eap.code != EapCode::Response {
            return Err(AuthError::new(
                RejectReason::InvalidRequest,
                "EAP message is not a Response",
            ));
        }

        match ctx.eap.method() {
            Some(EapType::Identity) => {
                let handler = self
                    .configured_handler()
                    .ok_or_else(|| unsupported("no EAP method configured"))?;
                self.issue(handler, ctx, state_token).await
            }
            Some(EapType::Nak) => {
                let desired = nak_desired_types(ctx.eap);
                let Some(first) = desired.first().copied() else {
                    return Err(unsupported("no alternative methods"));
                };
                let handler = self
                    .handler(first)
                    .ok_or_else(|| unsupported(format!("unsupported EAP type {}", first)))?;
                debug!(
                    username = ctx.username,
                    method = handler.name(),
                    "Peer proposed EAP method"
                );
                self.issue(handler, ctx, state_token).await
            }
            _ => {
                let eap_type = ctx.eap.eap_type.unwrap_or(0);
                let handler = self
                    .handler(eap_type)
                    .filter(|h| h.can_handle(ctx))
                    .ok_or_else(|| unsupported(format!("unsupported EAP type {}", eap_type)))?;

                let token = state_token
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| AuthError::new(RejectReason::StateNotFound, "missing State"))?;
                let state = self.store.get_state(token).await?;
                if state.method != handler.name() {
                    return Err(AuthError::new(
                        RejectReason::StateNotFound,
                        format!("EAP state belongs to {}", state.method),
                    ));
                }

                Ok(EapRound::Response {
                    handler,
                    state,
                    token: token.to_string(),
                })
            }
        }
    }

    async fn issue(
        &self,
        handler: Arc<dyn EapMethodHandler>,
        ctx: &EapContext<'_>,
        previous_token: Option<&str>,
    ) -> Result<EapRound, AuthError> {
        if let Some(previous) = previous_token {
            self.discard(previous).await;
        }

        let challenge = handler.handle_identity(ctx).await?;
        let token = new_token();
        self.store.set_state(&token, challenge.state).await?;
        Ok(EapRound::Challenge {
            packet: challenge.packet,
            token,
        })
    }

    /// Second half of an EAP round. The state is deleted whatever the outcome.
    pub async fn verify(
        &self,
        handler: &dyn EapMethodHandler,
        ctx: &EapContext<'_>,
        state: &EapState,
        token: &str,
    ) -> Result<EapVerification, AuthError> {
        let result = handler.handle_response(ctx, state).await;
        self.discard(token).await;
        result
    }

    /// Drop the state for `token`; failures are only logged
    pub async fn discard(&self, token: &str) {
        if let Err(e) = self.store.delete_state(token).await {
            warn!(error = %e, "Failed to delete EAP state");
        }
    }
}

fn add_message_authenticator(response: &mut Packet) -> Result<(), AuthError> {
    let placeholder = Attribute::new(AttributeType::MessageAuthenticator.as_u8(), vec![0u8; 16])
        .map_err(|e| AuthError::internal(e.to_string()))?;
    response.set_attribute(placeholder);
    Ok(())
}

fn add_eap(response: &mut Packet, eap: &EapPacket) -> Result<(), AuthError> {
    add_eap_to_radius_packet(response, eap).map_err(|e| AuthError::internal(e.to_string()))?;
    add_message_authenticator(response)
}

/// EAP-Request, State and Message-Authenticator for an Access-Challenge
pub fn frame_challenge(
    response: &mut Packet,
    eap: &EapPacket,
    token: &str,
) -> Result<(), AuthError> {
    let state = Attribute::new(AttributeType::State.as_u8(), token.as_bytes().to_vec())
        .map_err(|e| AuthError::internal(e.to_string()))?;
    response.add_attribute(state);
    add_eap(response, eap)
}

/// EAP-Success for an Access-Accept
pub fn frame_success(response: &mut Packet, identifier: u8) -> Result<(), AuthError> {
    add_eap(response, &EapPacket::success(identifier))
}

/// EAP-Failure for an Access-Reject
pub fn frame_failure(response: &mut Packet, identifier: u8) -> Result<(), AuthError> {
    add_eap(response, &EapPacket::failure(identifier))
}
