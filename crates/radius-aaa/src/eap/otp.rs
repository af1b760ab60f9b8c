//! EAP One-Time Password
//!
//! The peer is shown a prompt and answers with the code in clear. Checking
//! the code is delegated to an [`OtpVerifier`].

use super::{EapChallenge, EapContext, EapMethodHandler, EapVerification, malformed};
use crate::error::{AuthError, RejectReason};
use crate::models::RadiusUser;
use crate::state::EapState;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use radius_proto::eap::{EapType, eap_otp};
use sha1::Sha1;
use std::sync::Arc;

type HmacSha1 = Hmac<Sha1>;

/// Checks a one-time code for a subscriber
pub trait OtpVerifier: Send + Sync {
    fn verify(&self, user: &RadiusUser, code: &str) -> bool;
}

/// RFC 6238 TOTP over the subscriber's `otp_secret`, HMAC-SHA1
#[derive(Debug, Clone)]
pub struct TotpVerifier {
    pub step_secs: u64,
    pub digits: u32,
    /// Steps accepted either side of the current one
    pub skew: u64,
}

impl Default for TotpVerifier {
    fn default() -> Self {
        TotpVerifier {
            step_secs: 30,
            digits: 6,
            skew: 1,
        }
    }
}

/// RFC 4226 HOTP value for `counter`
pub fn hotp(secret: &[u8], counter: u64, digits: u32) -> Option<String> {
    let mut mac = HmacSha1::new_from_slice(secret).ok()?;
    mac.update(&counter.to_be_bytes());
    let hash = mac.finalize().into_bytes();

    let offset = (hash[hash.len() - 1] & 0x0f) as usize;
    let binary = (u32::from(hash[offset] & 0x7f) << 24)
        | (u32::from(hash[offset + 1]) << 16)
        | (u32::from(hash[offset + 2]) << 8)
        | u32::from(hash[offset + 3]);

    let modulus = 10u64.pow(digits);
    Some(format!(
        "{:0width$}",
        u64::from(binary) % modulus,
        width = digits as usize
    ))
}

impl TotpVerifier {
    /// Verify `code` as of `unix_time`
    pub fn verify_at(&self, secret: &[u8], code: &str, unix_time: u64) -> bool {
        if secret.is_empty() || code.len() != self.digits as usize || self.step_secs == 0 {
            return false;
        }
        let current = unix_time / self.step_secs;
        let first = current.saturating_sub(self.skew);
        let last = current.saturating_add(self.skew);

        (first..=last).any(|counter| {
            hotp(secret, counter, self.digits)
                .is_some_and(|expected| constant_time_eq(expected.as_bytes(), code.as_bytes()))
        })
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

impl OtpVerifier for TotpVerifier {
    fn verify(&self, user: &RadiusUser, code: &str) -> bool {
        let now = u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
        self.verify_at(user.otp_secret.as_bytes(), code, now)
    }
}

/// Accepts one fixed code for everybody. For tests and lab setups.
#[derive(Debug, Clone)]
pub struct StaticOtpVerifier {
    code: String,
}

impl StaticOtpVerifier {
    pub fn new(code: impl Into<String>) -> Self {
        StaticOtpVerifier { code: code.into() }
    }
}

impl OtpVerifier for StaticOtpVerifier {
    fn verify(&self, _user: &RadiusUser, code: &str) -> bool {
        constant_time_eq(self.code.as_bytes(), code.as_bytes())
    }
}

pub struct OtpHandler {
    verifier: Arc<dyn OtpVerifier>,
    prompt: String,
}

impl OtpHandler {
    pub const NAME: &'static str = "eap-otp";

    pub fn new(verifier: Arc<dyn OtpVerifier>) -> Self {
        OtpHandler {
            verifier,
            prompt: eap_otp::DEFAULT_PROMPT.to_string(),
        }
    }
}

#[async_trait]
impl EapMethodHandler for OtpHandler {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn eap_type(&self) -> EapType {
        EapType::OneTimePassword
    }

    async fn handle_identity(&self, ctx: &EapContext<'_>) -> Result<EapChallenge, AuthError> {
        let packet = eap_otp::create_challenge(ctx.next_identifier(), &self.prompt);
        let mut state = EapState::new(ctx.username, Self::NAME);
        state.challenge = self.prompt.as_bytes().to_vec();
        Ok(EapChallenge { packet, state })
    }

    async fn handle_response(
        &self,
        ctx: &EapContext<'_>,
        _state: &EapState,
    ) -> Result<EapVerification, AuthError> {
        let user = ctx.require_user()?;
        let code = eap_otp::parse_response(ctx.eap).map_err(malformed)?;

        if !self.verifier.verify(user, &code) {
            return Err(AuthError::new(
                RejectReason::PasswordMismatch,
                "invalid one-time password",
            ));
        }
        Ok(EapVerification::default())
    }
}
