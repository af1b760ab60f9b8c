//! Authentication failure taxonomy

use crate::repository::RepositoryError;
use crate::state::StateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable reason attached to every Access-Reject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    InvalidRequest,
    UnauthorizedDevice,
    UserNotFound,
    UserDisabled,
    UserExpired,
    RateLimited,
    ConcurrencyLimit,
    MacMismatch,
    VlanMismatch,
    PasswordMismatch,
    UnsupportedEapType,
    StateNotFound,
    InternalError,
}

impl RejectReason {
    pub const ALL: [RejectReason; 13] = [
        RejectReason::InvalidRequest,
        RejectReason::UnauthorizedDevice,
        RejectReason::UserNotFound,
        RejectReason::UserDisabled,
        RejectReason::UserExpired,
        RejectReason::RateLimited,
        RejectReason::ConcurrencyLimit,
        RejectReason::MacMismatch,
        RejectReason::VlanMismatch,
        RejectReason::PasswordMismatch,
        RejectReason::UnsupportedEapType,
        RejectReason::StateNotFound,
        RejectReason::InternalError,
    ];

    pub fn code(self) -> &'static str {
        match self {
            RejectReason::InvalidRequest => "invalid-request",
            RejectReason::UnauthorizedDevice => "unauthorized-device",
            RejectReason::UserNotFound => "user-not-found",
            RejectReason::UserDisabled => "user-disabled",
            RejectReason::UserExpired => "user-expired",
            RejectReason::RateLimited => "rate-limited",
            RejectReason::ConcurrencyLimit => "concurrency-limit",
            RejectReason::MacMismatch => "mac-mismatch",
            RejectReason::VlanMismatch => "vlan-mismatch",
            RejectReason::PasswordMismatch => "password-mismatch",
            RejectReason::UnsupportedEapType => "unsupported-eap-type",
            RejectReason::StateNotFound => "state-not-found",
            RejectReason::InternalError => "internal-error",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Why an Access-Request is being rejected. `message` goes into the
/// Reply-Message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}: {message}")]
pub struct AuthError {
    pub reason: RejectReason,
    pub message: String,
}

impl AuthError {
    pub fn new(reason: RejectReason, message: impl Into<String>) -> Self {
        AuthError {
            reason,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(RejectReason::InternalError, message)
    }
}

impl From<RepositoryError> for AuthError {
    fn from(e: RepositoryError) -> Self {
        AuthError::internal(e.to_string())
    }
}

impl From<StateError> for AuthError {
    fn from(e: StateError) -> Self {
        match e {
            StateError::NotFound(_) => {
                AuthError::new(RejectReason::StateNotFound, "EAP state not found")
            }
            other => AuthError::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_serde_names() {
        for reason in RejectReason::ALL {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.code()));
        }
    }

    #[test]
    fn test_index_matches_position() {
        for (i, reason) in RejectReason::ALL.iter().enumerate() {
            assert_eq!(reason.index(), i);
        }
    }

    #[test]
    fn test_state_error_conversion() {
        let err: AuthError = StateError::NotFound("tok".into()).into();
        assert_eq!(err.reason, RejectReason::StateNotFound);

        let err: AuthError = StateError::BackendError("down".into()).into();
        assert_eq!(err.reason, RejectReason::InternalError);
    }
}
