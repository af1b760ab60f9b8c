//! CHAP (RFC 2865 Section 5.3)
//!
//! CHAP-Password carries a 1-byte identifier and `MD5(ident + password +
//! challenge)`. The challenge is the CHAP-Challenge attribute when present,
//! otherwise the Request Authenticator.

use crate::attributes::AttributeType;
use crate::packet::Packet;

/// Decoded CHAP-Password value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapResponse {
    pub ident: u8,
    pub response: [u8; 16],
}

impl ChapResponse {
    /// The attribute value must be exactly 17 bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ChapError> {
        let (ident, rest) = bytes
            .split_first()
            .filter(|_| bytes.len() == 17)
            .ok_or(ChapError::InvalidLength(bytes.len()))?;

        let mut response = [0u8; 16];
        response.copy_from_slice(rest);
        Ok(ChapResponse {
            ident: *ident,
            response,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(17);
        bytes.push(self.ident);
        bytes.extend_from_slice(&self.response);
        bytes
    }
}

/// Challenge used by the request: CHAP-Challenge, or the authenticator
pub fn request_challenge(packet: &Packet) -> Vec<u8> {
    packet
        .find_attribute(AttributeType::ChapChallenge.as_u8())
        .map(|attr| attr.value.clone())
        .unwrap_or_else(|| packet.authenticator.to_vec())
}

/// `MD5(ident + password + challenge)`. EAP-MD5 uses the same construction.
pub fn compute_chap_response(ident: u8, password: &[u8], challenge: &[u8]) -> [u8; 16] {
    let mut data = Vec::with_capacity(1 + password.len() + challenge.len());
    data.push(ident);
    data.extend_from_slice(password);
    data.extend_from_slice(challenge);
    md5::compute(&data).0
}

pub fn verify_chap_response(
    chap_response: &ChapResponse,
    password: &str,
    challenge: &[u8],
) -> bool {
    compute_chap_response(chap_response.ident, password.as_bytes(), challenge)
        == chap_response.response
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ChapError {
    #[error("Invalid CHAP-Password length: expected 17 bytes, got {0}")]
    InvalidLength(usize),
    #[error("CHAP-Password not found")]
    PasswordNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attribute;
    use crate::packet::Code;

    #[test]
    fn test_chap_response_invalid_length() {
        assert!(ChapResponse::from_bytes(&[0x01; 16]).is_err());
        assert!(ChapResponse::from_bytes(&[0x01; 18]).is_err());
        assert!(ChapResponse::from_bytes(&[]).is_err());
    }

    #[test]
    fn test_verify_chap_response() {
        let challenge = b"0123456789abcdef";
        let response = ChapResponse {
            ident: 7,
            response: compute_chap_response(7, b"secret1", challenge),
        };
        let parsed = ChapResponse::from_bytes(&response.to_bytes()).unwrap();

        assert!(verify_chap_response(&parsed, "secret1", challenge));
        assert!(!verify_chap_response(&parsed, "secret2", challenge));
    }

    #[test]
    fn test_request_challenge_prefers_attribute() {
        let mut packet = Packet::new(Code::AccessRequest, 1, [4u8; 16]);
        assert_eq!(request_challenge(&packet), vec![4u8; 16]);

        packet.add_attribute(Attribute::new(60, vec![9u8; 8]).unwrap());
        assert_eq!(request_challenge(&packet), vec![9u8; 8]);
    }
}
