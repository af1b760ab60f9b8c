//! EAP (RFC 3748) and EAP over RADIUS (RFC 3579)
//!
//! # EAP Packet Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Type-Data ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Method payload helpers live in [`eap_md5`], [`eap_mschapv2`] and
//! [`eap_otp`].

use crate::attributes::{Attribute, AttributeType};
use crate::packet::Packet;
use thiserror::Error;

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EapCode {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
}

impl EapCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// EAP method types (RFC 3748 and the IANA registry)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EapType {
    /// Identity (Type 1) - RFC 3748
    Identity = 1,
    /// Notification (Type 2) - RFC 3748
    Notification = 2,
    /// Nak (Type 3) - RFC 3748, response only
    Nak = 3,
    /// MD5-Challenge (Type 4) - RFC 3748
    Md5Challenge = 4,
    /// One-Time Password (Type 5) - RFC 3748
    OneTimePassword = 5,
    /// Generic Token Card (Type 6) - RFC 3748
    GenericTokenCard = 6,
    /// EAP-TLS (Type 13) - RFC 5216
    Tls = 13,
    /// EAP-TTLS (Type 21) - RFC 5281
    Ttls = 21,
    /// PEAP (Type 25)
    Peap = 25,
    /// EAP-MSCHAPv2 (Type 26) - draft-kamath-pppext-eap-mschapv2
    MsChapV2 = 26,
}

impl EapType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapType::Identity),
            2 => Some(EapType::Notification),
            3 => Some(EapType::Nak),
            4 => Some(EapType::Md5Challenge),
            5 => Some(EapType::OneTimePassword),
            6 => Some(EapType::GenericTokenCard),
            13 => Some(EapType::Tls),
            21 => Some(EapType::Ttls),
            25 => Some(EapType::Peap),
            26 => Some(EapType::MsChapV2),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// One EAP packet.
///
/// `eap_type` keeps the raw type octet so that methods this crate has no
/// name for can still be reported back to the peer.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPacket {
    pub code: EapCode,
    pub identifier: u8,
    /// Present for Request/Response only
    pub eap_type: Option<u8>,
    pub data: Vec<u8>,
}

impl EapPacket {
    pub fn new(code: EapCode, identifier: u8, eap_type: Option<EapType>, data: Vec<u8>) -> Self {
        EapPacket {
            code,
            identifier,
            eap_type: eap_type.map(EapType::as_u8),
            data,
        }
    }

    pub fn identity_request(identifier: u8) -> Self {
        Self::new(EapCode::Request, identifier, Some(EapType::Identity), Vec::new())
    }

    pub fn identity_response(identifier: u8, identity: &str) -> Self {
        Self::new(
            EapCode::Response,
            identifier,
            Some(EapType::Identity),
            identity.as_bytes().to_vec(),
        )
    }

    /// Nak listing the methods the peer would accept instead
    pub fn nak(identifier: u8, desired: &[u8]) -> Self {
        Self::new(EapCode::Response, identifier, Some(EapType::Nak), desired.to_vec())
    }

    pub fn success(identifier: u8) -> Self {
        Self::new(EapCode::Success, identifier, None, Vec::new())
    }

    pub fn failure(identifier: u8) -> Self {
        Self::new(EapCode::Failure, identifier, None, Vec::new())
    }

    /// Named method type, if known
    pub fn method(&self) -> Option<EapType> {
        self.eap_type.and_then(EapType::from_u8)
    }

    pub fn is_response_of(&self, eap_type: EapType) -> bool {
        self.code == EapCode::Response && self.eap_type == Some(eap_type.as_u8())
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EapError> {
        if bytes.len() < 4 {
            return Err(EapError::PacketTooShort {
                expected: 4,
                actual: bytes.len(),
            });
        }

        let code = EapCode::from_u8(bytes[0]).ok_or(EapError::InvalidCode(bytes[0]))?;
        let identifier = bytes[1];
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
        if length < 4 {
            return Err(EapError::InvalidLength(length));
        }
        if bytes.len() < length {
            return Err(EapError::PacketTooShort {
                expected: length,
                actual: bytes.len(),
            });
        }

        let (eap_type, data) = match code {
            EapCode::Request | EapCode::Response => {
                if length < 5 {
                    return Err(EapError::InvalidLength(length));
                }
                (Some(bytes[4]), bytes[5..length].to_vec())
            }
            EapCode::Success | EapCode::Failure => (None, Vec::new()),
        };

        Ok(EapPacket {
            code,
            identifier,
            eap_type,
            data,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let length = self.length();
        let mut bytes = Vec::with_capacity(length);
        bytes.push(self.code.as_u8());
        bytes.push(self.identifier);
        bytes.extend_from_slice(&(length as u16).to_be_bytes());
        if let (EapCode::Request | EapCode::Response, Some(eap_type)) = (self.code, self.eap_type) {
            bytes.push(eap_type);
            bytes.extend_from_slice(&self.data);
        }
        bytes
    }

    pub fn length(&self) -> usize {
        match (self.code, self.eap_type) {
            (EapCode::Request | EapCode::Response, Some(_)) => 5 + self.data.len(),
            _ => 4,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EapError {
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Invalid EAP code: {0}")]
    InvalidCode(u8),

    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),

    #[error("Unknown EAP type: {0}")]
    UnknownType(u8),

    #[error("Invalid challenge length: {0}")]
    InvalidChallengeLength(usize),

    #[error("Invalid response format")]
    InvalidResponseFormat,

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Types a Nak proposes, in the peer's order of preference. A lone zero
/// means the peer has no alternative.
pub fn nak_desired_types(packet: &EapPacket) -> Vec<u8> {
    packet.data.iter().copied().filter(|t| *t != 0).collect()
}

/// EAP-MD5 Challenge (RFC 3748 Section 5.4)
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// | Value-Size    | Value ...     | Name ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub mod eap_md5 {
    use super::*;
    use crate::chap::compute_chap_response;

    pub const MD5_CHALLENGE_SIZE: usize = 16;
    pub const MD5_RESPONSE_SIZE: usize = 16;

    pub fn create_challenge(identifier: u8, challenge: &[u8], name: &str) -> EapPacket {
        let mut data = Vec::with_capacity(1 + challenge.len() + name.len());
        data.push(challenge.len() as u8);
        data.extend_from_slice(challenge);
        data.extend_from_slice(name.as_bytes());
        EapPacket::new(EapCode::Request, identifier, Some(EapType::Md5Challenge), data)
    }

    pub fn create_response(identifier: u8, response_hash: &[u8; 16], name: &str) -> EapPacket {
        let mut data = Vec::with_capacity(1 + MD5_RESPONSE_SIZE + name.len());
        data.push(MD5_RESPONSE_SIZE as u8);
        data.extend_from_slice(response_hash);
        data.extend_from_slice(name.as_bytes());
        EapPacket::new(EapCode::Response, identifier, Some(EapType::Md5Challenge), data)
    }

    /// Value field of a response, without its size prefix
    pub fn parse_response(packet: &EapPacket) -> Result<[u8; 16], EapError> {
        if !packet.is_response_of(EapType::Md5Challenge) {
            return Err(EapError::InvalidResponseFormat);
        }
        let value_size = *packet
            .data
            .first()
            .ok_or(EapError::InvalidChallengeLength(0))? as usize;
        if value_size != MD5_RESPONSE_SIZE {
            return Err(EapError::InvalidChallengeLength(value_size));
        }
        if packet.data.len() < 1 + MD5_RESPONSE_SIZE {
            return Err(EapError::PacketTooShort {
                expected: 1 + MD5_RESPONSE_SIZE,
                actual: packet.data.len(),
            });
        }

        let mut hash = [0u8; 16];
        hash.copy_from_slice(&packet.data[1..1 + MD5_RESPONSE_SIZE]);
        Ok(hash)
    }

    /// `MD5(identifier + password + challenge)`
    pub fn compute_response_hash(identifier: u8, password: &str, challenge: &[u8]) -> [u8; 16] {
        compute_chap_response(identifier, password.as_bytes(), challenge)
    }
}

/// EAP-MSCHAPv2 framing (draft-kamath-pppext-eap-mschapv2)
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |    OpCode     | MS-CHAPv2-ID  |           MS-Length           |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Value-Size   |  Value ...                      | Name ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub mod eap_mschapv2 {
    use super::*;
    use crate::mschap::MsChapV2Response;

    pub const OP_CHALLENGE: u8 = 1;
    pub const OP_RESPONSE: u8 = 2;
    pub const OP_SUCCESS: u8 = 3;
    pub const OP_FAILURE: u8 = 4;

    pub fn create_challenge(
        identifier: u8,
        ms_chap_id: u8,
        challenge: &[u8; 16],
        server_name: &str,
    ) -> EapPacket {
        let ms_length = (4 + 1 + challenge.len() + server_name.len()) as u16;
        let mut data = Vec::with_capacity(ms_length as usize);
        data.push(OP_CHALLENGE);
        data.push(ms_chap_id);
        data.extend_from_slice(&ms_length.to_be_bytes());
        data.push(challenge.len() as u8);
        data.extend_from_slice(challenge);
        data.extend_from_slice(server_name.as_bytes());
        EapPacket::new(EapCode::Request, identifier, Some(EapType::MsChapV2), data)
    }

    /// Peer-side response, used by test clients
    pub fn create_response(
        identifier: u8,
        ms_chap_id: u8,
        response: &MsChapV2Response,
        name: &str,
    ) -> EapPacket {
        let value = response.to_bytes();
        let ms_length = (4 + 1 + value.len() + name.len()) as u16;
        let mut data = Vec::with_capacity(ms_length as usize);
        data.push(OP_RESPONSE);
        data.push(ms_chap_id);
        data.extend_from_slice(&ms_length.to_be_bytes());
        data.push(value.len() as u8);
        data.extend_from_slice(&value);
        data.extend_from_slice(name.as_bytes());
        EapPacket::new(EapCode::Response, identifier, Some(EapType::MsChapV2), data)
    }

    /// Parsed Response op-code payload
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ParsedResponse {
        pub ms_chap_id: u8,
        pub response: MsChapV2Response,
        pub name: String,
    }

    pub fn op_code(packet: &EapPacket) -> Option<u8> {
        packet.data.first().copied()
    }

    pub fn parse_response(packet: &EapPacket) -> Result<ParsedResponse, EapError> {
        if !packet.is_response_of(EapType::MsChapV2) {
            return Err(EapError::InvalidResponseFormat);
        }
        let data = &packet.data;
        if data.len() < 5 + MsChapV2Response::LEN {
            return Err(EapError::PacketTooShort {
                expected: 5 + MsChapV2Response::LEN,
                actual: data.len(),
            });
        }
        if data[0] != OP_RESPONSE || data[4] as usize != MsChapV2Response::LEN {
            return Err(EapError::InvalidResponseFormat);
        }

        let response = MsChapV2Response::from_bytes(&data[5..5 + MsChapV2Response::LEN])
            .map_err(|_| EapError::InvalidResponseFormat)?;
        let name = String::from_utf8_lossy(&data[5 + MsChapV2Response::LEN..]).to_string();
        Ok(ParsedResponse {
            ms_chap_id: data[1],
            response,
            name,
        })
    }
}

/// EAP One-Time Password (RFC 3748 Section 5.5)
///
/// The request carries a display prompt, the response the OTP in clear.
pub mod eap_otp {
    use super::*;

    pub const DEFAULT_PROMPT: &str = "OTP Password: ";

    pub fn create_challenge(identifier: u8, prompt: &str) -> EapPacket {
        EapPacket::new(
            EapCode::Request,
            identifier,
            Some(EapType::OneTimePassword),
            prompt.as_bytes().to_vec(),
        )
    }

    pub fn parse_response(packet: &EapPacket) -> Result<String, EapError> {
        if !packet.is_response_of(EapType::OneTimePassword) {
            return Err(EapError::InvalidResponseFormat);
        }
        String::from_utf8(packet.data.clone())
            .map(|s| s.trim_end_matches('\0').trim().to_string())
            .map_err(|_| EapError::InvalidResponseFormat)
    }
}

/// Split an EAP packet into EAP-Message attributes of at most 253 bytes
pub fn eap_to_radius_attributes(eap_packet: &EapPacket) -> Result<Vec<Attribute>, EapError> {
    eap_packet
        .to_bytes()
        .chunks(Attribute::MAX_VALUE_LENGTH)
        .map(|chunk| {
            Attribute::new(AttributeType::EapMessage.as_u8(), chunk.to_vec()).map_err(|e| {
                EapError::EncodingError(format!("Failed to create EAP-Message attribute: {}", e))
            })
        })
        .collect()
}

/// Concatenate every EAP-Message attribute and decode the result.
/// `Ok(None)` when the packet carries no EAP-Message.
pub fn eap_from_radius_packet(radius_packet: &Packet) -> Result<Option<EapPacket>, EapError> {
    let eap_bytes: Vec<u8> = radius_packet
        .find_all_attributes(AttributeType::EapMessage.as_u8())
        .into_iter()
        .flat_map(|attr| attr.value.iter().copied())
        .collect();

    if eap_bytes.is_empty() {
        return Ok(None);
    }
    EapPacket::from_bytes(&eap_bytes).map(Some)
}

pub fn add_eap_to_radius_packet(
    radius_packet: &mut Packet,
    eap_packet: &EapPacket,
) -> Result<(), EapError> {
    for attr in eap_to_radius_attributes(eap_packet)? {
        radius_packet.add_attribute(attr);
    }
    Ok(())
}
