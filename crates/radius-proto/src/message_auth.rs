//! Message-Authenticator (RFC 2869 Section 5.14, RFC 3579 Section 3.2)
//!
//! HMAC-MD5 keyed with the shared secret, computed over the whole packet
//! with the Message-Authenticator value zeroed. Required on every packet
//! carrying EAP-Message.

use crate::attributes::AttributeType;
use hmac::{Hmac, Mac};
use md5_digest::Md5;

type HmacMd5 = Hmac<Md5>;

/// HMAC-MD5 of `packet_bytes`, which must already hold zeros in the
/// Message-Authenticator value.
pub fn calculate_message_authenticator(packet_bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    let mut mac = HmacMd5::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(packet_bytes);

    let mut output = [0u8; 16];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Verify the 16 bytes at `message_auth_offset` against the rest of the packet
pub fn verify_message_authenticator(
    packet_bytes: &[u8],
    secret: &[u8],
    message_auth_offset: usize,
) -> bool {
    if message_auth_offset + 16 > packet_bytes.len() {
        return false;
    }

    let mut zeroed = packet_bytes.to_vec();
    zeroed[message_auth_offset..message_auth_offset + 16].fill(0);
    let expected = calculate_message_authenticator(&zeroed, secret);

    let received = &packet_bytes[message_auth_offset..message_auth_offset + 16];
    received
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Offset of the Message-Authenticator value in a raw packet, if present
/// and well-formed.
pub fn find_message_authenticator(packet_bytes: &[u8]) -> Option<usize> {
    if packet_bytes.len() < 20 {
        return None;
    }
    let length = (u16::from_be_bytes([packet_bytes[2], packet_bytes[3]]) as usize)
        .min(packet_bytes.len());

    let mut offset = 20;
    while offset + 2 <= length {
        let attr_type = packet_bytes[offset];
        let attr_len = packet_bytes[offset + 1] as usize;
        if attr_len < 2 || offset + attr_len > length {
            return None;
        }
        if attr_type == AttributeType::MessageAuthenticator.as_u8() {
            return (attr_len == 18).then_some(offset + 2);
        }
        offset += attr_len;
    }
    None
}

/// Verify a received request. `None` when the packet has no
/// Message-Authenticator.
pub fn verify_request_message_authenticator(packet_bytes: &[u8], secret: &[u8]) -> Option<bool> {
    let offset = find_message_authenticator(packet_bytes)?;
    let length = (u16::from_be_bytes([packet_bytes[2], packet_bytes[3]]) as usize)
        .min(packet_bytes.len());
    Some(verify_message_authenticator(&packet_bytes[..length], secret, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attribute;
    use crate::packet::{Code, Packet};

    fn signed_request(secret: &[u8]) -> Vec<u8> {
        let mut packet = Packet::new(Code::AccessRequest, 1, [5u8; 16]);
        packet.add_attribute(Attribute::string(1, "alice").unwrap());
        packet.add_attribute(Attribute::new(80, vec![0u8; 16]).unwrap());
        let mut bytes = packet.encode().unwrap();
        let offset = find_message_authenticator(&bytes).unwrap();
        let mac = calculate_message_authenticator(&bytes, secret);
        bytes[offset..offset + 16].copy_from_slice(&mac);
        bytes
    }

    #[test]
    fn test_message_authenticator_different_secrets() {
        let packet = vec![0u8; 20];
        assert_ne!(
            calculate_message_authenticator(&packet, b"secret1"),
            calculate_message_authenticator(&packet, b"secret2")
        );
    }

    #[test]
    fn test_find_message_authenticator() {
        let bytes = signed_request(b"nastest");
        // header 20, User-Name 7, then type/len
        assert_eq!(find_message_authenticator(&bytes), Some(29));
        assert_eq!(find_message_authenticator(&bytes[..20]), None);
    }

    #[test]
    fn test_verify_request() {
        let bytes = signed_request(b"nastest");
        assert_eq!(verify_request_message_authenticator(&bytes, b"nastest"), Some(true));
        assert_eq!(verify_request_message_authenticator(&bytes, b"other"), Some(false));

        let mut tampered = bytes.clone();
        tampered[22] ^= 0x01;
        assert_eq!(verify_request_message_authenticator(&tampered, b"nastest"), Some(false));
    }

    #[test]
    fn test_verify_request_without_attribute() {
        let bytes = Packet::new(Code::AccessRequest, 1, [0u8; 16]).encode().unwrap();
        assert_eq!(verify_request_message_authenticator(&bytes, b"nastest"), None);
    }

    #[test]
    fn test_verify_message_authenticator_out_of_bounds() {
        assert!(!verify_message_authenticator(&[0u8; 20], b"testing123", 100));
    }
}
