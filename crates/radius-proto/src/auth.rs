use crate::attributes::AttributeType;
use crate::message_auth::calculate_message_authenticator;
use crate::packet::{Packet, PacketError};
use rand::Rng;

/// Random Request Authenticator for Access-Request (RFC 2865 Section 3)
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut authenticator = [0u8; 16];
    rand::rng().fill(&mut authenticator);
    authenticator
}

fn md5_with_authenticator(encoded: &[u8], authenticator: &[u8; 16], secret: &[u8]) -> [u8; 16] {
    let mut data = Vec::with_capacity(encoded.len() + secret.len());
    data.extend_from_slice(&encoded[..4]);
    data.extend_from_slice(authenticator);
    data.extend_from_slice(&encoded[20..]);
    data.extend_from_slice(secret);
    md5::compute(&data).0
}

/// Response Authenticator (RFC 2865 Section 3)
///
/// `MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)`
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let encoded = packet.encode()?;
    Ok(md5_with_authenticator(&encoded, request_authenticator, secret))
}

pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        .map(|expected| expected == response.authenticator)
        .unwrap_or(false)
}

/// Request Authenticator of Accounting-Request and Disconnect-Request
/// (RFC 2866 Section 3, RFC 5176 Section 2.3): the packet hashed with
/// sixteen zero octets in place of the authenticator.
pub fn calculate_accounting_request_authenticator(
    packet: &Packet,
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let encoded = packet.encode()?;
    Ok(md5_with_authenticator(&encoded, &[0u8; 16], secret))
}

/// Check the authenticator of a received Accounting-Request against its
/// raw bytes.
pub fn verify_accounting_request_authenticator(data: &[u8], secret: &[u8]) -> bool {
    if data.len() < Packet::MIN_PACKET_SIZE {
        return false;
    }
    let length = u16::from_be_bytes([data[2], data[3]]) as usize;
    if length < Packet::MIN_PACKET_SIZE || data.len() < length {
        return false;
    }
    let data = &data[..length];
    md5_with_authenticator(data, &[0u8; 16], secret) == data[4..20]
}

/// Encode a reply, signing it with the shared secret.
///
/// If the packet carries a Message-Authenticator it is computed first, over
/// the packet holding the request authenticator, and the Response
/// Authenticator is computed over the result.
pub fn encode_response(
    response: &mut Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<Vec<u8>, PacketError> {
    let ma_type = AttributeType::MessageAuthenticator.as_u8();
    response.authenticator = *request_authenticator;

    let mut encoded = response.encode()?;
    if let Some(offset) = response.attribute_value_offset(ma_type) {
        encoded[offset..offset + 16].fill(0);
        let mac = calculate_message_authenticator(&encoded, secret);
        encoded[offset..offset + 16].copy_from_slice(&mac);
        if let Some(attr) = response.attributes.iter_mut().find(|a| a.attr_type == ma_type) {
            attr.value = mac.to_vec();
        }
    }

    let authenticator = md5_with_authenticator(&encoded, request_authenticator, secret);
    encoded[4..20].copy_from_slice(&authenticator);
    response.authenticator = authenticator;
    Ok(encoded)
}

/// Encode an Accounting-Request or Disconnect-Request. A
/// Message-Authenticator, if present, is computed with a zeroed
/// authenticator before the request authenticator is filled in.
pub fn encode_signed_request(request: &mut Packet, secret: &[u8]) -> Result<Vec<u8>, PacketError> {
    let ma_type = AttributeType::MessageAuthenticator.as_u8();
    request.authenticator = [0u8; 16];

    let mut encoded = request.encode()?;
    if let Some(offset) = request.attribute_value_offset(ma_type) {
        encoded[offset..offset + 16].fill(0);
        let mac = calculate_message_authenticator(&encoded, secret);
        encoded[offset..offset + 16].copy_from_slice(&mac);
        if let Some(attr) = request.attributes.iter_mut().find(|a| a.attr_type == ma_type) {
            attr.value = mac.to_vec();
        }
    }

    let authenticator = md5_with_authenticator(&encoded, &[0u8; 16], secret);
    encoded[4..20].copy_from_slice(&authenticator);
    request.authenticator = authenticator;
    Ok(encoded)
}

/// Hide a User-Password (RFC 2865 Section 5.2)
///
/// The password is zero-padded to a multiple of 16 and XORed block by block
/// with `MD5(secret + previous)`, where `previous` starts as the request
/// authenticator and then is the previous ciphertext block.
pub fn encrypt_user_password(password: &str, secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let mut padded = password.as_bytes().to_vec();
    let padded_len = padded.len().div_ceil(16).max(1) * 16;
    padded.resize(padded_len, 0);

    let mut result = Vec::with_capacity(padded_len);
    let mut previous = authenticator.to_vec();
    for chunk in padded.chunks(16) {
        let mut data = secret.to_vec();
        data.extend_from_slice(&previous);
        let hash = md5::compute(&data);
        previous = chunk.iter().zip(hash.0.iter()).map(|(p, h)| p ^ h).collect();
        result.extend_from_slice(&previous);
    }
    result
}

pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<String, PacketError> {
    if encrypted.is_empty() || encrypted.len() % 16 != 0 || encrypted.len() > 128 {
        return Err(PacketError::AttributeError(format!(
            "Invalid encrypted password length: {}",
            encrypted.len()
        )));
    }

    let mut result = Vec::with_capacity(encrypted.len());
    let mut previous: &[u8] = authenticator;
    for chunk in encrypted.chunks(16) {
        let mut data = secret.to_vec();
        data.extend_from_slice(previous);
        let hash = md5::compute(&data);
        result.extend(chunk.iter().zip(hash.0.iter()).map(|(c, h)| c ^ h));
        previous = chunk;
    }

    while result.last() == Some(&0) {
        result.pop();
    }

    String::from_utf8(result)
        .map_err(|e| PacketError::AttributeError(format!("Invalid UTF-8 in password: {}", e)))
}
