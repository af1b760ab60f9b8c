//! Vendor-Specific Attributes (RFC 2865 Section 5.26)
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Length       |            Vendor-Id
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//!      Vendor-Id (cont)           | Vendor type   | Vendor length |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Attribute-Specific...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Also carries the RFC 2548 salt encryption used for MS-MPPE-Send-Key and
//! MS-MPPE-Recv-Key.

use super::{Attribute, AttributeType};
use crate::packet::{Packet, PacketError};
use rand::Rng;

/// SMI private enterprise numbers of vendors with dedicated handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VendorId {
    Cisco = 9,
    Microsoft = 311,
    Huawei = 2011,
    Zte = 3902,
    Mikrotik = 14988,
    H3c = 25506,
}

impl VendorId {
    pub fn from_u32(value: u32) -> Option<Self> {
        let vendor = match value {
            9 => VendorId::Cisco,
            311 => VendorId::Microsoft,
            2011 => VendorId::Huawei,
            3902 => VendorId::Zte,
            14988 => VendorId::Mikrotik,
            25506 => VendorId::H3c,
            _ => return None,
        };
        Some(vendor)
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Microsoft vendor attribute types (RFC 2548)
pub mod microsoft {
    pub const MS_CHAP_RESPONSE: u8 = 1;
    pub const MS_CHAP_ERROR: u8 = 2;
    pub const MS_MPPE_ENCRYPTION_POLICY: u8 = 7;
    pub const MS_MPPE_ENCRYPTION_TYPES: u8 = 8;
    pub const MS_CHAP_CHALLENGE: u8 = 11;
    pub const MS_MPPE_SEND_KEY: u8 = 16;
    pub const MS_MPPE_RECV_KEY: u8 = 17;
    pub const MS_CHAP2_RESPONSE: u8 = 25;
    pub const MS_CHAP2_SUCCESS: u8 = 26;

    /// Encryption-Policy: encryption required
    pub const POLICY_REQUIRED: u32 = 2;
    /// Encryption-Types: 40-bit and 128-bit RC4 allowed
    pub const TYPES_RC4_40_128: u32 = 6;
}

/// One vendor sub-attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorAttribute {
    pub vendor_id: u32,
    pub vendor_type: u8,
    pub value: Vec<u8>,
}

impl VendorAttribute {
    /// Vendor-Id, vendor type and vendor length
    const HEADER_LEN: usize = 6;

    pub fn new(vendor_id: u32, vendor_type: u8, value: Vec<u8>) -> Self {
        VendorAttribute {
            vendor_id,
            vendor_type,
            value,
        }
    }

    pub fn string(vendor_id: u32, vendor_type: u8, value: &str) -> Self {
        Self::new(vendor_id, vendor_type, value.as_bytes().to_vec())
    }

    pub fn integer(vendor_id: u32, vendor_type: u8, value: u32) -> Self {
        Self::new(vendor_id, vendor_type, value.to_be_bytes().to_vec())
    }

    /// Wrap into a Vendor-Specific (26) attribute
    pub fn to_attribute(&self) -> Result<Attribute, PacketError> {
        if self.value.len() + Self::HEADER_LEN > Attribute::MAX_VALUE_LENGTH {
            return Err(PacketError::AttributeError(format!(
                "Vendor attribute {}:{} too long: {} bytes",
                self.vendor_id,
                self.vendor_type,
                self.value.len()
            )));
        }

        let mut value = Vec::with_capacity(Self::HEADER_LEN + self.value.len());
        value.extend_from_slice(&self.vendor_id.to_be_bytes());
        value.push(self.vendor_type);
        value.push((self.value.len() + 2) as u8);
        value.extend_from_slice(&self.value);
        Attribute::new(AttributeType::VendorSpecific.as_u8(), value)
    }

    /// Split a Vendor-Specific attribute into its sub-attributes
    pub fn parse(attr: &Attribute) -> Result<Vec<VendorAttribute>, PacketError> {
        if attr.attr_type != AttributeType::VendorSpecific.as_u8() {
            return Err(PacketError::AttributeError(format!(
                "Attribute {} is not Vendor-Specific",
                attr.attr_type
            )));
        }
        if attr.value.len() < 4 {
            return Err(PacketError::AttributeError(
                "Vendor-Specific attribute shorter than Vendor-Id".to_string(),
            ));
        }

        let vendor_id =
            u32::from_be_bytes([attr.value[0], attr.value[1], attr.value[2], attr.value[3]]);
        let mut rest = &attr.value[4..];
        let mut out = Vec::new();
        while !rest.is_empty() {
            if rest.len() < 2 || (rest[1] as usize) < 2 || rest.len() < rest[1] as usize {
                return Err(PacketError::AttributeError(format!(
                    "Malformed sub-attribute in vendor {}",
                    vendor_id
                )));
            }
            let len = rest[1] as usize;
            out.push(VendorAttribute::new(vendor_id, rest[0], rest[2..len].to_vec()));
            rest = &rest[len..];
        }
        Ok(out)
    }
}

/// First vendor sub-attribute in a packet matching vendor and type
pub fn find_vendor_attribute(packet: &Packet, vendor_id: u32, vendor_type: u8) -> Option<Vec<u8>> {
    packet
        .find_all_attributes(AttributeType::VendorSpecific.as_u8())
        .into_iter()
        .filter_map(|attr| VendorAttribute::parse(attr).ok())
        .flatten()
        .find(|v| v.vendor_id == vendor_id && v.vendor_type == vendor_type)
        .map(|v| v.value)
}

/// Encrypt an MS-MPPE key per RFC 2548 Section 2.4.2.
///
/// Output is `salt (2) || ciphertext`, where the plaintext is
/// `key length || key || zero padding` to a multiple of 16.
pub fn encrypt_mppe_key(key: &[u8], secret: &[u8], request_authenticator: &[u8; 16]) -> Vec<u8> {
    let mut salt = [0u8; 2];
    rand::rng().fill(&mut salt);
    salt[0] |= 0x80;
    encrypt_mppe_key_with_salt(key, secret, request_authenticator, salt)
}

fn encrypt_mppe_key_with_salt(
    key: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
    salt: [u8; 2],
) -> Vec<u8> {
    let mut plain = Vec::with_capacity(key.len() + 16);
    plain.push(key.len() as u8);
    plain.extend_from_slice(key);
    let padded_len = plain.len().div_ceil(16) * 16;
    plain.resize(padded_len, 0);

    let mut out = salt.to_vec();
    let mut chain: Vec<u8> = [request_authenticator.as_slice(), salt.as_slice()].concat();
    for block in plain.chunks(16) {
        let mut data = secret.to_vec();
        data.extend_from_slice(&chain);
        let b = md5::compute(&data);
        let cipher: Vec<u8> = block.iter().zip(b.0.iter()).map(|(p, k)| p ^ k).collect();
        out.extend_from_slice(&cipher);
        chain = cipher;
    }
    out
}

/// Inverse of [`encrypt_mppe_key`]
pub fn decrypt_mppe_key(
    value: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    if value.len() < 18 || (value.len() - 2) % 16 != 0 {
        return Err(PacketError::AttributeError(format!(
            "Invalid MPPE key attribute length: {}",
            value.len()
        )));
    }

    let (salt, cipher) = value.split_at(2);
    let mut plain = Vec::with_capacity(cipher.len());
    let mut chain: Vec<u8> = [request_authenticator.as_slice(), salt].concat();
    for block in cipher.chunks(16) {
        let mut data = secret.to_vec();
        data.extend_from_slice(&chain);
        let b = md5::compute(&data);
        plain.extend(block.iter().zip(b.0.iter()).map(|(c, k)| c ^ k));
        chain = block.to_vec();
    }

    let key_len = plain[0] as usize;
    if key_len + 1 > plain.len() {
        return Err(PacketError::AttributeError(
            "MPPE key length exceeds decrypted data".to_string(),
        ));
    }
    Ok(plain[1..=key_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Code;

    #[test]
    fn test_vendor_attribute_layout() {
        let attr = VendorAttribute::string(VendorId::Mikrotik.as_u32(), 8, "1024k/2048k")
            .to_attribute()
            .unwrap();
        assert_eq!(attr.attr_type, 26);
        assert_eq!(&attr.value[..4], &14988u32.to_be_bytes());
        assert_eq!(attr.value[4], 8);
        assert_eq!(attr.value[5] as usize, 2 + "1024k/2048k".len());
    }

    #[test]
    fn test_find_vendor_attribute() {
        let mut packet = Packet::new(Code::AccessRequest, 1, [0u8; 16]);
        packet.add_attribute(
            VendorAttribute::new(311, microsoft::MS_CHAP_CHALLENGE, vec![7u8; 16])
                .to_attribute()
                .unwrap(),
        );
        assert_eq!(
            find_vendor_attribute(&packet, 311, microsoft::MS_CHAP_CHALLENGE),
            Some(vec![7u8; 16])
        );
        assert_eq!(find_vendor_attribute(&packet, 311, microsoft::MS_CHAP2_RESPONSE), None);
    }

    #[test]
    fn test_parse_rejects_truncated_sub_attribute() {
        let attr = Attribute::new(26, vec![0, 0, 1, 55, 11, 20, 1, 2]).unwrap();
        assert!(VendorAttribute::parse(&attr).is_err());
    }

    #[test]
    fn test_mppe_key_encryption() {
        let key = [0x11u8; 16];
        let secret = b"nastest";
        let auth = [3u8; 16];

        let encrypted = encrypt_mppe_key(&key, secret, &auth);
        assert_eq!(encrypted.len(), 2 + 32);
        assert_eq!(encrypted[0] & 0x80, 0x80);
        assert_eq!(decrypt_mppe_key(&encrypted, secret, &auth).unwrap(), key);
        assert_ne!(decrypt_mppe_key(&encrypted, b"other", &auth).unwrap_or_default(), key);
    }

    #[test]
    fn test_mppe_salt_changes_ciphertext() {
        let key = [0x22u8; 16];
        let a = encrypt_mppe_key_with_salt(&key, b"s", &[0u8; 16], [0x80, 1]);
        let b = encrypt_mppe_key_with_salt(&key, b"s", &[0u8; 16], [0x80, 2]);
        assert_ne!(a[2..], b[2..]);
    }
}
