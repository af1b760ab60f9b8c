use super::Code;
use crate::attributes::{Attribute, AttributeType};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PacketError {
    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),
    #[error("Invalid packet code: {0}")]
    InvalidCode(u8),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Attribute error: {0}")]
    AttributeError(String),
    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// RADIUS packet (RFC 2865 Section 3)
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |     Code      |  Identifier   |            Length             |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         Authenticator                         |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |  Attributes ...
/// +-+-+-+-+-+-+-+-+-+-+-+-+-
/// ```
#[derive(Debug, Clone)]
pub struct Packet {
    pub code: Code,
    pub identifier: u8,
    /// Request or Response Authenticator depending on `code`
    pub authenticator: [u8; 16],
    pub attributes: Vec<Attribute>,
}

impl Packet {
    /// Header only: code, identifier, length, authenticator
    pub const MIN_PACKET_SIZE: usize = 20;
    /// RFC 2865 upper bound
    pub const MAX_PACKET_SIZE: usize = 4096;

    pub fn new(code: Code, identifier: u8, authenticator: [u8; 16]) -> Self {
        Packet {
            code,
            identifier,
            authenticator,
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// Serialize the packet, filling in the Length field
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let total_length = self.length();
        if total_length > Self::MAX_PACKET_SIZE {
            return Err(PacketError::PacketTooLarge(total_length));
        }

        let mut buffer = Vec::with_capacity(total_length);
        buffer.push(self.code.as_u8());
        buffer.push(self.identifier);
        buffer.extend_from_slice(&(total_length as u16).to_be_bytes());
        buffer.extend_from_slice(&self.authenticator);
        for attr in &self.attributes {
            buffer.extend_from_slice(&attr.encode()?);
        }

        Ok(buffer)
    }

    /// Parse a datagram. Bytes past the Length field are ignored as
    /// RFC 2865 requires.
    pub fn decode(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < Self::MIN_PACKET_SIZE {
            return Err(PacketError::InvalidLength(data.len()));
        }

        let code = Code::from_u8(data[0]).ok_or(PacketError::InvalidCode(data[0]))?;
        let identifier = data[1];
        let length = u16::from_be_bytes([data[2], data[3]]) as usize;

        if !(Self::MIN_PACKET_SIZE..=Self::MAX_PACKET_SIZE).contains(&length) || data.len() < length
        {
            return Err(PacketError::InvalidLength(length));
        }

        let mut authenticator = [0u8; 16];
        authenticator.copy_from_slice(&data[4..20]);

        let mut attributes = Vec::new();
        let mut rest = &data[Self::MIN_PACKET_SIZE..length];
        while !rest.is_empty() {
            let attr = Attribute::decode(rest)?;
            rest = &rest[attr.encoded_length()..];
            attributes.push(attr);
        }

        Ok(Packet {
            code,
            identifier,
            authenticator,
            attributes,
        })
    }

    /// Encoded length including the header
    pub fn length(&self) -> usize {
        Self::MIN_PACKET_SIZE
            + self
                .attributes
                .iter()
                .map(Attribute::encoded_length)
                .sum::<usize>()
    }

    /// First attribute of the given type
    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }

    pub fn find_all_attributes(&self, attr_type: u8) -> Vec<&Attribute> {
        self.attributes
            .iter()
            .filter(|a| a.attr_type == attr_type)
            .collect()
    }

    pub fn has_attribute(&self, attr_type: AttributeType) -> bool {
        self.find_attribute(attr_type.as_u8()).is_some()
    }

    /// Lossy UTF-8 value of a text attribute, trimmed of trailing NULs
    pub fn get_string(&self, attr_type: AttributeType) -> Option<String> {
        self.find_attribute(attr_type.as_u8()).map(|a| {
            String::from_utf8_lossy(&a.value)
                .trim_end_matches('\0')
                .to_string()
        })
    }

    pub fn get_integer(&self, attr_type: AttributeType) -> Option<u32> {
        self.find_attribute(attr_type.as_u8())
            .and_then(|a| a.as_integer().ok())
    }

    pub fn get_ipv4(&self, attr_type: AttributeType) -> Option<std::net::Ipv4Addr> {
        self.find_attribute(attr_type.as_u8())
            .and_then(|a| a.as_ipv4().ok())
            .map(std::net::Ipv4Addr::from)
    }

    /// Replace every attribute of this type with a single new value
    pub fn set_attribute(&mut self, attribute: Attribute) {
        self.attributes.retain(|a| a.attr_type != attribute.attr_type);
        self.attributes.push(attribute);
    }

    /// Byte offset of the first value of `attr_type` in the encoded packet
    pub fn attribute_value_offset(&self, attr_type: u8) -> Option<usize> {
        let mut offset = Self::MIN_PACKET_SIZE;
        for attr in &self.attributes {
            if attr.attr_type == attr_type {
                return Some(offset + Attribute::MIN_LENGTH);
            }
            offset += attr.encoded_length();
        }
        None
    }
}
