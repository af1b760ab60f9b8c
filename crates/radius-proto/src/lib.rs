//! RADIUS and EAP wire protocol
//!
//! Packet and attribute codecs for RFC 2865/2866/2869, EAP over RADIUS
//! (RFC 3579), and the authenticator, password-hiding, CHAP, MS-CHAPv2 and
//! MPPE key algorithms an AAA server needs to answer requests.
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//! use radius_proto::auth::{encrypt_user_password, generate_request_authenticator};
//!
//! let req_auth = generate_request_authenticator();
//! let mut packet = Packet::new(Code::AccessRequest, 1, req_auth);
//! packet.add_attribute(Attribute::string(AttributeType::UserName.as_u8(), "alice").unwrap());
//!
//! let hidden = encrypt_user_password("secret1", b"nastest", &req_auth);
//! packet.add_attribute(Attribute::new(AttributeType::UserPassword.as_u8(), hidden).unwrap());
//!
//! let bytes = packet.encode().unwrap();
//! assert_eq!(Packet::decode(&bytes).unwrap().identifier, 1);
//! ```

pub mod accounting;
pub mod attributes;
pub mod auth;
pub mod chap;
pub mod eap;
pub mod message_auth;
pub mod mschap;
pub mod packet;

pub use accounting::{AcctCounters, AcctStatusType, AcctTerminateCause};
pub use attributes::{Attribute, AttributeType, VendorAttribute, VendorId};
pub use auth::{
    calculate_accounting_request_authenticator, calculate_response_authenticator,
    decrypt_user_password, encode_response, encode_signed_request, encrypt_user_password,
    generate_request_authenticator, verify_accounting_request_authenticator,
    verify_response_authenticator,
};
pub use chap::{ChapError, ChapResponse, compute_chap_response, verify_chap_response};
pub use eap::{EapCode, EapError, EapPacket, EapType};
pub use message_auth::{
    calculate_message_authenticator, verify_message_authenticator,
    verify_request_message_authenticator,
};
pub use mschap::{MppeKeys, MsChapError, MsChapV2Response};
pub use packet::{Code, Packet, PacketError};
