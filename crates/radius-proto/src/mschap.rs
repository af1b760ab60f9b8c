//! MS-CHAPv2 (RFC 2759) and MPPE key derivation (RFC 3079)
//!
//! Shared by EAP-MSCHAPv2 and by plain RADIUS MS-CHAPv2, where the
//! challenge and response travel in Microsoft vendor attributes
//! (RFC 2548).
//!
//! ```rust
//! use radius_proto::mschap::{generate_nt_response, verify_nt_response};
//!
//! let auth = [0x11u8; 16];
//! let peer = [0x22u8; 16];
//! let nt = generate_nt_response(&auth, &peer, "alice", "secret1");
//! assert!(verify_nt_response(&auth, &peer, "alice", "secret1", &nt));
//! ```

use des::Des;
use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use md4::{Digest as _, Md4};
use sha1::Sha1;
use thiserror::Error;

const MAGIC_SERVER_SIGNING: &[u8] = b"Magic server to client signing constant";
const MAGIC_PAD: &[u8] = b"Pad to make it do more than one iteration";
const MAGIC_MASTER_KEY: &[u8] = b"This is the MPPE Master Key";
const MAGIC_CLIENT_SEND: &[u8] =
    b"On the client side, this is the send key; on the server side, it is the receive key.";
const MAGIC_CLIENT_RECV: &[u8] =
    b"On the client side, this is the receive key; on the server side, it is the send key.";
const SHS_PAD1: [u8; 40] = [0x00; 40];
const SHS_PAD2: [u8; 40] = [0xF2; 40];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MsChapError {
    #[error("MS-CHAPv2 response too short: {0} bytes")]
    ResponseTooShort(usize),
    #[error("Unexpected MS-CHAPv2 op-code: {0}")]
    UnexpectedOpCode(u8),
    #[error("Invalid MS-CHAPv2 value size: {0}")]
    InvalidValueSize(u8),
}

/// The fixed 49-byte response value: peer challenge, reserved, NT-Response,
/// flags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsChapV2Response {
    pub peer_challenge: [u8; 16],
    pub nt_response: [u8; 24],
    pub flags: u8,
}

impl MsChapV2Response {
    pub const LEN: usize = 49;

    pub fn from_bytes(value: &[u8]) -> Result<Self, MsChapError> {
        if value.len() < Self::LEN {
            return Err(MsChapError::ResponseTooShort(value.len()));
        }
        let mut peer_challenge = [0u8; 16];
        peer_challenge.copy_from_slice(&value[0..16]);
        let mut nt_response = [0u8; 24];
        nt_response.copy_from_slice(&value[24..48]);
        Ok(MsChapV2Response {
            peer_challenge,
            nt_response,
            flags: value[48],
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.peer_challenge);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&self.nt_response);
        out.push(self.flags);
        out
    }
}

/// MD4 over the UTF-16LE password
pub fn nt_password_hash(password: &str) -> [u8; 16] {
    let unicode: Vec<u8> = password.encode_utf16().flat_map(u16::to_le_bytes).collect();
    md4(&unicode)
}

pub fn hash_nt_password_hash(password_hash: &[u8; 16]) -> [u8; 16] {
    md4(password_hash)
}

fn md4(data: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out.copy_from_slice(&Md4::digest(data));
    out
}

/// Windows clients send `DOMAIN\user`; only the user part is hashed.
fn strip_domain(username: &str) -> &str {
    username.rsplit_once('\\').map_or(username, |(_, user)| user)
}

/// First 8 bytes of SHA1(peer challenge + authenticator challenge + user)
pub fn challenge_hash(
    peer_challenge: &[u8; 16],
    auth_challenge: &[u8; 16],
    username: &str,
) -> [u8; 8] {
    let mut sha = Sha1::new();
    sha.update(peer_challenge);
    sha.update(auth_challenge);
    sha.update(strip_domain(username).as_bytes());
    let digest = sha.finalize();

    let mut out = [0u8; 8];
    out.copy_from_slice(&digest[..8]);
    out
}

/// Spread 56 key bits over 8 bytes, leaving the parity bit clear
fn expand_des_key(key7: &[u8]) -> [u8; 8] {
    [
        key7[0] & 0xFE,
        (key7[0] << 7) | (key7[1] >> 1),
        (key7[1] << 6) | (key7[2] >> 2),
        (key7[2] << 5) | (key7[3] >> 3),
        (key7[3] << 4) | (key7[4] >> 4),
        (key7[4] << 3) | (key7[5] >> 5),
        (key7[5] << 2) | (key7[6] >> 6),
        key7[6] << 1,
    ]
}

/// DES-encrypt the challenge under three keys cut from the zero-padded hash
pub fn challenge_response(challenge: &[u8; 8], password_hash: &[u8; 16]) -> [u8; 24] {
    let mut z_hash = [0u8; 21];
    z_hash[..16].copy_from_slice(password_hash);

    let mut response = [0u8; 24];
    for (key7, out) in z_hash.chunks(7).zip(response.chunks_mut(8)) {
        let key = expand_des_key(key7);
        let cipher = Des::new(GenericArray::from_slice(&key));
        let mut block = GenericArray::clone_from_slice(challenge);
        cipher.encrypt_block(&mut block);
        out.copy_from_slice(&block);
    }
    response
}

pub fn generate_nt_response(
    auth_challenge: &[u8; 16],
    peer_challenge: &[u8; 16],
    username: &str,
    password: &str,
) -> [u8; 24] {
    let challenge = challenge_hash(peer_challenge, auth_challenge, username);
    challenge_response(&challenge, &nt_password_hash(password))
}

pub fn verify_nt_response(
    auth_challenge: &[u8; 16],
    peer_challenge: &[u8; 16],
    username: &str,
    password: &str,
    nt_response: &[u8; 24],
) -> bool {
    let expected = generate_nt_response(auth_challenge, peer_challenge, username, password);
    expected
        .iter()
        .zip(nt_response.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// The `S=<40 hex digits>` string the server returns to prove it knows the
/// password too.
pub fn generate_authenticator_response(
    password: &str,
    nt_response: &[u8; 24],
    peer_challenge: &[u8; 16],
    auth_challenge: &[u8; 16],
    username: &str,
) -> String {
    let password_hash_hash = hash_nt_password_hash(&nt_password_hash(password));

    let mut sha = Sha1::new();
    sha.update(password_hash_hash);
    sha.update(nt_response);
    sha.update(MAGIC_SERVER_SIGNING);
    let digest = sha.finalize();

    let challenge = challenge_hash(peer_challenge, auth_challenge, username);
    let mut sha = Sha1::new();
    sha.update(digest);
    sha.update(challenge);
    sha.update(MAGIC_PAD);
    let digest = sha.finalize();

    let hex: String = digest.iter().map(|b| format!("{:02X}", b)).collect();
    format!("S={}", hex)
}

/// RFC 3079 Section 3.4
pub fn get_master_key(password_hash_hash: &[u8; 16], nt_response: &[u8; 24]) -> [u8; 16] {
    let mut sha = Sha1::new();
    sha.update(password_hash_hash);
    sha.update(nt_response);
    sha.update(MAGIC_MASTER_KEY);
    let digest = sha.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// RFC 3079 Section 3.4, 128-bit keys
pub fn get_asymmetric_start_key(master_key: &[u8; 16], is_send: bool, is_server: bool) -> [u8; 16] {
    let magic = if is_send == is_server {
        MAGIC_CLIENT_RECV
    } else {
        MAGIC_CLIENT_SEND
    };

    let mut sha = Sha1::new();
    sha.update(master_key);
    sha.update(SHS_PAD1);
    sha.update(magic);
    sha.update(SHS_PAD2);
    let digest = sha.finalize();

    let mut key = [0u8; 16];
    key.copy_from_slice(&digest[..16]);
    key
}

/// Server-side MPPE session keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MppeKeys {
    pub send_key: [u8; 16],
    pub recv_key: [u8; 16],
}

pub fn derive_mppe_keys(password: &str, nt_response: &[u8; 24]) -> MppeKeys {
    let password_hash_hash = hash_nt_password_hash(&nt_password_hash(password));
    let master_key = get_master_key(&password_hash_hash, nt_response);
    MppeKeys {
        send_key: get_asymmetric_start_key(&master_key, true, true),
        recv_key: get_asymmetric_start_key(&master_key, false, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    fn arr16(s: &str) -> [u8; 16] {
        unhex(s).try_into().unwrap()
    }

    // RFC 2759 Section 9.2
    const USER: &str = "User";
    const PASSWORD: &str = "clientPass";
    const AUTH_CHALLENGE: &str = "5B5D7C7D7B3F2F3E3C2C602132262628";
    const PEER_CHALLENGE: &str = "21402324255E262A28295F2B3A337C7E";
    const NT_RESPONSE: &str = "82309ECD8D708B5EA08FAA3981CD83544233114A3D85D6DF";

    #[test]
    fn test_rfc2759_password_hashes() {
        assert_eq!(nt_password_hash(PASSWORD), arr16("44EBBA8D5312B8D611474411F56989AE"));
        assert_eq!(
            hash_nt_password_hash(&nt_password_hash(PASSWORD)),
            arr16("41C00C584BD2D91C4017A2A12FA59F3F")
        );
    }

    #[test]
    fn test_rfc2759_challenge_hash() {
        let challenge = challenge_hash(&arr16(PEER_CHALLENGE), &arr16(AUTH_CHALLENGE), USER);
        assert_eq!(challenge.to_vec(), unhex("D02E4386BCE91226"));
    }

    #[test]
    fn test_rfc2759_nt_response() {
        let nt = generate_nt_response(&arr16(AUTH_CHALLENGE), &arr16(PEER_CHALLENGE), USER, PASSWORD);
        assert_eq!(nt.to_vec(), unhex(NT_RESPONSE));

        let mut tampered = nt;
        tampered[5] ^= 0x80;
        assert!(!verify_nt_response(
            &arr16(AUTH_CHALLENGE),
            &arr16(PEER_CHALLENGE),
            USER,
            PASSWORD,
            &tampered
        ));
    }

    #[test]
    fn test_rfc2759_authenticator_response() {
        let nt: [u8; 24] = unhex(NT_RESPONSE).try_into().unwrap();
        let response = generate_authenticator_response(
            PASSWORD,
            &nt,
            &arr16(PEER_CHALLENGE),
            &arr16(AUTH_CHALLENGE),
            USER,
        );
        assert_eq!(response, "S=407A5589115FD0D6209F510FE9C04566932CDA56");
    }

    #[test]
    fn test_rfc3079_master_key() {
        let nt: [u8; 24] = unhex(NT_RESPONSE).try_into().unwrap();
        let phh = hash_nt_password_hash(&nt_password_hash(PASSWORD));
        assert_eq!(get_master_key(&phh, &nt), arr16("FDECE3717A8C838CB388E527AE3CDD31"));
    }

    #[test]
    fn test_mppe_keys_distinct() {
        let nt: [u8; 24] = unhex(NT_RESPONSE).try_into().unwrap();
        let keys = derive_mppe_keys(PASSWORD, &nt);
        assert_ne!(keys.send_key, [0u8; 16]);
        assert_ne!(keys.recv_key, [0u8; 16]);
        assert_ne!(keys.send_key, keys.recv_key);
    }

    #[test]
    fn test_domain_is_stripped() {
        let a = challenge_hash(&[1u8; 16], &[2u8; 16], "CORP\\User");
        let b = challenge_hash(&[1u8; 16], &[2u8; 16], "User");
        assert_eq!(a, b);
    }

    #[test]
    fn test_response_value_layout() {
        let value = MsChapV2Response {
            peer_challenge: [1u8; 16],
            nt_response: [2u8; 24],
            flags: 0,
        }
        .to_bytes();
        assert_eq!(value.len(), MsChapV2Response::LEN);
        assert_eq!(&value[16..24], &[0u8; 8]);

        let parsed = MsChapV2Response::from_bytes(&value).unwrap();
        assert_eq!(parsed.nt_response, [2u8; 24]);
        assert!(MsChapV2Response::from_bytes(&value[..48]).is_err());
    }
}
