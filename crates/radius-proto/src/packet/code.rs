/// RADIUS packet codes (RFC 2865 Section 4, RFC 2866, RFC 5176)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Code {
    /// Access-Request (1)
    AccessRequest = 1,
    /// Access-Accept (2)
    AccessAccept = 2,
    /// Access-Reject (3)
    AccessReject = 3,
    /// Accounting-Request (4) - RFC 2866
    AccountingRequest = 4,
    /// Accounting-Response (5) - RFC 2866
    AccountingResponse = 5,
    /// Access-Challenge (11)
    AccessChallenge = 11,
    /// Disconnect-Request (40) - RFC 5176
    DisconnectRequest = 40,
    /// Disconnect-ACK (41) - RFC 5176
    DisconnectAck = 41,
    /// Disconnect-NAK (42) - RFC 5176
    DisconnectNak = 42,
}

impl Code {
    pub fn from_u8(value: u8) -> Option<Self> {
        let code = match value {
            1 => Code::AccessRequest,
            2 => Code::AccessAccept,
            3 => Code::AccessReject,
            4 => Code::AccountingRequest,
            5 => Code::AccountingResponse,
            11 => Code::AccessChallenge,
            40 => Code::DisconnectRequest,
            41 => Code::DisconnectAck,
            42 => Code::DisconnectNak,
            _ => return None,
        };
        Some(code)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Whether a server answers this code (as opposed to sending it)
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Code::AccessRequest | Code::AccountingRequest | Code::DisconnectRequest
        )
    }
}
