/// Standard attribute types understood by the server.
///
/// Values outside this list still decode as raw [`super::Attribute`]s; they
/// just have no named constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeType {
    /// User-Name (1) - RFC 2865
    UserName = 1,
    /// User-Password (2) - RFC 2865
    UserPassword = 2,
    /// CHAP-Password (3) - RFC 2865
    ChapPassword = 3,
    /// NAS-IP-Address (4) - RFC 2865
    NasIpAddress = 4,
    /// NAS-Port (5) - RFC 2865
    NasPort = 5,
    /// Service-Type (6) - RFC 2865
    ServiceType = 6,
    /// Framed-Protocol (7) - RFC 2865
    FramedProtocol = 7,
    /// Framed-IP-Address (8) - RFC 2865
    FramedIpAddress = 8,
    /// Framed-IP-Netmask (9) - RFC 2865
    FramedIpNetmask = 9,
    /// Filter-Id (11) - RFC 2865
    FilterId = 11,
    /// Reply-Message (18) - RFC 2865
    ReplyMessage = 18,
    /// State (24) - RFC 2865
    State = 24,
    /// Class (25) - RFC 2865
    Class = 25,
    /// Vendor-Specific (26) - RFC 2865
    VendorSpecific = 26,
    /// Session-Timeout (27) - RFC 2865
    SessionTimeout = 27,
    /// Idle-Timeout (28) - RFC 2865
    IdleTimeout = 28,
    /// Termination-Action (29) - RFC 2865
    TerminationAction = 29,
    /// Called-Station-Id (30) - RFC 2865
    CalledStationId = 30,
    /// Calling-Station-Id (31) - RFC 2865
    CallingStationId = 31,
    /// NAS-Identifier (32) - RFC 2865
    NasIdentifier = 32,
    /// Proxy-State (33) - RFC 2865
    ProxyState = 33,
    /// Acct-Status-Type (40) - RFC 2866
    AcctStatusType = 40,
    /// Acct-Delay-Time (41) - RFC 2866
    AcctDelayTime = 41,
    /// Acct-Input-Octets (42) - RFC 2866
    AcctInputOctets = 42,
    /// Acct-Output-Octets (43) - RFC 2866
    AcctOutputOctets = 43,
    /// Acct-Session-Id (44) - RFC 2866
    AcctSessionId = 44,
    /// Acct-Authentic (45) - RFC 2866
    AcctAuthentic = 45,
    /// Acct-Session-Time (46) - RFC 2866
    AcctSessionTime = 46,
    /// Acct-Input-Packets (47) - RFC 2866
    AcctInputPackets = 47,
    /// Acct-Output-Packets (48) - RFC 2866
    AcctOutputPackets = 48,
    /// Acct-Terminate-Cause (49) - RFC 2866
    AcctTerminateCause = 49,
    /// Acct-Multi-Session-Id (50) - RFC 2866
    AcctMultiSessionId = 50,
    /// Acct-Input-Gigawords (52) - RFC 2869
    /// High 32 bits of the 64-bit input octet counter
    AcctInputGigawords = 52,
    /// Acct-Output-Gigawords (53) - RFC 2869
    AcctOutputGigawords = 53,
    /// Event-Timestamp (55) - RFC 2869
    EventTimestamp = 55,
    /// CHAP-Challenge (60) - RFC 2865
    ChapChallenge = 60,
    /// NAS-Port-Type (61) - RFC 2865
    NasPortType = 61,
    /// EAP-Message (79) - RFC 3579
    EapMessage = 79,
    /// Message-Authenticator (80) - RFC 2869
    MessageAuthenticator = 80,
    /// Acct-Interim-Interval (85) - RFC 2869
    AcctInterimInterval = 85,
    /// NAS-Port-Id (87) - RFC 2869
    NasPortId = 87,
    /// Framed-Pool (88) - RFC 2869
    FramedPool = 88,
    /// NAS-IPv6-Address (95) - RFC 3162
    NasIpv6Address = 95,
    /// Framed-IPv6-Prefix (97) - RFC 3162
    FramedIpv6Prefix = 97,
    /// Delegated-IPv6-Prefix (123) - RFC 4818
    DelegatedIpv6Prefix = 123,
}

impl AttributeType {
    const ALL: [AttributeType; 45] = [
        AttributeType::UserName,
        AttributeType::UserPassword,
        AttributeType::ChapPassword,
        AttributeType::NasIpAddress,
        AttributeType::NasPort,
        AttributeType::ServiceType,
        AttributeType::FramedProtocol,
        AttributeType::FramedIpAddress,
        AttributeType::FramedIpNetmask,
        AttributeType::FilterId,
        AttributeType::ReplyMessage,
        AttributeType::State,
        AttributeType::Class,
        AttributeType::VendorSpecific,
        AttributeType::SessionTimeout,
        AttributeType::IdleTimeout,
        AttributeType::TerminationAction,
        AttributeType::CalledStationId,
        AttributeType::CallingStationId,
        AttributeType::NasIdentifier,
        AttributeType::ProxyState,
        AttributeType::AcctStatusType,
        AttributeType::AcctDelayTime,
        AttributeType::AcctInputOctets,
        AttributeType::AcctOutputOctets,
        AttributeType::AcctSessionId,
        AttributeType::AcctAuthentic,
        AttributeType::AcctSessionTime,
        AttributeType::AcctInputPackets,
        AttributeType::AcctOutputPackets,
        AttributeType::AcctTerminateCause,
        AttributeType::AcctMultiSessionId,
        AttributeType::AcctInputGigawords,
        AttributeType::AcctOutputGigawords,
        AttributeType::EventTimestamp,
        AttributeType::ChapChallenge,
        AttributeType::NasPortType,
        AttributeType::EapMessage,
        AttributeType::MessageAuthenticator,
        AttributeType::AcctInterimInterval,
        AttributeType::NasPortId,
        AttributeType::FramedPool,
        AttributeType::NasIpv6Address,
        AttributeType::FramedIpv6Prefix,
        AttributeType::DelegatedIpv6Prefix,
    ];

    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_u8() == value)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8() {
        assert_eq!(AttributeType::from_u8(79), Some(AttributeType::EapMessage));
        assert_eq!(AttributeType::from_u8(88), Some(AttributeType::FramedPool));
        assert_eq!(AttributeType::from_u8(17), None);
    }
}
