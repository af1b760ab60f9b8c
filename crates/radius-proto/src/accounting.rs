//! RADIUS Accounting values (RFC 2866)
//!
//! ```rust
//! use radius_proto::accounting::{AcctStatusType, AcctTerminateCause};
//!
//! assert_eq!(AcctStatusType::from_u32(3), Some(AcctStatusType::InterimUpdate));
//! assert_eq!(AcctTerminateCause::UserRequest.as_u32(), 1);
//! ```

use crate::attributes::AttributeType;
use crate::packet::Packet;

/// Acct-Status-Type (RFC 2866 Section 5.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AcctStatusType {
    Start = 1,
    Stop = 2,
    InterimUpdate = 3,
    /// NAS came up; all of its previous sessions are gone
    AccountingOn = 7,
    /// NAS is going down
    AccountingOff = 8,
}

impl AcctStatusType {
    pub fn from_u32(value: u32) -> Option<Self> {
        let status = match value {
            1 => AcctStatusType::Start,
            2 => AcctStatusType::Stop,
            3 => AcctStatusType::InterimUpdate,
            7 => AcctStatusType::AccountingOn,
            8 => AcctStatusType::AccountingOff,
            _ => return None,
        };
        Some(status)
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AcctStatusType::Start => "start",
            AcctStatusType::Stop => "stop",
            AcctStatusType::InterimUpdate => "interim-update",
            AcctStatusType::AccountingOn => "accounting-on",
            AcctStatusType::AccountingOff => "accounting-off",
        }
    }

    pub fn is_nas_status(self) -> bool {
        matches!(self, AcctStatusType::AccountingOn | AcctStatusType::AccountingOff)
    }
}

/// Acct-Terminate-Cause (RFC 2866 Section 5.10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AcctTerminateCause {
    UserRequest = 1,
    LostCarrier = 2,
    LostService = 3,
    IdleTimeout = 4,
    SessionTimeout = 5,
    AdminReset = 6,
    AdminReboot = 7,
    PortError = 8,
    NasError = 9,
    NasRequest = 10,
    NasReboot = 11,
    PortUnneeded = 12,
    PortPreempted = 13,
    PortSuspended = 14,
    ServiceUnavailable = 15,
    Callback = 16,
    UserError = 17,
    HostRequest = 18,
}

impl AcctTerminateCause {
    const ALL: [AcctTerminateCause; 18] = [
        AcctTerminateCause::UserRequest,
        AcctTerminateCause::LostCarrier,
        AcctTerminateCause::LostService,
        AcctTerminateCause::IdleTimeout,
        AcctTerminateCause::SessionTimeout,
        AcctTerminateCause::AdminReset,
        AcctTerminateCause::AdminReboot,
        AcctTerminateCause::PortError,
        AcctTerminateCause::NasError,
        AcctTerminateCause::NasRequest,
        AcctTerminateCause::NasReboot,
        AcctTerminateCause::PortUnneeded,
        AcctTerminateCause::PortPreempted,
        AcctTerminateCause::PortSuspended,
        AcctTerminateCause::ServiceUnavailable,
        AcctTerminateCause::Callback,
        AcctTerminateCause::UserError,
        AcctTerminateCause::HostRequest,
    ];

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_u32() == value)
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Usage counters reported by one Accounting-Request.
///
/// Octet counts fold in the RFC 2869 gigaword attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcctCounters {
    pub session_time: u32,
    pub input_octets: u64,
    pub output_octets: u64,
    pub input_packets: u32,
    pub output_packets: u32,
}

impl AcctCounters {
    pub fn from_packet(packet: &Packet) -> Self {
        let int = |t: AttributeType| packet.get_integer(t).unwrap_or(0);
        let octets = |low: AttributeType, high: AttributeType| {
            (u64::from(int(high)) << 32) | u64::from(int(low))
        };

        AcctCounters {
            session_time: int(AttributeType::AcctSessionTime),
            input_octets: octets(AttributeType::AcctInputOctets, AttributeType::AcctInputGigawords),
            output_octets: octets(
                AttributeType::AcctOutputOctets,
                AttributeType::AcctOutputGigawords,
            ),
            input_packets: int(AttributeType::AcctInputPackets),
            output_packets: int(AttributeType::AcctOutputPackets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attribute;
    use crate::packet::Code;

    #[test]
    fn test_status_type_conversion() {
        assert_eq!(AcctStatusType::from_u32(7), Some(AcctStatusType::AccountingOn));
        assert_eq!(AcctStatusType::from_u32(4), None);
        assert!(AcctStatusType::AccountingOff.is_nas_status());
        assert!(!AcctStatusType::Stop.is_nas_status());
    }

    #[test]
    fn test_terminate_cause_conversion() {
        assert_eq!(AcctTerminateCause::from_u32(6), Some(AcctTerminateCause::AdminReset));
        assert_eq!(AcctTerminateCause::from_u32(0), None);
        assert_eq!(AcctTerminateCause::from_u32(19), None);
    }

    #[test]
    fn test_counters_fold_gigawords() {
        let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
        packet.add_attribute(Attribute::integer(42, 10).unwrap());
        packet.add_attribute(Attribute::integer(52, 2).unwrap());
        packet.add_attribute(Attribute::integer(43, 5).unwrap());
        packet.add_attribute(Attribute::integer(46, 600).unwrap());

        let counters = AcctCounters::from_packet(&packet);
        assert_eq!(counters.input_octets, (2u64 << 32) + 10);
        assert_eq!(counters.output_octets, 5);
        assert_eq!(counters.session_time, 600);
        assert_eq!(counters.input_packets, 0);
    }
}
