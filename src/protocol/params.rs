use std::fmt;
use std::str::FromStr;

use super::consts::{PKT_ESCO_MASK, PKT_SCO_MASK, STATUS_SUCCESS};
use crate::error::PacketError;

/// A Bluetooth device address, stored most-significant byte first
/// (the order it is written and displayed, e.g. `AA:BB:CC:DD:EE:FF`).
///
/// HCI carries addresses least-significant byte first; use
/// [`DeviceAddress::from_wire`] / [`DeviceAddress::to_wire`] at the packet
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    /// Build from the 6 little-endian bytes found in an HCI packet.
    pub fn from_wire(bytes: [u8; 6]) -> Self {
        let mut addr = bytes;
        addr.reverse();
        Self(addr)
    }

    /// Serialize to the little-endian byte order HCI expects.
    pub fn to_wire(self) -> [u8; 6] {
        let mut addr = self.0;
        addr.reverse();
        addr
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = PacketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut addr = [0u8; 6];
        let mut parts = s.split(':');
        for byte in addr.iter_mut() {
            let part = parts.next().ok_or(PacketError::InvalidAddress)?;
            *byte = u8::from_str_radix(part, 16).map_err(|_| PacketError::InvalidAddress)?;
        }
        if parts.next().is_some() {
            return Err(PacketError::InvalidAddress);
        }
        Ok(Self(addr))
    }
}

/// Link type reported in connection-request and synchronous-connection-
/// complete events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkType {
    Sco = 0x00,
    Acl = 0x01,
    Esco = 0x02,
}

impl LinkType {
    pub fn from_wire(value: u8) -> Result<Self, PacketError> {
        match value {
            0x00 => Ok(Self::Sco),
            0x01 => Ok(Self::Acl),
            0x02 => Ok(Self::Esco),
            other => Err(PacketError::InvalidLinkType(other)),
        }
    }

    /// Whether this is one of the two synchronous link types.
    pub fn is_synchronous(self) -> bool {
        matches!(self, Self::Sco | Self::Esco)
    }
}

impl fmt::Display for LinkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sco => "SCO",
            Self::Acl => "ACL",
            Self::Esco => "eSCO",
        };
        write!(f, "{}", name)
    }
}

/// An HCI status code. `0x00` is success; everything else is a
/// controller-reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub u8);

impl StatusCode {
    pub const SUCCESS: StatusCode = StatusCode(STATUS_SUCCESS);

    pub fn is_success(self) -> bool {
        self.0 == STATUS_SUCCESS
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x00 => write!(f, "success"),
            0x02 => write!(f, "unknown connection identifier (0x02)"),
            0x08 => write!(f, "connection timeout (0x08)"),
            0x0D => write!(f, "rejected, limited resources (0x0D)"),
            0x11 => write!(f, "unsupported feature or parameter (0x11)"),
            0x1F => write!(f, "unspecified error (0x1F)"),
            other => write!(f, "error 0x{:02X}", other),
        }
    }
}

/// One candidate parameter set for a synchronous (SCO/eSCO) link.
///
/// Candidates are tried in order until the controller accepts one; the
/// `packet_types` bitmask decides which requested link types a candidate
/// can serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConnectionParams {
    /// Transmit bandwidth in octets per second.
    pub tx_bandwidth: u32,
    /// Receive bandwidth in octets per second.
    pub rx_bandwidth: u32,
    /// Maximum permitted latency in milliseconds.
    pub max_latency: u16,
    /// Voice setting / air coding format field.
    pub voice_setting: u16,
    /// Retransmission effort (0x00 none .. 0x02 quality, 0xFF don't care).
    pub retransmission_effort: u8,
    /// Allowed synchronous packet types (`PKT_*` bits).
    pub packet_types: u16,
}

impl SyncConnectionParams {
    /// Whether this candidate can serve a link of the given type.
    pub fn supports_link_type(&self, link_type: LinkType) -> bool {
        match link_type {
            LinkType::Sco => self.packet_types & PKT_SCO_MASK != 0,
            LinkType::Esco => self.packet_types & PKT_ESCO_MASK != 0,
            LinkType::Acl => false,
        }
    }

    /// Append the parameter block in HCI wire order.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.tx_bandwidth.to_le_bytes());
        out.extend_from_slice(&self.rx_bandwidth.to_le_bytes());
        out.extend_from_slice(&self.max_latency.to_le_bytes());
        out.extend_from_slice(&self.voice_setting.to_le_bytes());
        out.push(self.retransmission_effort);
        out.extend_from_slice(&self.packet_types.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::consts::{PKT_EV3, PKT_HV1, PKT_HV3};

    #[test]
    fn test_address_display_roundtrip() {
        let addr: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(addr.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_address_wire_order_reversed() {
        let addr: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(addr.to_wire(), [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(DeviceAddress::from_wire(addr.to_wire()), addr);
    }

    #[test]
    fn test_address_parse_rejects_garbage() {
        assert!("AA:BB:CC".parse::<DeviceAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:FF:00".parse::<DeviceAddress>().is_err());
        assert!("AA:BB:CC:DD:EE:ZZ".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn test_link_type_from_wire() {
        assert_eq!(LinkType::from_wire(0x00).unwrap(), LinkType::Sco);
        assert_eq!(LinkType::from_wire(0x02).unwrap(), LinkType::Esco);
        assert!(LinkType::from_wire(0x07).is_err());
        assert!(!LinkType::Acl.is_synchronous());
        assert!(LinkType::Esco.is_synchronous());
    }

    #[test]
    fn test_supports_link_type_by_packet_mask() {
        let sco_only = SyncConnectionParams {
            tx_bandwidth: 8000,
            rx_bandwidth: 8000,
            max_latency: 10,
            voice_setting: 0x0060,
            retransmission_effort: 0x00,
            packet_types: PKT_HV1 | PKT_HV3,
        };
        assert!(sco_only.supports_link_type(LinkType::Sco));
        assert!(!sco_only.supports_link_type(LinkType::Esco));

        let esco = SyncConnectionParams {
            packet_types: PKT_EV3,
            ..sco_only.clone()
        };
        assert!(esco.supports_link_type(LinkType::Esco));
        assert!(!esco.supports_link_type(LinkType::Sco));
        assert!(!esco.supports_link_type(LinkType::Acl));
    }

    #[test]
    fn test_params_encoding_is_little_endian() {
        let params = SyncConnectionParams {
            tx_bandwidth: 0x0000_1F40,
            rx_bandwidth: 0x0000_1F40,
            max_latency: 0x000A,
            voice_setting: 0x0060,
            retransmission_effort: 0x01,
            packet_types: PKT_EV3,
        };
        let mut out = Vec::new();
        params.encode_into(&mut out);
        assert_eq!(
            out,
            vec![
                0x40, 0x1F, 0x00, 0x00, // tx_bandwidth
                0x40, 0x1F, 0x00, 0x00, // rx_bandwidth
                0x0A, 0x00, // max_latency
                0x60, 0x00, // voice_setting
                0x01, // retransmission_effort
                0x08, 0x00, // packet_types
            ]
        );
    }
}
