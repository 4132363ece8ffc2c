use std::fmt;

use super::consts::{EVT_COMMAND_COMPLETE, EVT_COMMAND_STATUS, EVT_LE_META};
use super::params::{DeviceAddress, LinkType, StatusCode};
use crate::error::PacketError;

/// An outgoing HCI command packet.
///
/// Wire format:
/// ```text
/// [opcode: 2 bytes LE] [parameter length: 1 byte] [parameters...]
/// ```
#[derive(Debug, Clone)]
pub struct CommandPacket {
    opcode: u16,
    payload: Vec<u8>,
}

impl CommandPacket {
    /// Create a command with no parameters.
    pub fn new(opcode: u16) -> Self {
        Self {
            opcode,
            payload: Vec::new(),
        }
    }

    /// Create a command with a pre-built parameter block.
    pub fn with_payload(opcode: u16, payload: Vec<u8>) -> Self {
        Self { opcode, payload }
    }

    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Serialize for transmission. Fails if the parameter block exceeds the
    /// 255-byte length field.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PacketError> {
        let len = u8::try_from(self.payload.len()).map_err(|_| PacketError::CommandTooLong {
            opcode: self.opcode,
            len: self.payload.len(),
        })?;
        let mut out = Vec::with_capacity(3 + self.payload.len());
        out.extend_from_slice(&self.opcode.to_le_bytes());
        out.push(len);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

impl fmt::Display for CommandPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd 0x{:04X} ({} bytes)", self.opcode, self.payload.len())
    }
}

/// A decoded incoming HCI event packet.
///
/// Wire format:
/// ```text
/// [event code: 1 byte] [parameter length: 1 byte] [parameters...]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventPacket {
    code: u8,
    payload: Vec<u8>,
}

/// Decoded payload of a command-complete event.
#[derive(Debug, Clone)]
pub struct CommandComplete {
    pub num_hci_command_packets: u8,
    /// Opcode of the command this event completes.
    pub opcode: u16,
    /// Command-specific return parameters; for most commands the first byte
    /// is a status code.
    pub return_params: Vec<u8>,
}

impl CommandComplete {
    /// Status byte, when the return parameters carry one.
    pub fn status(&self) -> Option<StatusCode> {
        self.return_params.first().map(|&b| StatusCode(b))
    }
}

/// Decoded payload of a command-status event.
#[derive(Debug, Clone, Copy)]
pub struct CommandStatus {
    pub status: StatusCode,
    pub num_hci_command_packets: u8,
    /// Opcode of the command this event reports on.
    pub opcode: u16,
}

/// Decoded payload of a connection-request event.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionRequest {
    pub addr: DeviceAddress,
    pub class_of_device: [u8; 3],
    pub link_type: LinkType,
}

/// Decoded payload of a synchronous-connection-complete event.
#[derive(Debug, Clone)]
pub struct SyncConnectionComplete {
    pub status: StatusCode,
    pub handle: u16,
    pub addr: DeviceAddress,
    /// Left as a `Result` so callers can tell a bad link-type byte apart
    /// from a well-formed completion.
    pub link_type: Result<LinkType, PacketError>,
}

impl EventPacket {
    /// Build an event packet from already-validated parts. Used by the
    /// transport after deframing and by tests.
    pub fn new(code: u8, payload: Vec<u8>) -> Self {
        Self { code, payload }
    }

    /// Parse an event from raw bytes, rejecting any frame whose payload size
    /// disagrees with the declared length.
    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        if data.len() < 2 {
            return Err(PacketError::Truncated { have: data.len() });
        }
        let declared = data[1] as usize;
        if data.len() - 2 != declared {
            return Err(PacketError::LengthMismatch {
                declared,
                actual: data.len() - 2,
            });
        }
        Ok(Self {
            code: data[0],
            payload: data[2..].to_vec(),
        })
    }

    pub fn code(&self) -> u8 {
        self.code
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Subevent code of an LE-meta event, if this is one.
    pub fn le_meta_subevent(&self) -> Option<u8> {
        if self.code == EVT_LE_META {
            self.payload.first().copied()
        } else {
            None
        }
    }

    /// Decode as a command-complete event.
    pub fn to_command_complete(&self) -> Result<CommandComplete, PacketError> {
        if self.code != EVT_COMMAND_COMPLETE {
            return Err(PacketError::WrongEventCode {
                expected: EVT_COMMAND_COMPLETE,
                actual: self.code,
            });
        }
        if self.payload.len() < 3 {
            return Err(PacketError::Truncated {
                have: self.payload.len(),
            });
        }
        Ok(CommandComplete {
            num_hci_command_packets: self.payload[0],
            opcode: u16::from_le_bytes([self.payload[1], self.payload[2]]),
            return_params: self.payload[3..].to_vec(),
        })
    }

    /// Decode as a command-status event.
    pub fn to_command_status(&self) -> Result<CommandStatus, PacketError> {
        if self.code != EVT_COMMAND_STATUS {
            return Err(PacketError::WrongEventCode {
                expected: EVT_COMMAND_STATUS,
                actual: self.code,
            });
        }
        if self.payload.len() < 4 {
            return Err(PacketError::Truncated {
                have: self.payload.len(),
            });
        }
        Ok(CommandStatus {
            status: StatusCode(self.payload[0]),
            num_hci_command_packets: self.payload[1],
            opcode: u16::from_le_bytes([self.payload[2], self.payload[3]]),
        })
    }

    /// Decode as a connection-request event (BD_ADDR, class of device,
    /// requested link type).
    pub fn to_connection_request(&self) -> Result<ConnectionRequest, PacketError> {
        if self.payload.len() < 10 {
            return Err(PacketError::Truncated {
                have: self.payload.len(),
            });
        }
        let mut wire_addr = [0u8; 6];
        wire_addr.copy_from_slice(&self.payload[0..6]);
        let mut class = [0u8; 3];
        class.copy_from_slice(&self.payload[6..9]);
        Ok(ConnectionRequest {
            addr: DeviceAddress::from_wire(wire_addr),
            class_of_device: class,
            link_type: LinkType::from_wire(self.payload[9])?,
        })
    }

    /// Decode as a synchronous-connection-complete event.
    pub fn to_sync_connection_complete(&self) -> Result<SyncConnectionComplete, PacketError> {
        if self.payload.len() < 10 {
            return Err(PacketError::Truncated {
                have: self.payload.len(),
            });
        }
        let mut wire_addr = [0u8; 6];
        wire_addr.copy_from_slice(&self.payload[3..9]);
        Ok(SyncConnectionComplete {
            status: StatusCode(self.payload[0]),
            handle: u16::from_le_bytes([self.payload[1], self.payload[2]]),
            addr: DeviceAddress::from_wire(wire_addr),
            link_type: LinkType::from_wire(self.payload[9]),
        })
    }
}

impl fmt::Display for EventPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "evt 0x{:02X} ({} bytes)", self.code, self.payload.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::consts::*;

    #[test]
    fn test_command_wire_format() {
        let cmd = CommandPacket::new(OP_RESET);
        // Reset opcode 0x0C03 little-endian, zero-length parameter block
        assert_eq!(cmd.to_bytes().unwrap(), vec![0x03, 0x0C, 0x00]);

        let cmd = CommandPacket::with_payload(0x1234, vec![0xAA, 0xBB]);
        assert_eq!(cmd.to_bytes().unwrap(), vec![0x34, 0x12, 0x02, 0xAA, 0xBB]);
    }

    #[test]
    fn test_command_too_long() {
        let cmd = CommandPacket::with_payload(OP_RESET, vec![0u8; 256]);
        assert!(matches!(
            cmd.to_bytes(),
            Err(PacketError::CommandTooLong { .. })
        ));
    }

    #[test]
    fn test_event_length_validation() {
        // declared length 2, actual payload 1
        assert!(matches!(
            EventPacket::from_bytes(&[0x0E, 0x02, 0x01]),
            Err(PacketError::LengthMismatch { .. })
        ));
        assert!(matches!(
            EventPacket::from_bytes(&[0x0E]),
            Err(PacketError::Truncated { .. })
        ));
        let evt = EventPacket::from_bytes(&[0x0E, 0x01, 0x05]).unwrap();
        assert_eq!(evt.code(), EVT_COMMAND_COMPLETE);
        assert_eq!(evt.payload(), &[0x05]);
    }

    #[test]
    fn test_command_complete_view() {
        // num_packets=1, opcode=0x0C03, status=0x00
        let evt = EventPacket::from_bytes(&[0x0E, 0x04, 0x01, 0x03, 0x0C, 0x00]).unwrap();
        let cc = evt.to_command_complete().unwrap();
        assert_eq!(cc.opcode, OP_RESET);
        assert_eq!(cc.num_hci_command_packets, 1);
        assert_eq!(cc.status(), Some(StatusCode::SUCCESS));
    }

    #[test]
    fn test_command_status_view() {
        // status=0x0D, num_packets=1, opcode=0x0428
        let evt = EventPacket::from_bytes(&[0x0F, 0x04, 0x0D, 0x01, 0x28, 0x04]).unwrap();
        let cs = evt.to_command_status().unwrap();
        assert_eq!(cs.opcode, OP_SETUP_SYNC_CONNECTION);
        assert!(!cs.status.is_success());
        assert_eq!(cs.status.0, STATUS_REJECTED_LIMITED_RESOURCES);
    }

    #[test]
    fn test_view_rejects_wrong_event_code() {
        let evt = EventPacket::new(EVT_COMMAND_STATUS, vec![0x00, 0x01, 0x03, 0x0C]);
        assert!(evt.to_command_complete().is_err());
        assert!(evt.to_command_status().is_ok());
    }

    #[test]
    fn test_connection_request_view() {
        let addr: DeviceAddress = "11:22:33:44:55:66".parse().unwrap();
        let mut payload = addr.to_wire().to_vec();
        payload.extend_from_slice(&[0x00, 0x1F, 0x00]); // class of device
        payload.push(0x02); // eSCO
        let evt = EventPacket::new(EVT_CONNECTION_REQUEST, payload);
        let req = evt.to_connection_request().unwrap();
        assert_eq!(req.addr, addr);
        assert_eq!(req.link_type, LinkType::Esco);
    }

    #[test]
    fn test_sync_connection_complete_view() {
        let addr: DeviceAddress = "11:22:33:44:55:66".parse().unwrap();
        let mut payload = vec![0x00, 0x42, 0x00]; // status, handle 0x0042
        payload.extend_from_slice(&addr.to_wire());
        payload.push(0x00); // SCO
        payload.extend_from_slice(&[0x06, 0x04, 0x3C, 0x00, 0x3C, 0x00, 0x02]);
        let evt = EventPacket::new(EVT_SYNC_CONNECTION_COMPLETE, payload);
        let complete = evt.to_sync_connection_complete().unwrap();
        assert!(complete.status.is_success());
        assert_eq!(complete.handle, 0x0042);
        assert_eq!(complete.addr, addr);
        assert_eq!(complete.link_type.unwrap(), LinkType::Sco);
    }

    #[test]
    fn test_sync_connection_complete_bad_link_type() {
        let mut payload = vec![0x00, 0x01, 0x00];
        payload.extend_from_slice(&[0u8; 6]);
        payload.push(0x09); // not a link type
        let evt = EventPacket::new(EVT_SYNC_CONNECTION_COMPLETE, payload);
        let complete = evt.to_sync_connection_complete().unwrap();
        assert!(complete.link_type.is_err());
    }

    #[test]
    fn test_le_meta_subevent() {
        let evt = EventPacket::new(EVT_LE_META, vec![0x0A, 0x00]);
        assert_eq!(evt.le_meta_subevent(), Some(0x0A));
        let evt = EventPacket::new(EVT_COMMAND_COMPLETE, vec![0x0A]);
        assert_eq!(evt.le_meta_subevent(), None);
    }
}
