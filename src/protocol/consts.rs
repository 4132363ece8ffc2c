//! HCI opcodes, event codes, and related wire constants.
//!
//! Opcodes are `(OGF << 10) | OCF` per the Bluetooth Core Specification.

// Link Control commands (OGF 0x01)
pub const OP_SETUP_SYNC_CONNECTION: u16 = 0x0428;
pub const OP_ACCEPT_SYNC_CONNECTION: u16 = 0x0429;
pub const OP_REJECT_SYNC_CONNECTION: u16 = 0x042A;

// Controller & Baseband commands (OGF 0x03)
pub const OP_RESET: u16 = 0x0C03;

// Informational commands (OGF 0x04)
pub const OP_READ_BD_ADDR: u16 = 0x1009;

// Event codes
pub const EVT_CONNECTION_REQUEST: u8 = 0x04;
pub const EVT_COMMAND_COMPLETE: u8 = 0x0E;
pub const EVT_COMMAND_STATUS: u8 = 0x0F;
pub const EVT_SYNC_CONNECTION_COMPLETE: u8 = 0x2C;
pub const EVT_LE_META: u8 = 0x3E;

// H4 packet-type indicators (first byte on the user channel)
pub const H4_COMMAND: u8 = 0x01;
pub const H4_ACL_DATA: u8 = 0x02;
pub const H4_SCO_DATA: u8 = 0x03;
pub const H4_EVENT: u8 = 0x04;

// Synchronous packet-type bits for the packet_types field of
// setup/accept synchronous connection commands.
pub const PKT_HV1: u16 = 0x0001;
pub const PKT_HV2: u16 = 0x0002;
pub const PKT_HV3: u16 = 0x0004;
pub const PKT_EV3: u16 = 0x0008;
pub const PKT_EV4: u16 = 0x0010;
pub const PKT_EV5: u16 = 0x0020;
pub const PKT_SCO_MASK: u16 = PKT_HV1 | PKT_HV2 | PKT_HV3;
pub const PKT_ESCO_MASK: u16 = PKT_EV3 | PKT_EV4 | PKT_EV5;

// Status codes
pub const STATUS_SUCCESS: u8 = 0x00;
pub const STATUS_CONNECTION_TIMEOUT: u8 = 0x08;
pub const STATUS_REJECTED_LIMITED_RESOURCES: u8 = 0x0D;
pub const STATUS_UNSUPPORTED_FEATURE: u8 = 0x11;
pub const STATUS_UNSPECIFIED_ERROR: u8 = 0x1F;

// Reason used when rejecting a peer synchronous connection request.
pub const REJECT_REASON_LIMITED_RESOURCES: u8 = STATUS_REJECTED_LIMITED_RESOURCES;
