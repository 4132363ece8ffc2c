use thiserror::Error;

/// Errors produced while encoding or decoding HCI packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("packet truncated: {have} bytes")]
    Truncated { have: usize },
    #[error("declared payload length {declared} but got {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("command 0x{opcode:04X} parameter block too long: {len} bytes")]
    CommandTooLong { opcode: u16, len: usize },
    #[error("expected event 0x{expected:02X}, got 0x{actual:02X}")]
    WrongEventCode { expected: u8, actual: u8 },
    #[error("invalid link type 0x{0:02X}")]
    InvalidLinkType(u8),
    #[error("invalid device address")]
    InvalidAddress,
}

/// Errors surfaced by the command channel's caller-facing operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("a handler is already registered for this event code")]
    DuplicateHandler,
    #[error("event code 0x{0:02X} is reserved for command transactions")]
    ReservedEventCode(u8),
    #[error("LE-meta subevent code 0 is not registrable")]
    InvalidSubeventCode,
    #[error("channel is shut down")]
    ShutDown,
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// Result of a failed SCO/eSCO negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoError {
    #[error("controller reported failure: {0}")]
    Failed(crate::protocol::StatusCode),
    #[error("controller rejected every candidate parameter set: {0}")]
    ParametersRejected(crate::protocol::StatusCode),
    #[error("request canceled")]
    Canceled,
    #[error("no candidate parameter sets supplied")]
    InvalidParameters,
}
