//! HCI command/event transaction layer and SCO link negotiation for Linux
//! Bluetooth controllers.
//!
//! [`CommandChannel`] owns the controller-mandated command flow control:
//! commands go out one at a time in submission order, command-status and
//! command-complete events are correlated back to their transaction, and
//! unsolicited events are routed to registered handlers. [`ScoManager`]
//! builds SCO/eSCO link negotiation on top of it, retrying across candidate
//! parameter sets. [`HciSocket`] provides the raw user-channel transport.

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod sco;
pub mod transport;

pub use channel::{CommandChannel, EventHandlerId, TransactionId};
pub use dispatch::Dispatcher;
pub use error::{ChannelError, PacketError, ScoError};
pub use protocol::{
    CommandPacket, DeviceAddress, EventPacket, LinkType, StatusCode, SyncConnectionParams,
};
pub use sco::{ScoCompleted, ScoConnection, ScoManager, ScoRequestHandle, ScoResult};
pub use transport::HciSocket;
