pub mod consts;
pub mod packet;
pub mod params;

pub use packet::{
    CommandComplete, CommandPacket, CommandStatus, ConnectionRequest, EventPacket,
    SyncConnectionComplete,
};
pub use params::{DeviceAddress, LinkType, StatusCode, SyncConnectionParams};
