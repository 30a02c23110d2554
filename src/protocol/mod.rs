pub mod packet;

pub use crate::config::protocol::BROADCAST_ADDRESS;
pub use packet::{decode, decode_into, encode, FrameError, ReceivedMessage};
