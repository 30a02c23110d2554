#![cfg_attr(not(test), no_std)]

//! Driver for UART-controlled SX126x LoRa modules (E22 / Waveshare LoRa HAT)
//!
//! A [`ConfigurationSession`] writes the module's configuration register and
//! switches the UART to the operating baud rate. A [`LinkSession`] then sends
//! and receives addressed packets over the configured module.

pub mod config;
pub mod link;
pub mod protocol;
pub mod radio;

pub use link::{LinkSession, QueryError, RecvError, SendError};
pub use protocol::{FrameError, ReceivedMessage, BROADCAST_ADDRESS};
pub use radio::{
    Band, Channel, ChannelError, ConfigError, ConfigurationSession, LinkParams, Mode,
    ModeController, ModeMap, RadioConfig, TransmissionMode,
};
