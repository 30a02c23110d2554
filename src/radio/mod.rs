pub mod mode;
pub mod register;
pub mod session;
pub mod traits;
#[cfg(feature = "embedded")]
pub mod uart;

pub use mode::{Levels, Mode, ModeController, ModeMap};
pub use register::{
    AckError, Band, ConfigError, RadioConfig, RadioSettings, SettingsError, TransmissionMode,
};
pub use session::{ConfigState, ConfigurationSession, LinkParams, Timing, UartSettings};
pub use traits::{Channel, ChannelError};
#[cfg(feature = "embedded")]
pub use uart::UartChannel;
