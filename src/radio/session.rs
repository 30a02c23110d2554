//! Configuration handshake
//!
//! The module only accepts register writes in configuration mode at the
//! configuration baud rate, and only applies a new UART baud rate while it
//! is still in configuration mode. The session therefore runs:
//!
//! ```text
//! Idle -> EnteringConfigMode -> AwaitingChannelOpen -> Sending(n) -> AwaitingAck
//!      -> (retry up to MAX_CONFIG_ATTEMPTS) -> ReopeningChannel -> ExitingConfigMode -> Done
//! ```

use crate::config::{register, timing, uart, MAX_CONFIG_ATTEMPTS};
use crate::radio::mode::{Mode, ModeController};
use crate::radio::register::{
    decode_ack, decode_register, decode_settings, encode, supported_uart_baud, Band, ConfigError,
    RadioConfig, RadioSettings, SettingsError,
};
use crate::radio::traits::{Channel, ChannelError};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;

/// Baud rates and read timeout for the handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartSettings {
    /// Baud rate the module listens on in configuration mode
    pub config_baud: u32,
    /// Baud rate programmed into the register and used afterwards
    pub operating_baud: u32,
    pub read_timeout_ms: u32,
}

impl Default for UartSettings {
    fn default() -> Self {
        Self {
            config_baud: uart::CONFIG_BAUD,
            operating_baud: uart::OPERATING_BAUD,
            read_timeout_ms: uart::READ_TIMEOUT_MS,
        }
    }
}

/// Driver delays in milliseconds
///
/// Mode-switch settling belongs to [`ModeController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub config_write_ms: u32,
    pub config_retry_ms: u32,
    pub uart_close_ms: u32,
    pub uart_init_ms: u32,
    pub uart_stabilize_ms: u32,
    pub settings_read_ms: u32,
    pub tx_settle_ms: u32,
    pub rx_settle_ms: u32,
    pub rx_poll_ms: u32,
    pub noise_rssi_ms: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            config_write_ms: timing::CONFIG_WRITE_MS,
            config_retry_ms: timing::CONFIG_RETRY_MS,
            uart_close_ms: timing::UART_CLOSE_MS,
            uart_init_ms: timing::UART_INIT_MS,
            uart_stabilize_ms: timing::UART_STABILIZE_MS,
            settings_read_ms: timing::SETTINGS_READ_MS,
            tx_settle_ms: timing::TX_SETTLE_MS,
            rx_settle_ms: timing::RX_SETTLE_MS,
            rx_poll_ms: timing::RX_POLL_MS,
            noise_rssi_ms: timing::NOISE_RSSI_MS,
        }
    }
}

/// Handshake progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    Idle,
    EnteringConfigMode,
    AwaitingChannelOpen,
    Sending(u8),
    AwaitingAck,
    ReopeningChannel,
    ExitingConfigMode,
    Done,
    Failed,
}

/// Parameters a configured link runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkParams {
    pub address: u16,
    pub band: Band,
    /// Frequency offset within `band`, shared by both ends of a link
    pub channel_offset: u8,
    pub rssi_enabled: bool,
    pub operating_baud: u32,
}

impl LinkParams {
    /// Parameters implied by `config`, for a module configured earlier
    pub fn from_config(config: &RadioConfig, operating_baud: u32) -> Self {
        Self {
            address: config.address(),
            band: config.band(),
            channel_offset: config.frequency_offset(),
            rssi_enabled: config.rssi_enabled(),
            operating_baud,
        }
    }
}

/// Runs the configuration handshake with exclusive use of the channel and
/// mode lines
pub struct ConfigurationSession<'a, C, M0, M1, D>
where
    C: Channel,
    M0: OutputPin,
    M1: OutputPin,
    D: DelayNs,
{
    channel: &'a mut C,
    mode: &'a mut ModeController<M0, M1, D>,
    uart: UartSettings,
    timing: Timing,
    state: ConfigState,
    attempts: u8,
}

impl<'a, C, M0, M1, D> ConfigurationSession<'a, C, M0, M1, D>
where
    C: Channel,
    M0: OutputPin,
    M1: OutputPin,
    D: DelayNs,
{
    pub fn new(channel: &'a mut C, mode: &'a mut ModeController<M0, M1, D>) -> Self {
        Self {
            channel,
            mode,
            uart: UartSettings::default(),
            timing: Timing::default(),
            state: ConfigState::Idle,
            attempts: 0,
        }
    }

    pub fn with_uart(mut self, uart: UartSettings) -> Self {
        self.uart = uart;
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> ConfigState {
        self.state
    }

    /// Register writes made by the last `run`
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    fn transition(&mut self, next: ConfigState) {
        log::debug!("Config: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Write `config` to the module and switch to the operating baud rate
    ///
    /// On `Err` the module's mode and baud rate are unspecified and the
    /// link must not be used until a later `run` succeeds.
    pub async fn run(&mut self, config: &RadioConfig) -> Result<LinkParams, ConfigError> {
        self.attempts = 0;

        self.transition(ConfigState::EnteringConfigMode);
        self.mode.set(Mode::ConfigOrPowerSave).await;

        self.transition(ConfigState::AwaitingChannelOpen);
        if let Err(error) = self.reopen(self.uart.config_baud).await {
            self.transition(ConfigState::Failed);
            return Err(error.into());
        }

        let operating_baud = self.operating_baud();
        if operating_baud != self.uart.operating_baud {
            log::warn!(
                "Config: UART {} baud unsupported, using {}",
                self.uart.operating_baud,
                operating_baud
            );
        }
        let normalized = config.normalized();
        if normalized != *config {
            log::warn!("Config: unsupported values adjusted to {:?}", normalized);
        }

        let reg = encode(config, operating_baud);
        log::debug!("Config register: {:02X?}", reg);

        let mut acked = false;
        for attempt in 1..=MAX_CONFIG_ATTEMPTS {
            self.attempts = attempt;
            if attempt > 1 {
                // Lines may have drifted since the last attempt
                self.mode.set(Mode::ConfigOrPowerSave).await;
            }

            self.transition(ConfigState::Sending(attempt));
            let reply = self.exchange(&reg, self.timing.config_write_ms).await;

            self.transition(ConfigState::AwaitingAck);
            match reply {
                Ok((buf, len)) => match decode_ack(&buf[..len]) {
                    Ok(()) => {
                        if len == register::LENGTH {
                            check_echo(&reg, &buf);
                        }
                        acked = true;
                        break;
                    }
                    Err(error) => {
                        log::warn!(
                            "Config attempt {}/{}: bad ack {:?}",
                            attempt,
                            MAX_CONFIG_ATTEMPTS,
                            error
                        );
                    }
                },
                Err(error) => {
                    log::warn!(
                        "Config attempt {}/{}: channel error {:?}",
                        attempt,
                        MAX_CONFIG_ATTEMPTS,
                        error
                    );
                }
            }

            if attempt < MAX_CONFIG_ATTEMPTS {
                self.mode.wait_ms(self.timing.config_retry_ms).await;
            }
        }

        if !acked {
            self.transition(ConfigState::Failed);
            log::error!("Config: no ack after {} attempts", MAX_CONFIG_ATTEMPTS);
            return Err(ConfigError::NoAck);
        }

        self.transition(ConfigState::ReopeningChannel);
        if let Err(error) = self.enter_operating().await {
            self.transition(ConfigState::Failed);
            return Err(error.into());
        }
        self.transition(ConfigState::Done);

        log::info!(
            "Configured: addr={} freq={}MHz (offset {}) baud={}",
            config.address(),
            config.frequency_mhz(),
            config.frequency_offset(),
            operating_baud
        );

        Ok(LinkParams::from_config(config, operating_baud))
    }

    /// Read the module's current settings
    ///
    /// Switches to the configuration baud rate for the query, then restores
    /// the operating baud rate and normal mode.
    pub async fn read_settings(&mut self) -> Result<RadioSettings, SettingsError> {
        self.mode.set(Mode::ConfigOrPowerSave).await;
        self.reopen(self.uart.config_baud).await?;

        let reply = self
            .exchange(&register::READ_SETTINGS, self.timing.settings_read_ms)
            .await;

        self.enter_operating().await?;

        let (buf, len) = reply?;
        let settings = decode_settings(&buf[..len])?;
        log::info!("Settings: {:?}", settings);
        Ok(settings)
    }

    /// Rate the module actually switches to
    fn operating_baud(&self) -> u32 {
        supported_uart_baud(self.uart.operating_baud)
    }

    /// Close the channel (it may still be open at another rate) and open at `baud`
    async fn reopen(&mut self, baud: u32) -> Result<(), ChannelError> {
        self.channel.close().await?;
        self.channel.open(baud).await
    }

    /// Send `request` and collect up to one register's worth of reply
    async fn exchange(
        &mut self,
        request: &[u8],
        wait_ms: u32,
    ) -> Result<([u8; register::LENGTH], usize), ChannelError> {
        self.channel.discard_input().await?;

        let written = self.channel.write(request).await?;
        if written != request.len() {
            return Err(ChannelError::WriteError);
        }
        self.channel.flush().await?;

        self.mode.wait_ms(wait_ms).await;

        let mut buf = [0u8; register::LENGTH];
        let len = self
            .channel
            .read(&mut buf, self.uart.read_timeout_ms)
            .await?;
        log::debug!("Config reply: {:02X?}", &buf[..len]);
        Ok((buf, len))
    }

    /// Reopen at the operating baud rate, then return to normal mode
    async fn enter_operating(&mut self) -> Result<(), ChannelError> {
        self.channel.close().await?;
        self.mode.wait_ms(self.timing.uart_close_ms).await;

        // The new baud rate only takes effect while still in configuration mode
        self.mode.set(Mode::ConfigOrPowerSave).await;
        self.mode.wait_ms(self.timing.uart_init_ms).await;

        self.channel.open(self.operating_baud()).await?;
        self.channel.discard_input().await?;
        self.mode.wait_ms(self.timing.uart_stabilize_ms).await;

        self.transition(ConfigState::ExitingConfigMode);
        self.mode.set(Mode::Normal).await;
        Ok(())
    }
}

/// Compare the echoed register with what was sent
fn check_echo(sent: &[u8; register::LENGTH], echo: &[u8; register::LENGTH]) {
    let sent = decode_register(sent);
    let echo = decode_register(echo);
    if !sent.same_parameters(&echo) {
        log::warn!("Config echo differs: sent {:?}, module reports {:?}", sent, echo);
    }
}
