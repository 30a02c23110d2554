//! Packet link over a configured module
//!
//! [`LinkSession`] owns the channel and mode lines once the module has been
//! configured. Received bytes are reassembled across polls, so a frame split
//! over two reads or two frames in one read both come out whole.

use crate::config::protocol::{MAX_PAYLOAD, RX_BUFFER_SIZE, RX_CHUNK_SIZE};
use crate::config::register;
use crate::protocol::packet::{self, FrameError, ReceivedMessage};
use crate::protocol::BROADCAST_ADDRESS;
use crate::radio::mode::{Mode, ModeController};
use crate::radio::register::{ConfigError, RadioConfig, RadioSettings, SettingsError};
use crate::radio::session::{ConfigurationSession, LinkParams, Timing, UartSettings};
use crate::radio::traits::{Channel, ChannelError};
use embedded_hal::digital::OutputPin;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

/// Send errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The UART accepted only part of the packet
    Incomplete { written: usize, expected: usize },
    Channel(ChannelError),
}

impl From<ChannelError> for SendError {
    fn from(error: ChannelError) -> Self {
        Self::Channel(error)
    }
}

/// Receive errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvError {
    Channel(ChannelError),
    /// A complete but malformed frame was dropped
    Frame(FrameError),
}

impl From<ChannelError> for RecvError {
    fn from(error: ChannelError) -> Self {
        Self::Channel(error)
    }
}

/// Module query errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryError {
    Channel(ChannelError),
    /// Nothing came back
    NoResponse,
    /// Reply did not have the expected prefix
    Malformed,
}

impl From<ChannelError> for QueryError {
    fn from(error: ChannelError) -> Self {
        Self::Channel(error)
    }
}

/// Send and receive packets on a configured module
pub struct LinkSession<C, M0, M1, D>
where
    C: Channel,
    M0: OutputPin,
    M1: OutputPin,
    D: DelayNs,
{
    channel: C,
    mode: ModeController<M0, M1, D>,
    params: LinkParams,
    timing: Timing,
    uart: UartSettings,
    /// Bytes read but not yet decoded
    pending: Vec<u8, RX_BUFFER_SIZE>,
}

impl<C, M0, M1, D> LinkSession<C, M0, M1, D>
where
    C: Channel,
    M0: OutputPin,
    M1: OutputPin,
    D: DelayNs,
{
    /// Wrap a channel already open at `params.operating_baud`
    pub fn new(channel: C, mode: ModeController<M0, M1, D>, params: LinkParams) -> Self {
        Self {
            channel,
            mode,
            params,
            timing: Timing::default(),
            uart: UartSettings {
                operating_baud: params.operating_baud,
                ..UartSettings::default()
            },
            pending: Vec::new(),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    /// Baud rates and timeout used by `reconfigure` and module queries
    pub fn with_uart(mut self, uart: UartSettings) -> Self {
        self.uart = uart;
        self
    }

    pub fn params(&self) -> &LinkParams {
        &self.params
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode.current()
    }

    /// Put the module in `mode`; the next send or receive returns it to normal
    pub async fn set_mode(&mut self, mode: Mode) {
        self.mode.set(mode).await;
    }

    /// Send `payload` to `target`
    ///
    /// Payloads over [`MAX_PAYLOAD`] bytes are truncated.
    pub async fn send(&mut self, target: u16, payload: &[u8]) -> Result<(), SendError> {
        self.mode.ensure(Mode::Normal).await;

        if payload.len() > MAX_PAYLOAD {
            log::warn!("TX: payload truncated from {} to {} bytes", payload.len(), MAX_PAYLOAD);
        }

        // Peers share one channel offset
        let offset = self.params.channel_offset;
        let frame = packet::encode(target, self.params.address, offset, offset, payload);

        let written = self.channel.write(&frame).await?;
        if written != frame.len() {
            log::warn!("TX: short write {}/{}", written, frame.len());
            return Err(SendError::Incomplete {
                written,
                expected: frame.len(),
            });
        }
        self.channel.flush().await?;
        self.mode.wait_ms(self.timing.tx_settle_ms).await;

        log::debug!("TX: {} bytes to {:#06X}", frame.len(), target);
        Ok(())
    }

    /// Send `payload` to every node on the channel
    pub async fn broadcast(&mut self, payload: &[u8]) -> Result<(), SendError> {
        self.send(BROADCAST_ADDRESS, payload).await
    }

    /// Return the next message if one is available
    ///
    /// Returns `Ok(None)` straight away when nothing is buffered.
    pub async fn try_receive(
        &mut self,
        timeout_ms: u32,
    ) -> Result<Option<ReceivedMessage>, RecvError> {
        self.mode.ensure(Mode::Normal).await;

        if packet::find_terminator(&self.pending).is_none() {
            if self.channel.available()? == 0 {
                return Ok(None);
            }

            // Let the rest of an in-flight frame arrive
            self.mode.wait_ms(self.timing.rx_settle_ms).await;
            if self.channel.available()? > 0 {
                self.fill(timeout_ms).await?;
            }
        }

        self.take_frame()
    }

    /// Poll for a message for up to `total_ms`
    pub async fn receive_within(
        &mut self,
        total_ms: u32,
    ) -> Result<Option<ReceivedMessage>, RecvError> {
        let poll_ms = self.timing.rx_poll_ms.max(1);
        let mut waited = 0u32;

        loop {
            if let Some(message) = self.try_receive(poll_ms).await? {
                return Ok(Some(message));
            }
            if waited >= total_ms {
                return Ok(None);
            }
            self.mode.wait_ms(poll_ms).await;
            waited = waited.saturating_add(poll_ms);
        }
    }

    /// Measure the ambient noise on the channel, in dBm
    pub async fn channel_noise_rssi(&mut self) -> Result<i16, QueryError> {
        self.mode.ensure(Mode::Normal).await;
        self.channel.discard_input().await?;

        let written = self.channel.write(&register::NOISE_RSSI_CMD).await?;
        if written != register::NOISE_RSSI_CMD.len() {
            return Err(QueryError::Channel(ChannelError::WriteError));
        }
        self.channel.flush().await?;
        self.mode.wait_ms(self.timing.noise_rssi_ms).await;

        let mut reply = [0u8; 4];
        let len = self
            .channel
            .read(&mut reply, self.uart.read_timeout_ms)
            .await?;
        log::debug!("Noise RSSI reply: {:02X?}", &reply[..len]);

        match &reply[..len] {
            [] => Err(QueryError::NoResponse),
            [a, b, c, raw] if [*a, *b, *c] == register::NOISE_RSSI_REPLY => {
                Ok(packet::rssi_dbm(*raw))
            }
            _ => Err(QueryError::Malformed),
        }
    }

    /// Write a new configuration and adopt its parameters
    ///
    /// Buffered receive data is discarded. On error the previous parameters
    /// are kept, but the module state is unspecified until a later call
    /// succeeds.
    pub async fn reconfigure(&mut self, config: &RadioConfig) -> Result<LinkParams, ConfigError> {
        self.pending.clear();

        let params = ConfigurationSession::new(&mut self.channel, &mut self.mode)
            .with_uart(self.uart)
            .with_timing(self.timing)
            .run(config)
            .await?;

        self.params = params;
        Ok(params)
    }

    /// Read the module's current settings
    pub async fn read_settings(&mut self) -> Result<RadioSettings, SettingsError> {
        ConfigurationSession::new(&mut self.channel, &mut self.mode)
            .with_uart(self.uart)
            .with_timing(self.timing)
            .read_settings()
            .await
    }

    /// Give back the channel and mode controller
    pub fn release(self) -> (C, ModeController<M0, M1, D>) {
        (self.channel, self.mode)
    }

    /// Append one read's worth of bytes to the pending buffer
    async fn fill(&mut self, timeout_ms: u32) -> Result<(), ChannelError> {
        let room = self.pending.capacity() - self.pending.len();
        if room == 0 {
            return Ok(());
        }

        let mut chunk = [0u8; RX_CHUNK_SIZE];
        let want = room.min(RX_CHUNK_SIZE);
        let len = self.channel.read(&mut chunk[..want], timeout_ms).await?;
        // len <= want <= room
        let _ = self.pending.extend_from_slice(&chunk[..len]);
        log::debug!("RX: {} bytes, {} pending", len, self.pending.len());
        Ok(())
    }

    /// Decode and remove the first complete frame in the pending buffer
    fn take_frame(&mut self) -> Result<Option<ReceivedMessage>, RecvError> {
        let Some(end) = packet::find_terminator(&self.pending) else {
            if self.pending.is_full() {
                log::warn!("RX: dropping {} bytes without terminator", self.pending.len());
                self.pending.clear();
            }
            return Ok(None);
        };

        let result = packet::decode(&self.pending[..=end], self.params.rssi_enabled);
        self.consume(end + 1);

        match result {
            Ok(message) => {
                log::debug!(
                    "RX: {} byte payload, rssi {:?}",
                    message.payload.len(),
                    message.rssi_dbm
                );
                Ok(Some(message))
            }
            Err(FrameError::Incomplete) => Ok(None),
            Err(error) => {
                log::warn!("RX: dropped frame: {:?}", error);
                Err(RecvError::Frame(error))
            }
        }
    }

    fn consume(&mut self, count: usize) {
        let remaining = self.pending.len() - count;
        self.pending.copy_within(count.., 0);
        self.pending.truncate(remaining);
    }
}
