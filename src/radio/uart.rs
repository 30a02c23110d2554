//! [`Channel`] over an `embedded_io_async` UART
//!
//! Generic over any UART implementing `embedded_io_async::{Read, Write}` and
//! `embedded_io::ReadReady`. Baud rate changes go through a caller-supplied
//! function, since `embedded-io` has no notion of line settings.

use embassy_time::{with_timeout, Duration};
use embedded_io::ReadReady;
use embedded_io_async::{Read, Write};

use crate::radio::traits::{Channel, ChannelError};

/// UART-backed channel
///
/// `set_baud` is called on every `open` and returns false if the UART
/// rejected the rate.
pub struct UartChannel<U, B>
where
    U: Read + Write + ReadReady,
    B: FnMut(&mut U, u32) -> bool,
{
    uart: U,
    set_baud: B,
    baud: Option<u32>,
}

impl<U, B> UartChannel<U, B>
where
    U: Read + Write + ReadReady,
    B: FnMut(&mut U, u32) -> bool,
{
    pub fn new(uart: U, set_baud: B) -> Self {
        Self {
            uart,
            set_baud,
            baud: None,
        }
    }

    /// Current baud rate, `None` while closed
    pub fn baud(&self) -> Option<u32> {
        self.baud
    }

    pub fn into_inner(self) -> U {
        self.uart
    }

    fn ensure_open(&self) -> Result<(), ChannelError> {
        match self.baud {
            Some(_) => Ok(()),
            None => Err(ChannelError::NotOpen),
        }
    }
}

impl<U, B> Channel for UartChannel<U, B>
where
    U: Read + Write + ReadReady,
    B: FnMut(&mut U, u32) -> bool,
{
    async fn open(&mut self, baud: u32) -> Result<(), ChannelError> {
        if !(self.set_baud)(&mut self.uart, baud) {
            self.baud = None;
            return Err(ChannelError::OpenFailed);
        }
        self.baud = Some(baud);
        Ok(())
    }

    /// Closed afterwards even if the final flush fails
    async fn close(&mut self) -> Result<(), ChannelError> {
        if self.baud.take().is_some() {
            // Let queued bytes leave at the old rate
            if self.uart.flush().await.is_err() {
                log::warn!("UART: flush failed on close");
                return Err(ChannelError::WriteError);
            }
        }
        Ok(())
    }

    /// Reports 1 when any byte is waiting; `ReadReady` gives no count
    fn available(&mut self) -> Result<usize, ChannelError> {
        self.ensure_open()?;
        match self.uart.read_ready() {
            Ok(true) => Ok(1),
            Ok(false) => Ok(0),
            Err(_) => Err(ChannelError::ReadError),
        }
    }

    async fn read(&mut self, buf: &mut [u8], timeout_ms: u32) -> Result<usize, ChannelError> {
        self.ensure_open()?;
        let timeout = Duration::from_millis(u64::from(timeout_ms));
        match with_timeout(timeout, self.uart.read(buf)).await {
            Ok(Ok(count)) => Ok(count),
            Ok(Err(_)) => Err(ChannelError::ReadError),
            Err(_) => Ok(0),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<usize, ChannelError> {
        self.ensure_open()?;
        let mut written = 0;
        while written < data.len() {
            match self.uart.write(&data[written..]).await {
                Ok(0) => break,
                Ok(count) => written += count,
                Err(_) if written > 0 => break,
                Err(_) => return Err(ChannelError::WriteError),
            }
        }
        Ok(written)
    }

    async fn flush(&mut self) -> Result<(), ChannelError> {
        self.ensure_open()?;
        self.uart.flush().await.map_err(|_| ChannelError::WriteError)
    }

    async fn discard_input(&mut self) -> Result<(), ChannelError> {
        self.ensure_open()?;
        let mut scratch = [0u8; 32];
        while self.uart.read_ready().map_err(|_| ChannelError::ReadError)? {
            match self.uart.read(&mut scratch).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(_) => return Err(ChannelError::ReadError),
            }
        }
        Ok(())
    }
}
