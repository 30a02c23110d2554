//! Serial channel trait for abstraction and testability
//!
//! The module is driven over a plain UART. This trait is the only thing the
//! driver needs from it, so the platform UART can be swapped for a mock in
//! tests.

use core::future::Future;

/// Errors that can occur on the serial channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// Channel used before `open`
    NotOpen,
    /// The UART could not be opened at the requested baud rate
    OpenFailed,
    /// Framing or parity error in received data
    ReadError,
    /// Write rejected by the UART
    WriteError,
    /// Receive buffer overflow
    Overflow,
}

/// Byte-oriented duplex serial connection
///
/// Implementations own the underlying UART exclusively. The module changes
/// baud rate during configuration, so the driver closes and reopens the
/// channel rather than relying on an in-place baud change.
pub trait Channel {
    /// Open (or reopen) the channel at the given baud rate
    fn open(&mut self, baud: u32) -> impl Future<Output = Result<(), ChannelError>>;

    /// Close the channel, releasing the UART
    fn close(&mut self) -> impl Future<Output = Result<(), ChannelError>>;

    /// Number of received bytes buffered and ready to read
    fn available(&mut self) -> Result<usize, ChannelError>;

    /// Read into `buf`, waiting at most `timeout_ms` for the first byte
    ///
    /// Returns the number of bytes read; zero means the timeout expired.
    fn read(
        &mut self,
        buf: &mut [u8],
        timeout_ms: u32,
    ) -> impl Future<Output = Result<usize, ChannelError>>;

    /// Write bytes, returning how many the UART accepted
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<usize, ChannelError>>;

    /// Wait until all written bytes have left the UART
    fn flush(&mut self) -> impl Future<Output = Result<(), ChannelError>>;

    /// Drop any buffered input
    fn discard_input(&mut self) -> impl Future<Output = Result<(), ChannelError>>;
}
