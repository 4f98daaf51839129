//! Transport abstraction
//!
//! The session talks to the target through this trait only. Every method takes
//! `&mut self`, so a transport can never be read from while it is being
//! written to, reopened or closed.

use std::future::Future;

use super::ProtocolError;

/// Byte stream to the target chip
pub trait Transport: Send {
    /// Wait for data and return whatever is available (at least one byte)
    ///
    /// A link that went away is reported as [`ProtocolError::TransportClosed`].
    fn read(&mut self) -> impl Future<Output = Result<Vec<u8>, ProtocolError>> + Send;

    /// Queue bytes for transmission and flush them
    fn write(&mut self, data: &[u8]) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Drive the DTR and RTS control lines
    fn set_control_lines(
        &mut self,
        data_terminal_ready: bool,
        request_to_send: bool,
    ) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Close the link and open it again at a new baud rate
    fn reopen(&mut self, baud_rate: u32) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Release the underlying device
    fn close(&mut self) -> impl Future<Output = Result<(), ProtocolError>> + Send;

    /// Baud rate the link is currently running at
    fn baud_rate(&self) -> u32;
}
