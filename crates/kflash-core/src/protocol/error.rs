//! Protocol errors

use thiserror::Error;

use super::{ReturnCode, SessionPhase};

/// Errors that can occur during a single request/response exchange
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid SLIP escape: 0xdb followed by {0:#04x}")]
    Framing(u8),

    #[error("Response too short: {0} bytes")]
    ShortResponse(usize),

    #[error("Response timeout")]
    Timeout,

    #[error("Device rejected data: {0}")]
    ChecksumRejected(ReturnCode),

    #[error("Device returned error code {0:#04x}")]
    DeviceError(u8),

    #[error("Unexpected response: op {op:#04x}, reason {reason:#04x}")]
    UnexpectedResponse { op: u8, reason: u8 },

    #[error("Transport closed")]
    TransportClosed,

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Invalid stub image: {0}")]
    InvalidStub(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the enclosing exchange may simply be sent again
    ///
    /// Everything that concerns a single frame is retryable. Anything that
    /// concerns the link itself is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Framing(_)
                | ProtocolError::ShortResponse(_)
                | ProtocolError::Timeout
                | ProtocolError::ChecksumRejected(_)
                | ProtocolError::DeviceError(_)
                | ProtocolError::UnexpectedResponse { .. }
        )
    }
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::TransportClosed,
            _ => ProtocolError::SerialError(e.to_string()),
        }
    }
}

/// Fatal failure of a flashing session
#[derive(Error, Debug)]
#[error("{kind} (last phase: {phase})")]
pub struct FlashError {
    /// Phase the session was in when it gave up
    pub phase: SessionPhase,
    /// What went wrong
    #[source]
    pub kind: FlashErrorKind,
}

impl FlashError {
    pub fn new(phase: SessionPhase, kind: FlashErrorKind) -> Self {
        Self { phase, kind }
    }
}

/// The kinds of failure a session reports to its caller
#[derive(Error, Debug)]
pub enum FlashErrorKind {
    #[error("No K210 responded to the ISP greeting after {attempts} attempts")]
    NoDeviceFound { attempts: u32 },

    #[error("Flash stub did not answer the greeting after {attempts} attempts")]
    StubHandshake { attempts: u32 },

    #[error("Flash initialisation failed after {attempts} attempts")]
    FlashInit { attempts: u32 },

    #[error("Chunk at {address:#010x} was not acknowledged after {attempts} attempts")]
    ChunkRetriesExhausted { address: u32, attempts: u32 },

    #[error("Transport failure: {0}")]
    Transport(#[source] ProtocolError),

    #[error("Session cancelled")]
    Cancelled,
}
