//! Response parsing

use super::{IspOperation, ProtocolError, ReturnCode};

/// Operation code both stages use for debug text
const DEBUG_INFO: u8 = IspOperation::DebugInfo as u8;

/// A decoded device response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Raw operation byte
    pub op: u8,
    /// Raw reason byte
    pub reason: u8,
    /// Debug text, only present for DEBUG_INFO responses
    pub text: Option<String>,
}

impl Response {
    /// Parse the payload of a decoded frame
    ///
    /// Unknown operation codes are not an error here; whether an opcode is
    /// acceptable depends on the phase the session is in.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < 2 {
            return Err(ProtocolError::ShortResponse(data.len()));
        }

        let op = data[0];
        let reason = data[1];
        let text = (op == DEBUG_INFO).then(|| {
            String::from_utf8_lossy(&data[2..])
                .trim_end_matches('\0')
                .to_string()
        });

        Ok(Self { op, reason, text })
    }

    /// The reason byte as a known return code
    pub fn return_code(&self) -> Option<ReturnCode> {
        ReturnCode::try_from(self.reason).ok()
    }

    /// Whether this response carries the given operation and return code
    pub fn is(&self, op: impl Into<u16>, code: ReturnCode) -> bool {
        u16::from(self.op) == op.into() && self.reason == code as u8
    }

    /// Whether the device acknowledged the request (DEFAULT or OK)
    pub fn is_ack(&self) -> bool {
        self.return_code().is_some_and(|code| code.is_ack())
    }

    /// Turn a negative acknowledgement into the matching error
    pub fn into_ack(self) -> Result<Self, ProtocolError> {
        match self.return_code() {
            Some(code) if code.is_ack() => Ok(self),
            Some(code) if code.is_data_rejection() => Err(ProtocolError::ChecksumRejected(code)),
            _ => Err(ProtocolError::DeviceError(self.reason)),
        }
    }
}
