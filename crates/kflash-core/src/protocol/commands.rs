//! Protocol operations
//!
//! The bootrom (ISP stage) and the uploaded stub (flash stage) speak two
//! different command sets. Their numeric codes overlap (0xD1 is the debug info
//! code in both) so they are kept as distinct types and never converted into
//! one another.

use serde::{Deserialize, Serialize};

/// Commands understood by the K210 bootrom before the stub is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum IspOperation {
    /// Echo the payload back
    Echo = 0xC1,
    /// No-op, used as the ISP greeting
    Nop = 0xC2,
    /// Write a block of SRAM
    MemoryWrite = 0xC3,
    /// Read a block of SRAM
    MemoryRead = 0xC4,
    /// Jump to an address in SRAM
    MemoryBoot = 0xC5,
    /// Change the bootrom UART baud rate
    ChangeBaudrate = 0xC6,
    /// Debug text from the device
    DebugInfo = 0xD1,
}

/// Commands understood by the flash stub once it has been booted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FlashOperation {
    /// Debug text from the device
    DebugInfo = 0xD1,
    /// No-op, used as the flash-stage greeting
    Nop = 0xD2,
    /// Erase a flash region
    FlashErase = 0xD3,
    /// Write a data frame to flash
    FlashWrite = 0xD4,
    /// Reboot the chip
    Reboot = 0xD5,
    /// Change the UARTHS baud rate
    UarthsBaudrateSet = 0xD6,
    /// Initialise the flash chip
    FlashInit = 0xD7,
}

/// Reason codes carried in the second byte of every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReturnCode {
    Default = 0x00,
    Ok = 0xE0,
    BadDataLen = 0xE1,
    BadDataChecksum = 0xE2,
    InvalidCommand = 0xE3,
    /// Only sent by the flash stub
    BadInitialization = 0xE4,
}

/// A raw byte that does not belong to the enumeration it was decoded as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownCode(pub u8);

impl From<IspOperation> for u16 {
    fn from(op: IspOperation) -> Self {
        op as u16
    }
}

impl From<FlashOperation> for u16 {
    fn from(op: FlashOperation) -> Self {
        op as u16
    }
}

impl TryFrom<u8> for IspOperation {
    type Error = UnknownCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0xC1 => IspOperation::Echo,
            0xC2 => IspOperation::Nop,
            0xC3 => IspOperation::MemoryWrite,
            0xC4 => IspOperation::MemoryRead,
            0xC5 => IspOperation::MemoryBoot,
            0xC6 => IspOperation::ChangeBaudrate,
            0xD1 => IspOperation::DebugInfo,
            other => return Err(UnknownCode(other)),
        })
    }
}

impl TryFrom<u8> for FlashOperation {
    type Error = UnknownCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0xD1 => FlashOperation::DebugInfo,
            0xD2 => FlashOperation::Nop,
            0xD3 => FlashOperation::FlashErase,
            0xD4 => FlashOperation::FlashWrite,
            0xD5 => FlashOperation::Reboot,
            0xD6 => FlashOperation::UarthsBaudrateSet,
            0xD7 => FlashOperation::FlashInit,
            other => return Err(UnknownCode(other)),
        })
    }
}

impl TryFrom<u8> for ReturnCode {
    type Error = UnknownCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => ReturnCode::Default,
            0xE0 => ReturnCode::Ok,
            0xE1 => ReturnCode::BadDataLen,
            0xE2 => ReturnCode::BadDataChecksum,
            0xE3 => ReturnCode::InvalidCommand,
            0xE4 => ReturnCode::BadInitialization,
            other => return Err(UnknownCode(other)),
        })
    }
}

impl ReturnCode {
    /// Whether the device accepted the request
    ///
    /// The bootrom answers uploads with either `Default` or `Ok` depending on
    /// the command, so both count as an acknowledgement.
    pub fn is_ack(&self) -> bool {
        matches!(self, ReturnCode::Default | ReturnCode::Ok)
    }

    /// Whether the device rejected the data itself (length or checksum)
    pub fn is_data_rejection(&self) -> bool {
        matches!(self, ReturnCode::BadDataLen | ReturnCode::BadDataChecksum)
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ReturnCode::Default => "DEFAULT",
            ReturnCode::Ok => "OK",
            ReturnCode::BadDataLen => "BAD_DATA_LEN",
            ReturnCode::BadDataChecksum => "BAD_DATA_CHECKSUM",
            ReturnCode::InvalidCommand => "INVALID_COMMAND",
            ReturnCode::BadInitialization => "BAD_INITIALIZATION",
        };
        write!(f, "{} (0x{:02x})", name, *self as u8)
    }
}
