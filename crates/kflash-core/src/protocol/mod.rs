//! K210 ISP Protocol
//!
//! Implements the two-stage serial protocol used to flash Kendryte K210
//! boards: the bootrom ISP stage that accepts a stub loader into SRAM, and
//! the stub's flash stage that writes firmware into SPI flash.
//!
//! Both stages exchange SLIP-framed packets with a CRC32 over the payload.

pub mod commands;
mod error;
mod packet;
pub mod reset;
mod response;
pub mod retry;
pub mod serial;
mod session;
pub mod slip;
pub mod transfer;
mod transport;

pub use commands::{FlashOperation, IspOperation, ReturnCode, UnknownCode};
pub use error::{FlashError, FlashErrorKind, ProtocolError};
pub use packet::{crc32, greeting, Packet, PacketBuilder, GREETING_SIZE, HEADER_SIZE};
pub use reset::{ControlLines, ResetSequence};
pub use response::Response;
pub use retry::{Attempts, Escalation, RetryPolicy, MAX_RETRY_TIMES};
pub use serial::{list_ports, PortInfo, SerialTransport};
pub use session::{Session, SessionPhase};
pub use slip::SlipCodec;
pub use transfer::{Chunk, ChunkPlan, FLASH_FRAME_SIZE, STUB_CHUNK_SIZE};
pub use transport::Transport;

/// Baud rate the bootrom listens at
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Baud rate the stub is switched to before the firmware write
pub const DEFAULT_TARGET_BAUD_RATE: u32 = 2_000_000;

/// SRAM address the stub is linked for
pub const DEFAULT_LOAD_ADDRESS: u32 = 0x8000_0000;

/// Start of flash
pub const DEFAULT_FLASH_ADDRESS: u32 = 0;

/// Flash chip selector for the on-board SPI flash
pub const DEFAULT_CHIP_TYPE: u32 = 1;
