//! Packet encoding/decoding
//!
//! Command packet layout (all fields little-endian):
//! - 2 bytes: Operation code
//! - 2 bytes: Reserved, always zero
//! - 4 bytes: CRC32 (of payload only, NOT the command word)
//! - N bytes: Payload
//!
//! Packets are wrapped in SLIP frames by [`super::slip`] before they hit the wire.

use byteorder::{ByteOrder, LittleEndian};

use super::{FlashOperation, IspOperation, ProtocolError, ReturnCode};

/// Size of the command word plus CRC field
pub const HEADER_SIZE: usize = 8;

/// Number of bytes in a greeting packet
pub const GREETING_SIZE: usize = 13;

/// A command packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Operation code from one of the two command sets
    pub opcode: u16,
    /// CRC32 of the payload only
    pub crc: u32,
    /// Command-specific payload
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a new packet with the given payload
    pub fn new(opcode: impl Into<u16>, payload: Vec<u8>) -> Self {
        let crc = crc32(&payload);
        Self {
            opcode: opcode.into(),
            crc,
            payload,
        }
    }

    /// MEMORY_WRITE: store a stub chunk in SRAM
    pub fn memory_write(address: u32, data: &[u8]) -> Self {
        PacketBuilder::new()
            .u32_le(address)
            .u32_le(data.len() as u32)
            .bytes(data)
            .build(IspOperation::MemoryWrite)
    }

    /// FLASH_WRITE: program a data frame into flash
    pub fn flash_write(address: u32, data: &[u8]) -> Self {
        PacketBuilder::new()
            .u32_le(address)
            .u32_le(data.len() as u32)
            .bytes(data)
            .build(FlashOperation::FlashWrite)
    }

    /// MEMORY_BOOT: jump into code previously written to SRAM
    pub fn memory_boot(address: u32) -> Self {
        PacketBuilder::new()
            .u32_le(address)
            .u32_le(0)
            .build(IspOperation::MemoryBoot)
    }

    /// UARTHS_BAUDRATE_SET: switch the stub's UART to a new baud rate
    pub fn baudrate_set(baud_rate: u32) -> Self {
        PacketBuilder::new()
            .u32_le(0)
            .u32_le(4)
            .u32_le(baud_rate)
            .build(FlashOperation::UarthsBaudrateSet)
    }

    /// FLASH_INIT: select and initialise the flash chip
    pub fn flash_init(chip_type: u32) -> Self {
        PacketBuilder::new()
            .u32_le(chip_type)
            .u32_le(0)
            .build(FlashOperation::FlashInit)
    }

    /// Decode a packet from raw (unframed) bytes, verifying its CRC
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::ShortResponse(data.len()));
        }

        let opcode = LittleEndian::read_u16(&data[0..2]);
        let received_crc = LittleEndian::read_u32(&data[4..8]);
        let payload = data[HEADER_SIZE..].to_vec();

        if crc32(&payload) != received_crc {
            return Err(ProtocolError::ChecksumRejected(ReturnCode::BadDataChecksum));
        }

        Ok(Self {
            opcode,
            crc: received_crc,
            payload,
        })
    }

    /// Encode the packet to raw bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        LittleEndian::write_u16(&mut bytes[0..2], self.opcode);
        // bytes[2..4] reserved
        LittleEndian::write_u32(&mut bytes[4..8], self.crc);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Greeting packet for either stage
///
/// Greetings carry no CRC: the operation code is followed by zero bytes only.
pub fn greeting(opcode: impl Into<u16>) -> Vec<u8> {
    let mut bytes = vec![0u8; GREETING_SIZE];
    LittleEndian::write_u16(&mut bytes[0..2], opcode.into());
    bytes
}

/// Builder for constructing packet payloads
pub struct PacketBuilder {
    payload: Vec<u8>,
}

impl PacketBuilder {
    /// Create a new packet builder
    pub fn new() -> Self {
        Self {
            payload: Vec::new(),
        }
    }

    /// Add a 32-bit value (little-endian)
    pub fn u32_le(mut self, value: u32) -> Self {
        let mut bytes = [0u8; 4];
        LittleEndian::write_u32(&mut bytes, value);
        self.payload.extend_from_slice(&bytes);
        self
    }

    /// Add raw bytes
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.payload.extend_from_slice(data);
        self
    }

    /// Build the packet
    pub fn build(self, opcode: impl Into<u16>) -> Packet {
        Packet::new(opcode, self.payload)
    }
}

impl Default for PacketBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard CRC-32 (IEEE) of a payload
pub fn crc32(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}
