//! Scripted K210 stand-in for session tests
//!
//! Decodes every frame the host writes, answers the way the bootrom or stub
//! would, and records what ended up in SRAM and flash.

#![allow(dead_code)]

use bytes::BytesMut;
use std::collections::{BTreeMap, HashMap, VecDeque};
use tokio_util::codec::Decoder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kflash_core::protocol::{
    slip, FlashOperation, IspOperation, Packet, ProtocolError, ReturnCode, SlipCodec, Transport,
    GREETING_SIZE,
};

/// Send session logs to the test harness; `RUST_LOG` picks the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Wire bytes of a reply whose escape sequence is invalid
pub const MALFORMED_ESCAPE: &[u8] = &[slip::END, slip::ESC, 0x01, slip::END];

/// Wire bytes of a reply too short to carry a reason byte
pub const ONE_BYTE_FRAME: &[u8] = &[slip::END, 0xE0, slip::END];

/// One request the device received
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub opcode: u16,
    pub address: Option<u32>,
    pub len: usize,
}

#[derive(Default)]
pub struct MockTransport {
    pub baud_rate: u32,
    codec: SlipCodec,
    inbox: BytesMut,
    outbox: VecDeque<Vec<u8>>,

    /// ISP greetings to ignore before answering
    pub silent_isp_greetings: u32,
    /// Flash greetings to ignore before answering, `u32::MAX` for never
    pub silent_flash_greetings: u32,
    /// Reason byte returned for FLASH_INIT
    pub flash_init_reason: Option<ReturnCode>,
    /// Number of BAD_DATA_CHECKSUM answers per write address
    pub naks: HashMap<u32, u32>,
    /// Fail every write once this many frames have been received
    pub close_after_frames: Option<usize>,
    /// Acknowledge writes with DEBUG_INFO text instead of the write opcode
    pub debug_info_acks: bool,
    /// Raw wire bytes sent in place of the next write acknowledgements
    pub garbled_replies: VecDeque<Vec<u8>>,
    /// Cancelled once this many flash frames have been stored
    pub cancel_after_flash_writes: Option<(usize, CancellationToken)>,

    pub requests: Vec<Request>,
    pub isp_greetings: u32,
    pub flash_greetings: u32,
    pub lines: Vec<(bool, bool)>,
    pub reopened: Vec<u32>,
    pub booted_at: Option<u32>,
    pub sram: BTreeMap<u32, Vec<u8>>,
    pub flash: BTreeMap<u32, Vec<u8>>,
}

impl MockTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    /// Requests carrying a given opcode, in arrival order
    pub fn requests_for(&self, opcode: impl Into<u16>) -> Vec<&Request> {
        let opcode = opcode.into();
        self.requests.iter().filter(|r| r.opcode == opcode).collect()
    }

    /// Contiguous image assembled from a write sink
    pub fn image(sink: &BTreeMap<u32, Vec<u8>>, base: u32) -> Vec<u8> {
        let mut image = Vec::new();
        for (address, data) in sink {
            let offset = (address - base) as usize;
            if image.len() < offset + data.len() {
                image.resize(offset + data.len(), 0);
            }
            image[offset..offset + data.len()].copy_from_slice(data);
        }
        image
    }

    fn reply(&mut self, op: u8, reason: ReturnCode) {
        self.outbox.push_back(slip::encode(&[op, reason as u8]));
    }

    fn ack_write(&mut self, op: u8, address: u32) {
        if let Some(raw) = self.garbled_replies.pop_front() {
            self.outbox.push_back(raw);
        } else if self.debug_info_acks {
            let mut frame = vec![IspOperation::DebugInfo as u8, ReturnCode::Ok as u8];
            frame.extend_from_slice(format!("wrote {address:#x}\0").as_bytes());
            self.outbox.push_back(slip::encode(&frame));
        } else {
            self.reply(op, ReturnCode::Ok);
        }
    }

    fn nak(&mut self, address: u32) -> bool {
        match self.naks.get_mut(&address) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn handle_greeting(&mut self, opcode: u16) {
        if opcode == u16::from(IspOperation::Nop) {
            self.isp_greetings += 1;
            if self.silent_isp_greetings > 0 {
                self.silent_isp_greetings -= 1;
                return;
            }
            self.reply(IspOperation::Nop as u8, ReturnCode::Ok);
        } else if opcode == u16::from(FlashOperation::Nop) {
            self.flash_greetings += 1;
            if self.silent_flash_greetings > 0 {
                if self.silent_flash_greetings != u32::MAX {
                    self.silent_flash_greetings -= 1;
                }
                return;
            }
            self.reply(FlashOperation::Nop as u8, ReturnCode::Ok);
        }
    }

    fn handle_packet(&mut self, packet: Packet) {
        let address = (packet.payload.len() >= 4).then(|| {
            u32::from_le_bytes([
                packet.payload[0],
                packet.payload[1],
                packet.payload[2],
                packet.payload[3],
            ])
        });
        self.requests.push(Request {
            opcode: packet.opcode,
            address,
            len: packet.payload.len().saturating_sub(8),
        });

        let data = packet.payload.get(8..).unwrap_or_default().to_vec();
        match (packet.opcode, address) {
            (op, Some(address)) if op == u16::from(IspOperation::MemoryWrite) => {
                if self.nak(address) {
                    self.reply(IspOperation::MemoryWrite as u8, ReturnCode::BadDataChecksum);
                } else {
                    self.sram.insert(address, data);
                    self.ack_write(IspOperation::MemoryWrite as u8, address);
                }
            }
            (op, Some(address)) if op == u16::from(IspOperation::MemoryBoot) => {
                self.booted_at = Some(address);
            }
            (op, Some(address)) if op == u16::from(FlashOperation::FlashWrite) => {
                if self.nak(address) {
                    self.reply(FlashOperation::FlashWrite as u8, ReturnCode::BadDataChecksum);
                    return;
                }
                self.flash.insert(address, data);
                self.ack_write(FlashOperation::FlashWrite as u8, address);
                if let Some((after, token)) = &self.cancel_after_flash_writes {
                    if self.flash.len() >= *after {
                        token.cancel();
                    }
                }
            }
            (op, _) if op == u16::from(FlashOperation::FlashInit) => {
                let reason = self.flash_init_reason.unwrap_or(ReturnCode::Ok);
                self.reply(FlashOperation::FlashInit as u8, reason);
            }
            // UARTHS_BAUDRATE_SET is never answered; the host reopens instead
            _ => {}
        }
    }

    fn receive(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        self.inbox.extend_from_slice(data);
        while let Some(frame) = self.codec.decode(&mut self.inbox)? {
            let is_greeting =
                frame.len() == GREETING_SIZE && frame[2..].iter().all(|&b| b == 0);
            if is_greeting {
                self.handle_greeting(u16::from_le_bytes([frame[0], frame[1]]));
            } else {
                self.handle_packet(Packet::from_bytes(&frame)?);
            }
        }
        Ok(())
    }

    fn frames_seen(&self) -> usize {
        self.requests.len() + (self.isp_greetings + self.flash_greetings) as usize
    }
}

impl Transport for MockTransport {
    async fn read(&mut self) -> Result<Vec<u8>, ProtocolError> {
        match self.outbox.pop_front() {
            Some(frame) => Ok(frame),
            None => std::future::pending().await,
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), ProtocolError> {
        if let Some(limit) = self.close_after_frames {
            if self.frames_seen() >= limit {
                return Err(ProtocolError::TransportClosed);
            }
        }
        self.receive(data)
    }

    async fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<(), ProtocolError> {
        self.lines.push((dtr, rts));
        Ok(())
    }

    async fn reopen(&mut self, baud_rate: u32) -> Result<(), ProtocolError> {
        self.baud_rate = baud_rate;
        self.reopened.push(baud_rate);
        self.outbox.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

/// Deterministic test image
pub fn image(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
