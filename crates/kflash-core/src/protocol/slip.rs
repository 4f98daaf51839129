//! SLIP framing
//!
//! Every packet on the wire is wrapped as `0xC0 <escaped bytes> 0xC0`, with
//! `0xC0 -> 0xDB 0xDC` and `0xDB -> 0xDB 0xDD` inside the frame.
//!
//! [`SlipCodec`] implements the tokio-util `Decoder` so the session can keep
//! a single receive buffer, append whatever the transport returns and pull
//! complete frames out of it as they arrive.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::Decoder;

use super::ProtocolError;

/// Frame delimiter
pub const END: u8 = 0xC0;
/// Escape byte
pub const ESC: u8 = 0xDB;
/// Escaped form of [`END`]
pub const ESC_END: u8 = 0xDC;
/// Escaped form of [`ESC`]
pub const ESC_ESC: u8 = 0xDD;

/// Wrap a packet in a SLIP frame
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(payload.len() + payload.len() / 16 + 2);
    escape_into(payload, &mut frame);
    frame
}

fn escape_into<B: BufMut>(payload: &[u8], dst: &mut B) {
    dst.put_u8(END);
    for &byte in payload {
        match byte {
            END => {
                dst.put_u8(ESC);
                dst.put_u8(ESC_END);
            }
            ESC => {
                dst.put_u8(ESC);
                dst.put_u8(ESC_ESC);
            }
            _ => dst.put_u8(byte),
        }
    }
    dst.put_u8(END);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum DecodeState {
    /// Discarding bytes until a leading delimiter shows up
    #[default]
    Hunting,
    InFrame,
    Escape,
    /// Skipping the rest of a malformed frame
    Discard,
}

/// Incremental SLIP decoder
#[derive(Debug, Default)]
pub struct SlipCodec {
    state: DecodeState,
    frame: BytesMut,
}

impl SlipCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partially decoded frame and go back to hunting for a delimiter
    pub fn reset(&mut self) {
        self.state = DecodeState::Hunting;
        self.frame.clear();
    }
}

impl Decoder for SlipCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut consumed = 0;
        let mut result = Ok(None);

        for &byte in src.iter() {
            consumed += 1;
            match (self.state, byte) {
                (DecodeState::Hunting, END) => self.state = DecodeState::InFrame,
                (DecodeState::Hunting, _) => {}
                (DecodeState::InFrame, END) => {
                    self.state = DecodeState::Hunting;
                    result = Ok(Some(self.frame.split()));
                    break;
                }
                (DecodeState::InFrame, ESC) => self.state = DecodeState::Escape,
                (DecodeState::InFrame, _) => self.frame.put_u8(byte),
                (DecodeState::Escape, ESC_END) => {
                    self.frame.put_u8(END);
                    self.state = DecodeState::InFrame;
                }
                (DecodeState::Escape, ESC_ESC) => {
                    self.frame.put_u8(ESC);
                    self.state = DecodeState::InFrame;
                }
                (DecodeState::Escape, other) => {
                    self.frame.clear();
                    // A delimiter here closed the frame already
                    self.state = if other == END {
                        DecodeState::Hunting
                    } else {
                        DecodeState::Discard
                    };
                    result = Err(ProtocolError::Framing(other));
                    break;
                }
                (DecodeState::Discard, END) => self.state = DecodeState::Hunting,
                (DecodeState::Discard, _) => {}
            }
        }

        src.advance(consumed);
        result
    }
}
