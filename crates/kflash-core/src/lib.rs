//! # kflash Core Library
//!
//! Host-side flashing for Kendryte K210 boards over a serial link.

#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - SLIP framing and the CRC32 packet format used by the K210 bootrom
//! - The ISP and flash-stage command sets
//! - A flashing session that resets the board, uploads the stub loader,
//!   writes firmware and reboots
//! - Serial port discovery and an async serial transport
//!
//! ## Example
//!
//! ```rust,ignore
//! use kflash_core::prelude::*;
//!
//! let transport = SerialTransport::open("/dev/ttyUSB0", 115_200, DEFAULT_BUFFER_SIZE)?;
//! let stub = StubImage::from_compressed(&std::fs::read("isp.bin.z")?)?;
//! let firmware = std::fs::read("firmware.bin")?;
//!
//! let mut session = Session::new(transport, stub, SessionConfig::default());
//! session.flash(&firmware).await?;
//! ```

pub mod config;
pub mod progress;
pub mod protocol;
pub mod stub;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::progress::{NoProgress, Progress, Stage};
    pub use crate::protocol::serial::DEFAULT_BUFFER_SIZE;
    pub use crate::protocol::{
        list_ports, FlashError, FlashErrorKind, PortInfo, ProtocolError, RetryPolicy,
        SerialTransport, Session, SessionPhase, Transport,
    };
    pub use crate::stub::StubImage;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
