//! Session configuration
//!
//! Everything a flashing session needs besides the images themselves. Values
//! can be overridden from a JSON file; missing fields keep their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::protocol::{
    RetryPolicy, DEFAULT_CHIP_TYPE, DEFAULT_FLASH_ADDRESS, DEFAULT_LOAD_ADDRESS,
    DEFAULT_TARGET_BAUD_RATE,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Flashing session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// SRAM address the stub is uploaded to and booted from
    pub load_address: u32,
    /// Flash address the firmware is written to
    pub flash_address: u32,
    /// Baud rate to switch to once the stub is running
    pub target_baud: u32,
    /// Flash chip selector passed to FLASH_INIT
    pub chip_type: u32,
    /// Retry and timing policy
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            load_address: DEFAULT_LOAD_ADDRESS,
            flash_address: DEFAULT_FLASH_ADDRESS,
            target_baud: DEFAULT_TARGET_BAUD_RATE,
            chip_type: DEFAULT_CHIP_TYPE,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
