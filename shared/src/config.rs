//! Node configuration.
//!
//! Build-time values are plain constants and cargo features; per-node values
//! live in small `Copy` structs handed to the engines at construction.

use crate::error::ConfigError;
use crate::ppp::payload::{PayloadSet, COMPILED_IN};
use crate::BROADCAST;

/// Capacity of the PPP receive scratch buffer
pub const PAYLOAD_BUF_SIZE: usize = 32;

/// Name answered to SYSTEM NAME requests
pub const NODE_NAME: &str = "node";

/// Longest formatted log message, longer text is truncated
pub const LOG_FORMAT_MAX_SIZE: usize = 255;

/// How long send-and-wait waits for an ACK before retransmitting
pub const ACK_TIMEOUT_US: u32 = 500_000;

/// Default ACK id range
pub const ACK_MIN: u8 = 0x80;
pub const ACK_MAX: u8 = 0xFF;

/// Identity of a PPP node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NodeConfig {
    /// Node address, never 0xFF
    pub addr: u8,
    /// Answered to NAME requests
    pub name: &'static str,
    /// Payload types accepted by the default filter
    pub supported: PayloadSet,
}

impl NodeConfig {
    /// Node with the default name and the compiled-in payload types
    pub const fn new(addr: u8) -> Self {
        Self {
            addr,
            name: NODE_NAME,
            supported: COMPILED_IN,
        }
    }

    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub const fn with_supported(mut self, supported: PayloadSet) -> Self {
        self.supported = supported;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr == BROADCAST {
            return Err(ConfigError::BroadcastAddress);
        }
        // NAME reply carries the response id before the name
        let max = u16::MAX as usize - 1;
        if self.name.len() > max {
            return Err(ConfigError::NameTooLong { max });
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new(0x10)
    }
}

/// ACK id range and retransmission timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AckConfig {
    pub min: u8,
    pub max: u8,
    pub timeout_us: u32,
}

impl AckConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::EmptyAckRange {
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            min: ACK_MIN,
            max: ACK_MAX,
            timeout_us: ACK_TIMEOUT_US,
        }
    }
}
