//! Error types shared by the protocol engines.
//!
//! Framing errors on the receive path never surface here: corrupted or
//! unwanted frames are dropped silently and the receivers resynchronize.
//! These types cover the encoding side and local configuration mistakes.

use thiserror::Error;

/// Errors during frame building/parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Buffer too small for frame
    #[error("buffer too small for frame")]
    BufferTooSmall,
    /// Frame data too short
    #[error("frame data too short")]
    TooShort,
    /// First byte is not the start byte
    #[error("invalid start byte")]
    InvalidStart,
    /// Declared size and actual data length differ
    #[error("length does not match declared size")]
    LengthMismatch,
    /// Payload does not fit in a frame
    #[error("payload too large")]
    PayloadTooLarge,
    /// CRC check failed
    #[error("CRC mismatch")]
    CrcMismatch,
    /// Serialization failed
    #[error("serialization failed")]
    Serialization,
    /// Deserialization failed
    #[error("deserialization failed")]
    Deserialization,
}

/// Invalid runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    #[error("node address 0xFF is reserved for broadcast")]
    BroadcastAddress,
    #[error("node name longer than {max} bytes")]
    NameTooLong { max: usize },
    #[error("empty ACK range: min {min:#04x} > max {max:#04x}")]
    EmptyAckRange { min: u8, max: u8 },
    #[error("page size {0} is not a non-zero even value")]
    InvalidPageSize(u16),
    #[error("application end {0:#x} is not on a page boundary")]
    UnalignedAppEnd(u32),
}

/// Errors when registering idle tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IdleError {
    #[error("frequency must be in 1..=255")]
    InvalidFrequency,
    #[error("task frequency {freq} exceeds max frequency {max}")]
    FrequencyTooHigh { freq: u8, max: u8 },
    #[error("task frequency {freq} does not divide max frequency {max}")]
    NotADivider { freq: u8, max: u8 },
    #[error("no free task slot")]
    TooManyTasks,
    #[error("unknown task id")]
    UnknownTask,
}
