//! Error types for host tools.

use avarix_proto::boot::{Command, Status};
use avarix_proto::FrameError;
use thiserror::Error;

use crate::hex::HexError;

/// Errors talking to the bootloader
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error on the serial port
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be built or decoded
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Bootloader replied with an error status
    #[error("{command:?} failed: {status:?}")]
    Status { command: Command, status: Status },

    /// Reply status byte is not a known status
    #[error("{command:?}: unknown status 0x{status:02x}")]
    UnknownStatus { command: Command, status: u8 },

    /// Reply fields do not have the expected size
    #[error("{0:?}: malformed reply")]
    MalformedReply(Command),

    /// No reply before the deadline
    #[error("no reply to {0:?}")]
    Timeout(Command),

    /// The written data kept failing its CRC check
    #[error("CRC mismatch at 0x{0:06x}, giving up")]
    TooManyRetries(u32),

    /// Page not aligned or larger than the device page
    #[error("invalid page at 0x{addr:06x} for page size {page_size}")]
    BadPage { addr: u32, page_size: u16 },

    #[error("invalid HEX data: {0}")]
    Hex(#[from] HexError),

    #[error("empty image")]
    EmptyImage,
}

/// Result type alias using ClientError.
pub type Result<T> = core::result::Result<T, ClientError>;
