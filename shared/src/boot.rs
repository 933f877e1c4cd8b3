//! # Bootloader Protocol
//!
//! Wire definitions shared by the flash bootloader and host tools. Commands
//! are ROME frames with a message id from [`Command`]; every command gets
//! exactly one reply frame with message id [`MID_REPLY`]:
//!
//! ```text
//! reply payload: ┌─────────┬────────┬──────────────────┐
//!                │ command │ status │ command fields   │
//!                └─────────┴────────┴──────────────────┘
//! ```
//!
//! Multi-byte fields are little-endian.
//!
//! | Command        | Parameters                 | Reply fields on success  |
//! |----------------|----------------------------|--------------------------|
//! | `Boot`         | none                       | none                     |
//! | `Info`         | none                       | page size (u16)          |
//! | `Mirror`       | one byte                   | the same byte            |
//! | `ProgPage`     | address (u32), CRC (u16)   | none                     |
//! | `Buffer`       | offset (u16), size, data   | none                     |
//! | `MemCrc`       | start (u32), size (u32)    | CRC (u16)                |
//! | `FuseRead`     | none                       | fuse bytes               |
//! | `ReadUserSig`  | none                       | user signature bytes     |
//! | `ProgUserSig`  | CRC (u16)                  | none                     |
//!
//! `ProgPage` and `ProgUserSig` open a write session fed with `Buffer`
//! commands. A `Buffer` with size 0 ends the session: the staged bytes are
//! checked against the announced CRC and written only when it matches.

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Message id of bootloader replies
pub const MID_REPLY: u8 = 0xBF;

/// Text of the log frame sent when the bootloader starts
pub const ENTER_MESSAGE: &[u8] = b"boot ENTER";

/// Fixed part of a `Buffer` command: offset (u16) and size (u8)
pub const BUFFER_HEADER_SIZE: usize = 3;

/// Largest `Buffer` data chunk
pub const MAX_BUFFER_CHUNK: usize = crate::rome::MAX_PAYLOAD_SIZE - BUFFER_HEADER_SIZE;

/// Number of fuse bytes returned by `FuseRead`
pub const FUSE_COUNT: usize = 6;

/// Size of the encoded [`UserSignature`]
pub const USER_SIG_SIZE: usize = 41;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Command {
    /// Leave the bootloader and start the application
    Boot = 0xB0,
    Info = 0xB1,
    /// Echo a byte back
    Mirror = 0xB2,
    ProgPage = 0xB3,
    Buffer = 0xB4,
    MemCrc = 0xB5,
    FuseRead = 0xB6,
    ReadUserSig = 0xB7,
    ProgUserSig = 0xB8,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0xB0 => Ok(Self::Boot),
            0xB1 => Ok(Self::Info),
            0xB2 => Ok(Self::Mirror),
            0xB3 => Ok(Self::ProgPage),
            0xB4 => Ok(Self::Buffer),
            0xB5 => Ok(Self::MemCrc),
            0xB6 => Ok(Self::FuseRead),
            0xB7 => Ok(Self::ReadUserSig),
            0xB8 => Ok(Self::ProgUserSig),
            other => Err(other),
        }
    }
}

/// Reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Status {
    Success = 0x01,
    UnknownCommand = 0x81,
    BadValue = 0x82,
    /// `Buffer` outside a write session, or another command inside one
    UnexpectedCommand = 0x83,
    CrcMismatch = 0x90,
    Error = 0xFF,
}

impl TryFrom<u8> for Status {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x01 => Ok(Self::Success),
            0x81 => Ok(Self::UnknownCommand),
            0x82 => Ok(Self::BadValue),
            0x83 => Ok(Self::UnexpectedCommand),
            0x90 => Ok(Self::CrcMismatch),
            0xFF => Ok(Self::Error),
            other => Err(other),
        }
    }
}

/// `ProgPage` parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgPage {
    #[serde(with = "postcard::fixint::le")]
    pub addr: u32,
    #[serde(with = "postcard::fixint::le")]
    pub crc: u16,
}

/// `MemCrc` parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemCrc {
    #[serde(with = "postcard::fixint::le")]
    pub start: u32,
    #[serde(with = "postcard::fixint::le")]
    pub size: u32,
}

/// Encode fixed-size command parameters into `out`
pub fn encode_params<'b, T: Serialize>(params: &T, out: &'b mut [u8]) -> Result<&'b [u8], FrameError> {
    postcard::to_slice(params, out)
        .map(|used| &*used)
        .map_err(|_| FrameError::Serialization)
}

/// Decode fixed-size command parameters, rejecting trailing bytes
pub fn decode_params<'a, T: Deserialize<'a>>(data: &'a [u8]) -> Result<T, FrameError> {
    let (value, rest) = postcard::take_from_bytes(data).map_err(|_| FrameError::Deserialization)?;
    if !rest.is_empty() {
        return Err(FrameError::LengthMismatch);
    }
    Ok(value)
}

/// `Buffer` command fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferChunk<'a> {
    pub offset: u16,
    pub data: &'a [u8],
}

impl<'a> BufferChunk<'a> {
    pub fn parse(params: &'a [u8]) -> Result<Self, FrameError> {
        if params.len() < BUFFER_HEADER_SIZE {
            return Err(FrameError::TooShort);
        }
        let offset = u16::from_le_bytes([params[0], params[1]]);
        let size = params[2] as usize;
        let data = &params[BUFFER_HEADER_SIZE..];
        if data.len() != size {
            return Err(FrameError::LengthMismatch);
        }
        Ok(Self { offset, data })
    }

    /// Write the command fields into `out`, returns the used length
    pub fn encode(&self, out: &mut [u8]) -> Result<usize, FrameError> {
        let size = u8::try_from(self.data.len()).map_err(|_| FrameError::PayloadTooLarge)?;
        let len = BUFFER_HEADER_SIZE + self.data.len();
        if out.len() < len {
            return Err(FrameError::BufferTooSmall);
        }
        out[..2].copy_from_slice(&self.offset.to_le_bytes());
        out[2] = size;
        out[BUFFER_HEADER_SIZE..len].copy_from_slice(self.data);
        Ok(len)
    }

    /// The end-of-session marker
    pub fn is_end(&self) -> bool {
        self.data.is_empty()
    }
}

/// Programming metadata stored in the user signature row
///
/// Layout: version (u8), device name (4 bytes), programming date as a
/// little-endian UNIX timestamp (u32), programming user (32 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSignature {
    pub version: u8,
    pub device_name: [u8; 4],
    #[serde(with = "postcard::fixint::le")]
    pub prog_date: u32,
    pub prog_user: [u8; 32],
}

impl UserSignature {
    /// Only layout version understood
    pub const VERSION: u8 = 1;

    /// Build a signature, padding or truncating text fields
    pub fn new(device_name: &str, prog_date: u32, prog_user: &str) -> Self {
        Self {
            version: Self::VERSION,
            device_name: padded(device_name.as_bytes()),
            prog_date,
            prog_user: padded(prog_user.as_bytes()),
        }
    }

    pub fn encode(&self) -> Result<[u8; USER_SIG_SIZE], FrameError> {
        let mut out = [0u8; USER_SIG_SIZE];
        let used = postcard::to_slice(self, &mut out)
            .map_err(|_| FrameError::Serialization)?
            .len();
        if used != USER_SIG_SIZE {
            return Err(FrameError::LengthMismatch);
        }
        Ok(out)
    }

    /// Decode a signature row; `None` when it holds no known version
    pub fn decode(data: &[u8]) -> Result<Option<Self>, FrameError> {
        if data.len() < USER_SIG_SIZE {
            return Err(FrameError::TooShort);
        }
        if data[0] != Self::VERSION {
            return Ok(None);
        }
        postcard::from_bytes(&data[..USER_SIG_SIZE])
            .map(Some)
            .map_err(|_| FrameError::Deserialization)
    }

    pub fn device_name(&self) -> &str {
        text(&self.device_name)
    }

    pub fn prog_user(&self) -> &str {
        text(&self.prog_user)
    }
}

fn padded<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = src.len().min(N);
    out[..n].copy_from_slice(&src[..n]);
    out
}

/// Text up to the first NUL, empty if not UTF-8
fn text(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..end]).unwrap_or("")
}
