//! PPP frame header.
//!
//! ```text
//! ┌───────┬────────────────┬─────┬─────┬────────┬──────────┬─────────┬─────────┐
//! │  'P'  │ plsize (LE u16)│ src │ dst │ pltype │ hdr CRC  │ payload │ pl CRC  │
//! │ 1 B   │      2 B       │ 1 B │ 1 B │  1 B   │   2 B    │ plsize  │   2 B   │
//! └───────┴────────────────┴─────┴─────┴────────┴──────────┴─────────┴─────────┘
//! ```
//!
//! The header CRC covers the five header bytes, the payload CRC covers the
//! payload only. Both are sent little-endian.

use crate::BROADCAST;

/// Frame start byte
pub const START_BYTE: u8 = b'P';

/// Header size, without start byte and CRC
pub const HEADER_SIZE: usize = 5;

/// Bytes added around the payload: start, header, two CRCs
pub const FRAME_OVERHEAD: usize = 1 + HEADER_SIZE + 2 + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Header {
    /// Payload size
    pub plsize: u16,
    /// Source address
    pub src: u8,
    /// Destination address, 0xFF for broadcast
    pub dst: u8,
    /// Payload type
    pub pltype: u8,
}

impl Header {
    pub const fn new(plsize: u16, src: u8, dst: u8, pltype: u8) -> Self {
        Self {
            plsize,
            src,
            dst,
            pltype,
        }
    }

    /// Header fields in wire order
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let size = self.plsize.to_le_bytes();
        [size[0], size[1], self.src, self.dst, self.pltype]
    }

    pub fn decode(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            plsize: u16::from_le_bytes([buf[0], buf[1]]),
            src: buf[2],
            dst: buf[3],
            pltype: buf[4],
        }
    }

    /// Whether a node with address `addr` should accept this frame
    pub const fn is_for(&self, addr: u8) -> bool {
        self.dst == addr || self.dst == BROADCAST
    }

    pub const fn is_broadcast(&self) -> bool {
        self.dst == BROADCAST
    }
}
