//! # ROME Frame Definitions
//!
//! ## Frame Format
//!
//! ```text
//! ┌───────┬────────┬─────┬────────────────────┬──────────┐
//! │  'R'  │ plsize │ mid │      payload       │   CRC    │
//! │ 1 B   │  1 B   │ 1 B │    plsize bytes    │ 2 B (LE) │
//! └───────┴────────┴─────┴────────────────────┴──────────┘
//! ```
//!
//! The CRC covers `plsize`, `mid` and the payload. Orders, the messages that
//! expect an ACK, carry their ACK id as first payload byte.

use heapless::Vec;

use crate::crc::{self, Crc16};
use crate::error::FrameError;
use crate::traits::ByteSink;

/// Frame start byte
pub const START_BYTE: u8 = b'R';

/// Largest payload, bounded by the one-byte size field
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Bytes added around the payload: start, plsize, mid, CRC
pub const FRAME_OVERHEAD: usize = 5;

pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD_SIZE + FRAME_OVERHEAD;

/// A ROME message
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    mid: u8,
    payload: Vec<u8, MAX_PAYLOAD_SIZE>,
}

impl Frame {
    /// Frame with an empty payload
    pub const fn empty(mid: u8) -> Self {
        Self {
            mid,
            payload: Vec::new(),
        }
    }

    pub fn new(mid: u8, payload: &[u8]) -> Result<Self, FrameError> {
        let mut frame = Self::empty(mid);
        frame.push(payload)?;
        Ok(frame)
    }

    /// Order frame: ACK id placeholder followed by `params`
    pub fn order(mid: u8, params: &[u8]) -> Result<Self, FrameError> {
        let mut frame = Self::empty(mid);
        frame.push(&[0])?;
        frame.push(params)?;
        Ok(frame)
    }

    pub const fn mid(&self) -> u8 {
        self.mid
    }

    pub fn set_mid(&mut self, mid: u8) {
        self.mid = mid;
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn plsize(&self) -> u8 {
        // capacity is MAX_PAYLOAD_SIZE
        self.payload.len() as u8
    }

    /// Append payload bytes
    pub fn push(&mut self, data: &[u8]) -> Result<(), FrameError> {
        self.payload
            .extend_from_slice(data)
            .map_err(|_| FrameError::PayloadTooLarge)
    }

    pub fn clear(&mut self) {
        self.payload.clear();
    }

    pub(crate) fn push_byte(&mut self, byte: u8) -> bool {
        self.payload.push(byte).is_ok()
    }

    /// ACK id of an order frame
    pub fn ack(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Stamp the ACK id of an order frame
    pub fn set_ack(&mut self, ack: u8) {
        match self.payload.first_mut() {
            Some(first) => *first = ack,
            None => {
                // empty payload has room for one byte
                let _ = self.payload.push(ack);
            }
        }
    }

    /// CRC over plsize, mid and payload
    pub fn crc(&self) -> u16 {
        let mut crc = Crc16::new();
        crc.update(self.plsize());
        crc.update(self.mid);
        crc.update_slice(&self.payload);
        crc.value()
    }

    /// Size of the encoded frame
    pub fn encoded_len(&self) -> usize {
        self.payload.len() + FRAME_OVERHEAD
    }

    /// Write the wire form into `buffer`, returns the number of bytes
    pub fn encode(&self, buffer: &mut [u8]) -> Result<usize, FrameError> {
        let len = self.encoded_len();
        if buffer.len() < len {
            return Err(FrameError::BufferTooSmall);
        }
        buffer[0] = START_BYTE;
        buffer[1] = self.plsize();
        buffer[2] = self.mid;
        buffer[3..3 + self.payload.len()].copy_from_slice(&self.payload);
        buffer[len - 2..len].copy_from_slice(&self.crc().to_le_bytes());
        Ok(len)
    }

    /// Parse one complete frame
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < FRAME_OVERHEAD {
            return Err(FrameError::TooShort);
        }
        if data[0] != START_BYTE {
            return Err(FrameError::InvalidStart);
        }
        let plsize = data[1] as usize;
        let len = plsize + FRAME_OVERHEAD;
        if data.len() < len {
            return Err(FrameError::TooShort);
        }
        if data.len() > len {
            return Err(FrameError::LengthMismatch);
        }
        let expected = u16::from_le_bytes([data[len - 2], data[len - 1]]);
        if crc::checksum(&data[1..len - 2]) != expected {
            return Err(FrameError::CrcMismatch);
        }
        Self::new(data[2], &data[3..len - 2])
    }

    /// Stream the frame to `sink`, holding a critical section
    ///
    /// Frames with message id 0 are never sent.
    pub fn send<W: ByteSink>(&self, sink: &mut W) {
        if self.mid == 0 {
            log::trace!("rome: not sending frame with mid 0");
            return;
        }
        let crc = self.crc().to_le_bytes();
        critical_section::with(|_| {
            sink.send_buf(&[START_BYTE, self.plsize(), self.mid]);
            sink.send_buf(&self.payload);
            sink.send_buf(&crc);
        });
    }
}
