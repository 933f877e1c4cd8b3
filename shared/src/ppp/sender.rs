//! PPP frame emission.
//!
//! A frame is either sent in one call ([`Sender::send_frame`],
//! [`Sender::send_frame_parts`]) which holds a critical section for the whole
//! frame, or built step by step with [`Sender::send_header`],
//! [`Sender::send_data`] and [`Sender::send_crc`]. In the step-by-step case
//! the caller is responsible for not interleaving frames.

use crate::crc::Crc16;
use crate::error::FrameError;
use crate::traits::ByteSink;

use super::header::{Header, START_BYTE};

/// Transmit side of a PPP interface
#[derive(Debug)]
pub struct Sender<W> {
    sink: W,
    crc: Crc16,
    addr: u8,
}

impl<W: ByteSink> Sender<W> {
    /// Sender emitting frames from node `addr`
    pub const fn new(sink: W, addr: u8) -> Self {
        Self {
            sink,
            crc: Crc16::new(),
            addr,
        }
    }

    pub const fn addr(&self) -> u8 {
        self.addr
    }

    pub fn sink(&mut self) -> &mut W {
        &mut self.sink
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Send start byte, header and header CRC, then reset the payload CRC
    pub fn send_header(&mut self, header: &Header) {
        self.sink.send(START_BYTE);
        self.crc.reset();
        self.send_data(&header.encode());
        self.send_crc();
    }

    /// Send payload bytes, updating the running CRC
    pub fn send_data(&mut self, data: &[u8]) {
        self.crc.update_slice(data);
        self.sink.send_buf(data);
    }

    /// Send the running CRC and reset it
    pub fn send_crc(&mut self) {
        self.sink.send_buf(&self.crc.value().to_le_bytes());
        self.crc.reset();
    }

    /// Send a complete frame atomically
    pub fn send_frame(&mut self, header: &Header, data: &[u8]) -> Result<(), FrameError> {
        self.send_frame_parts(header, &[data])
    }

    /// Send a complete frame whose payload is the concatenation of `parts`
    pub fn send_frame_parts(&mut self, header: &Header, parts: &[&[u8]]) -> Result<(), FrameError> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        if len != header.plsize as usize {
            return Err(FrameError::LengthMismatch);
        }
        critical_section::with(|_| {
            self.send_header(header);
            for part in parts {
                self.send_data(part);
            }
            self.send_crc();
        });
        Ok(())
    }

    /// Send a frame from this node to `dst`
    pub fn send_to(&mut self, dst: u8, pltype: u8, data: &[u8]) -> Result<(), FrameError> {
        let plsize = u16::try_from(data.len()).map_err(|_| FrameError::PayloadTooLarge)?;
        let header = Header::new(plsize, self.addr, dst, pltype);
        self.send_frame(&header, data)
    }

    /// Answer `request` with a frame back to its source
    pub fn reply_parts(&mut self, request: &Header, pltype: u8, parts: &[&[u8]]) -> Result<(), FrameError> {
        let len: usize = parts.iter().map(|p| p.len()).sum();
        let plsize = u16::try_from(len).map_err(|_| FrameError::PayloadTooLarge)?;
        let header = Header::new(plsize, self.addr, request.src, pltype);
        self.send_frame_parts(&header, parts)
    }
}
