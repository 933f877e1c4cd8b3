//! Resumable ROME frame reader.

use crate::crc::Crc16;
use crate::traits::ByteSource;

use super::frame::{Frame, START_BYTE};

/// Incremental frame parser
///
/// Bytes are consumed one at a time; parse position and running CRC survive
/// between calls to [`Reader::read`].
#[derive(Debug, Default)]
pub struct Reader {
    /// 0 while looking for the start byte
    pos: usize,
    plsize: u8,
    crc: Crc16,
    frame: Frame,
}

impl Reader {
    pub const fn new() -> Self {
        Self {
            pos: 0,
            plsize: 0,
            crc: Crc16::new(),
            frame: Frame::empty(0),
        }
    }

    /// Bytes of the current frame consumed so far
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Last frame completed by [`Reader::feed`]
    ///
    /// Only meaningful right after `feed` returned true.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Consume available bytes until a valid frame completes
    ///
    /// Returns `None` when the source runs dry. Frames with a bad CRC are
    /// dropped and parsing resumes with the next start byte.
    pub fn read<S: ByteSource>(&mut self, source: &mut S) -> Option<&Frame> {
        loop {
            let byte = source.recv_nowait()?;
            if self.feed(byte) {
                return Some(&self.frame);
            }
        }
    }

    /// Feed one byte, true when it completes a valid frame
    pub fn feed(&mut self, byte: u8) -> bool {
        let payload_end = 3 + self.plsize as usize;
        match self.pos {
            0 => {
                if byte == START_BYTE {
                    self.crc.reset();
                    self.frame.clear();
                    self.pos = 1;
                }
                return false;
            }
            1 => {
                self.plsize = byte;
                self.crc.update(byte);
            }
            2 => {
                self.frame.set_mid(byte);
                self.crc.update(byte);
            }
            p if p < payload_end => {
                self.frame.push_byte(byte);
                self.crc.update(byte);
            }
            p if p == payload_end => self.crc.xor_low(byte),
            _ => {
                self.crc.xor_high(byte);
                self.pos = 0;
                if self.crc.is_zero() {
                    return true;
                }
                log::debug!("rome: CRC mismatch on frame {:02x}", self.frame.mid());
                return false;
            }
        }
        self.pos += 1;
        false
    }
}
