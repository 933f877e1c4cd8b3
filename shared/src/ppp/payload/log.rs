//! LOG payload: text messages with a severity.
//!
//! Payload is one severity byte followed by the text. Bit 7 of the severity
//! byte asks the receiver for a SYSTEM ACK.

use core::fmt::{self, Write};
use core::task::Poll;

use crate::config::LOG_FORMAT_MAX_SIZE;
use crate::error::FrameError;
use crate::traits::{ByteSink, ByteSource};

use crate::ppp::handler::{Application, Progress};
use crate::ppp::header::Header;
use crate::ppp::interface::Interface;
use crate::ppp::payload;
use crate::ppp::sender::Sender;

/// Severity flag requesting an ACK
pub const ACK_REQUEST: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Severity {
    Debug = 0,
    Notice = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
}

impl TryFrom<u8> for Severity {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value & !ACK_REQUEST {
            0 => Ok(Self::Debug),
            1 => Ok(Self::Notice),
            2 => Ok(Self::Info),
            3 => Ok(Self::Warning),
            4 => Ok(Self::Error),
            other => Err(other),
        }
    }
}

impl<R: ByteSource, W: ByteSink, const N: usize> Interface<R, W, N> {
    /// Severity goes to scratch[0], text fills the rest and is truncated
    pub(crate) fn handle_log<A: Application>(&mut self, app: &mut A) -> Progress {
        if self.rx.payload_pos() == 0 {
            if self.rx.remaining() == 0 {
                return Progress::Abort;
            }
            if !self.recv_payload(1) {
                return Progress::Pending;
            }
        }
        while self.rx.remaining() > 0 {
            let Some(byte) = self.recv_data() else {
                return Progress::Pending;
            };
            self.rx.push(byte);
        }
        match self.recv_crc() {
            Poll::Pending => Progress::Pending,
            Poll::Ready(false) => Progress::Done,
            Poll::Ready(true) => {
                let request = *self.header();
                let severity = self.rx.payload()[0];
                app.on_log(&request, severity & !ACK_REQUEST, &self.rx.payload()[1..]);
                if severity & ACK_REQUEST != 0 {
                    if let Err(e) = self.tx.send_system_ack(&request, true) {
                        log::warn!("ppp: log ACK failed: {}", e);
                    }
                }
                Progress::Done
            }
        }
    }
}

/// `fmt::Write` into a fixed buffer, silently dropping what does not fit
struct Truncating<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let n = s.len().min(self.buf.len() - self.len);
        self.buf[self.len..self.len + n].copy_from_slice(&s.as_bytes()[..n]);
        self.len += n;
        Ok(())
    }
}

impl<W: ByteSink> Sender<W> {
    /// Send a log message to `dst`
    pub fn send_log(&mut self, dst: u8, severity: u8, msg: &[u8]) -> Result<(), FrameError> {
        let plsize = u16::try_from(msg.len() + 1).map_err(|_| FrameError::PayloadTooLarge)?;
        let header = Header::new(plsize, self.addr(), dst, payload::LOG);
        self.send_frame_parts(&header, &[&[severity], msg])
    }

    /// Format and send a log message, truncated to 255 bytes
    pub fn send_logf(&mut self, dst: u8, severity: u8, args: fmt::Arguments<'_>) -> Result<(), FrameError> {
        let mut buf = [0u8; LOG_FORMAT_MAX_SIZE];
        let mut writer = Truncating { buf: &mut buf, len: 0 };
        // Truncating never fails
        let _ = writer.write_fmt(args);
        let len = writer.len;
        self.send_log(dst, severity, &buf[..len])
    }
}
