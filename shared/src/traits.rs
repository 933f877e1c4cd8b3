//! # Transport Abstractions
//!
//! The protocol engines never touch a UART directly. They pull bytes from a
//! [`ByteSource`], push bytes into a [`ByteSink`] and read time from a
//! [`Clock`]:
//!
//! - **ByteSource**: non-blocking, returns `None` when no byte is pending
//! - **ByteSink**: may block while the transmit side is full
//! - **Clock**: free-running microsecond counter, compared with wrapping math
//!
//! Implementations are provided for `heapless` SPSC queue halves (see
//! [`crate::buffer`]), for any `embedded-io` port through [`IoPort`], and for
//! `std` collections so host code and tests can drive the engines in memory.

use embedded_io::{Error as _, Read, ReadReady, Write};

/// Non-blocking byte input
pub trait ByteSource {
    /// Return the next received byte, or `None` when nothing is pending
    fn recv_nowait(&mut self) -> Option<u8>;
}

/// Byte output
///
/// Frames are sent while a critical section is held (see
/// [`crate::ppp::Sender::send_frame`]), so a sink must never wait on an
/// interrupt to make room.
pub trait ByteSink {
    /// Send a single byte
    fn send(&mut self, byte: u8);

    /// Send a buffer
    fn send_buf(&mut self, data: &[u8]) {
        for &b in data {
            self.send(b);
        }
    }
}

/// Microsecond time base
pub trait Clock {
    /// Current time in microseconds, wrapping on overflow
    fn now_us(&self) -> u32;

    /// Microseconds elapsed since `since`
    fn elapsed_us(&self, since: u32) -> u32 {
        self.now_us().wrapping_sub(since)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn recv_nowait(&mut self) -> Option<u8> {
        (**self).recv_nowait()
    }
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn send(&mut self, byte: u8) {
        (**self).send(byte)
    }

    fn send_buf(&mut self, data: &[u8]) {
        (**self).send_buf(data)
    }
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_us(&self) -> u32 {
        (**self).now_us()
    }
}

/// Adapter exposing an `embedded-io` port as a byte source and sink
///
/// Reads only happen when the port reports data ready. Write errors are
/// logged and the byte is lost, like a UART overrun.
#[derive(Debug)]
pub struct IoPort<T>(pub T);

impl<T> IoPort<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: Read + ReadReady> ByteSource for IoPort<T> {
    fn recv_nowait(&mut self) -> Option<u8> {
        match self.0.read_ready() {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                log::warn!("serial read_ready failed: {:?}", e.kind());
                return None;
            }
        }
        let mut byte = [0u8; 1];
        match self.0.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(e) => {
                log::warn!("serial read failed: {:?}", e.kind());
                None
            }
        }
    }
}

impl<T: Write> ByteSink for IoPort<T> {
    fn send(&mut self, byte: u8) {
        self.send_buf(&[byte]);
    }

    fn send_buf(&mut self, data: &[u8]) {
        if let Err(e) = self.0.write_all(data) {
            log::warn!("serial write failed: {:?}", e.kind());
        }
    }
}

#[cfg(feature = "std")]
impl ByteSource for std::collections::VecDeque<u8> {
    fn recv_nowait(&mut self) -> Option<u8> {
        self.pop_front()
    }
}

#[cfg(feature = "std")]
impl ByteSink for std::vec::Vec<u8> {
    fn send(&mut self, byte: u8) {
        self.push(byte);
    }

    fn send_buf(&mut self, data: &[u8]) {
        self.extend_from_slice(data);
    }
}

#[cfg(feature = "std")]
impl ByteSink for std::collections::VecDeque<u8> {
    fn send(&mut self, byte: u8) {
        self.push_back(byte);
    }
}
