//! # PPP Interface
//!
//! An [`Interface`] owns one serial line: its byte source, its [`Sender`],
//! the node configuration and the receive state. [`Interface::update`] pulls
//! every available byte and drives the parser:
//!
//! ```text
//!  start byte ──► header (5 B) ──► header CRC ──► filter ──► handler steps
//!      ▲              │ bad CRC                                   │
//!      └──────────────┴──────────────── frame done / aborted ◄────┘
//! ```
//!
//! Parsing never waits: when the source runs dry `update` returns, and the
//! next call resumes at the exact byte where the previous one stopped.

use core::task::Poll;

use crate::config::{NodeConfig, PAYLOAD_BUF_SIZE};
use crate::crc::Crc16;
use crate::traits::{ByteSink, ByteSource};

use super::handler::{Application, Handler, Progress};
use super::header::{Header, HEADER_SIZE, START_BYTE};
use super::sender::Sender;

/// Receive state of the frame being parsed
#[derive(Debug)]
pub struct RecvState<const N: usize> {
    /// Bytes of the current frame consumed so far, start byte included
    pos: usize,
    header_buf: [u8; HEADER_SIZE],
    header: Header,
    /// Payload bytes not consumed yet
    remaining: u16,
    crc: Crc16,
    /// Payload CRC bytes consumed (0..=2)
    trailer: u8,
    handler: Option<Handler>,
    /// Free for use by handlers, reset on each frame
    pub udata: u16,
    payload: [u8; N],
    payload_pos: usize,
}

impl<const N: usize> RecvState<N> {
    const fn new() -> Self {
        Self {
            pos: 0,
            header_buf: [0; HEADER_SIZE],
            header: Header::new(0, 0, 0, 0),
            remaining: 0,
            crc: Crc16::new(),
            trailer: 0,
            handler: None,
            udata: 0,
            payload: [0; N],
            payload_pos: 0,
        }
    }

    fn reset(&mut self) {
        self.pos = 0;
        self.crc.reset();
        self.remaining = 0;
        self.trailer = 0;
        self.handler = None;
        self.udata = 0;
        self.payload_pos = 0;
    }

    /// Header of the current frame, valid once the header CRC matched
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Payload bytes not read yet
    pub fn remaining(&self) -> u16 {
        self.remaining
    }

    pub fn handler(&self) -> Option<Handler> {
        self.handler
    }

    /// Bytes stored in the scratch buffer
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_pos]
    }

    pub fn payload_pos(&self) -> usize {
        self.payload_pos
    }

    /// Append to the scratch buffer, false when it is full
    pub(crate) fn push(&mut self, byte: u8) -> bool {
        if self.payload_pos >= N {
            return false;
        }
        self.payload[self.payload_pos] = byte;
        self.payload_pos += 1;
        true
    }

    /// Rewind the scratch buffer write position
    pub fn set_payload_pos(&mut self, pos: usize) {
        self.payload_pos = pos.min(N);
    }

    /// Scratch buffer capacity
    pub const fn capacity(&self) -> usize {
        N
    }

    fn header_done(&self) -> bool {
        self.pos >= 1 + HEADER_SIZE + 2
    }
}

/// PPP node interface on one serial line
pub struct Interface<R, W, const N: usize = PAYLOAD_BUF_SIZE> {
    source: R,
    pub(crate) tx: Sender<W>,
    config: NodeConfig,
    pub(crate) rx: RecvState<N>,
}

impl<R: ByteSource, W: ByteSink, const N: usize> Interface<R, W, N> {
    const SCRATCH_NOT_EMPTY: () = assert!(N >= 1, "scratch buffer needs at least one byte");

    pub fn new(config: NodeConfig, source: R, sink: W) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::SCRATCH_NOT_EMPTY;
        log::debug!("ppp: interface 0x{:02x} ({})", config.addr, config.name);
        Self {
            source,
            tx: Sender::new(sink, config.addr),
            config,
            rx: RecvState::new(),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn tx(&mut self) -> &mut Sender<W> {
        &mut self.tx
    }

    pub fn rx(&self) -> &RecvState<N> {
        &self.rx
    }

    pub fn rx_mut(&mut self) -> &mut RecvState<N> {
        &mut self.rx
    }

    /// Header of the frame being handled
    pub fn header(&self) -> &Header {
        &self.rx.header
    }

    pub fn source_mut(&mut self) -> &mut R {
        &mut self.source
    }

    pub fn into_parts(self) -> (R, W) {
        (self.source, self.tx.into_inner())
    }

    /// Process all available input
    pub fn update<A: Application>(&mut self, app: &mut A) {
        loop {
            if !self.recv_header() {
                return;
            }

            if self.rx.handler.is_none() {
                let handler = app.filter(&self.config, &self.rx.header).unwrap_or(Handler::Drop);
                log::trace!(
                    "ppp: frame {:02x} -> {:02x} type {:02x} size {} handled by {:?}",
                    self.rx.header.src,
                    self.rx.header.dst,
                    self.rx.header.pltype,
                    self.rx.header.plsize,
                    handler
                );
                self.rx.handler = Some(handler);
            }

            loop {
                match self.dispatch(app) {
                    Progress::Pending => return,
                    Progress::Done => break,
                    Progress::Abort => {
                        log::debug!("ppp: frame aborted, dropping");
                        self.rx.handler = Some(Handler::Drop);
                    }
                }
            }
            self.rx.reset();
        }
    }

    /// Consume start byte, header and header CRC; false if input ran dry
    fn recv_header(&mut self) -> bool {
        while !self.rx.header_done() {
            let Some(byte) = self.source.recv_nowait() else {
                return false;
            };
            match self.rx.pos {
                0 => {
                    if byte == START_BYTE {
                        self.rx.pos = 1;
                    }
                    continue;
                }
                p if p <= HEADER_SIZE => {
                    self.rx.header_buf[p - 1] = byte;
                    self.rx.crc.update(byte);
                }
                p if p == HEADER_SIZE + 1 => self.rx.crc.xor_low(byte),
                _ => {
                    self.rx.crc.xor_high(byte);
                    if !self.rx.crc.is_zero() {
                        log::debug!("ppp: header CRC mismatch");
                        self.rx.reset();
                        continue;
                    }
                    self.rx.crc.reset();
                    self.rx.header = Header::decode(&self.rx.header_buf);
                    self.rx.remaining = self.rx.header.plsize;
                }
            }
            self.rx.pos += 1;
        }
        true
    }

    /// Run one step of the current handler
    fn dispatch<A: Application>(&mut self, app: &mut A) -> Progress {
        match self.rx.handler.unwrap_or(Handler::Drop) {
            Handler::Drop => self.drop_frame(),
            Handler::System => self.handle_system(app),
            Handler::SystemPing => self.handle_system_ping(),
            Handler::SystemTraceroute => self.handle_system_traceroute(),
            Handler::SystemName => self.handle_system_name(),
            Handler::SystemSupportedPayloads => self.handle_system_supported(),
            Handler::SystemControl(id) => self.handle_system_control(app, id),
            Handler::Log => self.handle_log(app),
            Handler::Room => self.handle_room(app),
            Handler::RoomProcess => self.handle_room_process(app),
            Handler::Custom(tag) => app.custom(tag, self),
        }
    }

    /// Rebind the current frame to `handler` and run it
    pub(crate) fn continue_with<A: Application>(&mut self, app: &mut A, handler: Handler) -> Progress {
        self.rx.handler = Some(handler);
        self.dispatch(app)
    }

    /// Rebind the current frame to another handler, effective on next step
    pub fn set_handler(&mut self, handler: Handler) {
        self.rx.handler = Some(handler);
    }

    /// Skip the rest of the payload and the payload CRC
    fn drop_frame(&mut self) -> Progress {
        while self.rx.remaining > 0 {
            if self.source.recv_nowait().is_none() {
                return Progress::Pending;
            }
            self.rx.remaining -= 1;
            self.rx.pos += 1;
        }
        while self.rx.trailer < 2 {
            if self.source.recv_nowait().is_none() {
                return Progress::Pending;
            }
            self.rx.trailer += 1;
            self.rx.pos += 1;
        }
        Progress::Done
    }

    /// Read one payload byte, updating the payload CRC
    ///
    /// Must only be called while [`RecvState::remaining`] is non-zero.
    pub fn recv_data(&mut self) -> Option<u8> {
        debug_assert!(self.rx.remaining > 0, "payload already consumed");
        let byte = self.source.recv_nowait()?;
        self.rx.crc.update(byte);
        self.rx.remaining = self.rx.remaining.saturating_sub(1);
        self.rx.pos += 1;
        Some(byte)
    }

    /// Read the payload CRC once the payload is consumed
    ///
    /// `Ready(true)` when it matches. Calling it again after completion
    /// returns the same result.
    pub fn recv_crc(&mut self) -> Poll<bool> {
        debug_assert_eq!(self.rx.remaining, 0, "payload not fully consumed");
        if self.rx.trailer == 0 {
            let Some(byte) = self.source.recv_nowait() else {
                return Poll::Pending;
            };
            self.rx.crc.xor_low(byte);
            self.rx.trailer = 1;
            self.rx.pos += 1;
        }
        if self.rx.trailer == 1 {
            let Some(byte) = self.source.recv_nowait() else {
                return Poll::Pending;
            };
            self.rx.crc.xor_high(byte);
            self.rx.trailer = 2;
            self.rx.pos += 1;
        }
        Poll::Ready(self.rx.crc.is_zero())
    }

    /// Fill the scratch buffer up to `n` bytes; true once they are all there
    pub fn recv_payload(&mut self, n: usize) -> bool {
        let n = n.min(N);
        while self.rx.payload_pos < n {
            let Some(byte) = self.recv_data() else {
                return false;
            };
            self.rx.payload[self.rx.payload_pos] = byte;
            self.rx.payload_pos += 1;
        }
        true
    }

    /// Read the rest of the payload into the scratch buffer, then its CRC
    ///
    /// The caller checks beforehand that the payload fits.
    pub fn recv_payload_all(&mut self) -> Poll<bool> {
        let target = self.rx.payload_pos + self.rx.remaining as usize;
        debug_assert!(target <= N, "payload does not fit scratch buffer");
        if !self.recv_payload(target) {
            return Poll::Pending;
        }
        self.recv_crc()
    }
}
