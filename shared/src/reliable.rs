//! # Reliable Delivery
//!
//! Orders are retransmitted until their ACK arrives:
//!
//! ```text
//!  next_ack() ──► stamp id ──► send ──► wait (idle tasks run) ──► ACK? ──► done
//!      ▲                                      │ timeout
//!      └──────────────────────────────────────┘
//! ```
//!
//! Every attempt takes a fresh ACK id, so a late ACK of an earlier attempt
//! does not end the wait. There is no retry limit. Ids of unanswered
//! attempts stay active until their ACK shows up.
//!
//! The receive path must keep running while waiting, otherwise the ACK is
//! never seen: register an [`AckListener`] (or any task polling the line) in
//! the idle scheduler passed to [`send_wait`].

use crate::ack::AckTable;
use crate::idle::{Idle, IdleTask};
use crate::rome::{self, Frame, Reader};
use crate::traits::{ByteSink, ByteSource, Clock};

/// Result of a send-and-wait step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitStatus {
    /// ACK not received yet
    Pending,
    /// ACK received
    Acked,
}

#[derive(Debug, Clone, Copy)]
struct Attempt {
    ack: u8,
    sent_at: u32,
}

/// Non-blocking send-and-wait state machine
#[derive(Debug)]
pub struct SendWait<'a> {
    acks: &'a AckTable,
    timeout_us: u32,
    attempt: Option<Attempt>,
    attempts: u32,
}

impl<'a> SendWait<'a> {
    pub fn new(acks: &'a AckTable, timeout_us: u32) -> Self {
        Self {
            acks,
            timeout_us,
            attempt: None,
            attempts: 0,
        }
    }

    /// Send, check for the ACK or retransmit after the timeout
    pub fn poll<W: ByteSink, C: Clock>(&mut self, sink: &mut W, frame: &mut Frame, clock: &C) -> WaitStatus {
        match self.attempt {
            None => self.transmit(sink, frame, clock),
            Some(attempt) => {
                if !self.acks.ack_expected(attempt.ack) {
                    return WaitStatus::Acked;
                }
                if clock.elapsed_us(attempt.sent_at) >= self.timeout_us {
                    log::debug!("reliable: no ACK for 0x{:02x}, retransmitting", attempt.ack);
                    self.transmit(sink, frame, clock);
                }
            }
        }
        WaitStatus::Pending
    }

    fn transmit<W: ByteSink, C: Clock>(&mut self, sink: &mut W, frame: &mut Frame, clock: &C) {
        let ack = self.acks.next_ack();
        frame.set_ack(ack);
        frame.send(sink);
        self.attempt = Some(Attempt {
            ack,
            sent_at: clock.now_us(),
        });
        self.attempts += 1;
    }

    /// Frames sent so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// ACK id of the latest attempt
    pub fn current_ack(&self) -> Option<u8> {
        self.attempt.map(|a| a.ack)
    }
}

/// Send `frame` until acknowledged, running `idle` while waiting
///
/// Blocks with no upper bound.
pub fn send_wait<W, C, I>(sink: &mut W, frame: &mut Frame, acks: &AckTable, clock: &C, idle: &mut I, timeout_us: u32)
where
    W: ByteSink,
    C: Clock,
    I: Idle + ?Sized,
{
    let mut wait = SendWait::new(acks, timeout_us);
    while wait.poll(sink, frame, clock) == WaitStatus::Pending {
        idle.idle();
    }
    log::trace!("reliable: frame {:02x} acked after {} attempt(s)", frame.mid(), wait.attempts());
}

/// Idle task reading ROME frames and releasing ACK ids
///
/// Frames other than ACKs go to `on_frame`.
pub struct AckListener<'a, S, F> {
    source: S,
    reader: Reader,
    acks: &'a AckTable,
    on_frame: F,
}

impl<'a, S: ByteSource, F: FnMut(&Frame)> AckListener<'a, S, F> {
    pub fn new(source: S, acks: &'a AckTable, on_frame: F) -> Self {
        Self {
            source,
            reader: Reader::new(),
            acks,
            on_frame,
        }
    }

    /// Handle every complete frame available
    pub fn poll(&mut self) {
        while let Some(frame) = self.reader.read(&mut self.source) {
            if !rome::handle_ack(frame, self.acks) {
                (self.on_frame)(frame);
            }
        }
    }
}

impl<S: ByteSource, F: FnMut(&Frame)> IdleTask for AckListener<'_, S, F> {
    fn run(&mut self) {
        self.poll()
    }
}
