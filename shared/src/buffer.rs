//! # Serial Ring Buffers
//!
//! Each UART gets two single-producer single-consumer byte queues:
//!
//! ```text
//!            ┌──────────── rx queue ────────────┐
//!  RX ISR ──►│ Producer                Consumer │──► Port (ByteSource)
//!            └──────────────────────────────────┘
//!            ┌──────────── tx queue ────────────┐
//!  Port ────►│ Producer                Consumer │──► TX ISR (ByteSink)
//!            └──────────────────────────────────┘
//! ```
//!
//! The queues are `heapless::spsc::Queue`, which is lock-free for one
//! producer and one consumer. The interrupt side holds an [`IsrEnd`], the
//! main loop holds a [`Port`]. A `Queue<u8, N>` stores at most `N - 1` bytes.
//!
//! Frames are sent inside a critical section, which keeps the TX interrupt
//! from draining the queue. A port given a transmit service with
//! [`Port::with_tx_service`] runs it whenever the queue is full, typically
//! the body of the TX interrupt polling the hardware. Without one, bytes that
//! do not fit are dropped and counted by [`Port::tx_dropped`].

use heapless::spsc::{Consumer, Producer, Queue};

use crate::traits::{ByteSink, ByteSource};

impl<const N: usize> ByteSource for Consumer<'_, u8, N> {
    fn recv_nowait(&mut self) -> Option<u8> {
        self.dequeue()
    }
}

/// Receive and transmit queues of one serial line
pub struct SerialQueues<const RX: usize, const TX: usize> {
    rx: Queue<u8, RX>,
    tx: Queue<u8, TX>,
}

impl<const RX: usize, const TX: usize> SerialQueues<RX, TX> {
    /// Create empty queues (usable in a `static`)
    pub const fn new() -> Self {
        Self {
            rx: Queue::new(),
            tx: Queue::new(),
        }
    }

    /// Split into the main-loop port and the interrupt end
    pub fn split(&mut self) -> (Port<'_, RX, TX>, IsrEnd<'_, RX, TX>) {
        let (rx_prod, rx_cons) = self.rx.split();
        let (tx_prod, tx_cons) = self.tx.split();
        (
            Port {
                rx: rx_cons,
                tx: tx_prod,
                tx_service: None,
                tx_dropped: 0,
            },
            IsrEnd {
                rx: rx_prod,
                tx: tx_cons,
                overruns: 0,
            },
        )
    }
}

impl<const RX: usize, const TX: usize> Default for SerialQueues<RX, TX> {
    fn default() -> Self {
        Self::new()
    }
}

/// Main-loop side of a serial line
pub struct Port<'a, const RX: usize, const TX: usize> {
    rx: Consumer<'a, u8, RX>,
    tx: Producer<'a, u8, TX>,
    /// Moves queued bytes to the wire while interrupts are masked
    tx_service: Option<&'a mut dyn FnMut()>,
    tx_dropped: u32,
}

impl<'a, const RX: usize, const TX: usize> Port<'a, RX, TX> {
    /// Run `service` while the transmit queue is full
    ///
    /// `service` must send at least one queued byte when the line is idle,
    /// or sending a frame larger than the queue never completes.
    pub fn with_tx_service(mut self, service: &'a mut dyn FnMut()) -> Self {
        self.tx_service = Some(service);
        self
    }

    /// Bytes lost because the transmit queue was full
    pub fn tx_dropped(&self) -> u32 {
        self.tx_dropped
    }
}

impl<const RX: usize, const TX: usize> ByteSource for Port<'_, RX, TX> {
    fn recv_nowait(&mut self) -> Option<u8> {
        self.rx.recv_nowait()
    }
}

impl<const RX: usize, const TX: usize> ByteSink for Port<'_, RX, TX> {
    fn send(&mut self, byte: u8) {
        let mut pending = byte;
        while let Err(b) = self.tx.enqueue(pending) {
            let Some(service) = self.tx_service.as_mut() else {
                self.tx_dropped = self.tx_dropped.wrapping_add(1);
                return;
            };
            pending = b;
            service();
        }
    }
}

/// Interrupt side of a serial line
pub struct IsrEnd<'a, const RX: usize, const TX: usize> {
    rx: Producer<'a, u8, RX>,
    tx: Consumer<'a, u8, TX>,
    overruns: u32,
}

impl<const RX: usize, const TX: usize> IsrEnd<'_, RX, TX> {
    /// Store a received byte; returns false and counts an overrun when full
    pub fn on_receive(&mut self, byte: u8) -> bool {
        if self.rx.enqueue(byte).is_err() {
            self.overruns = self.overruns.wrapping_add(1);
            return false;
        }
        true
    }

    /// Next byte to put on the wire
    pub fn next_to_send(&mut self) -> Option<u8> {
        self.tx.dequeue()
    }

    /// Whether the transmit interrupt still has work
    pub fn tx_pending(&self) -> bool {
        self.tx.ready()
    }

    /// Received bytes dropped because the queue was full
    pub fn overruns(&self) -> u32 {
        self.overruns
    }
}
