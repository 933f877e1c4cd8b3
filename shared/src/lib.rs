//! # Avarix Protocol Library
//!
//! This crate provides the serial link layer shared by robot node firmware,
//! the flash bootloader and host tools:
//!
//! - **PPP (Perlimpinpin)**: addressed frames with a header CRC and a payload
//!   CRC, parsed by a resumable receiver that dispatches payload handlers
//! - **ROME**: the first-generation framing with a single CRC per frame,
//!   still used by the bootloader
//! - **Reliable delivery**: ACK id allocation and a send-and-wait loop that
//!   keeps the node alive through the idle scheduler
//! - **Transport traits**: non-blocking byte source, byte sink, clock
//!
//! ## Architecture
//!
//! ```text
//! UART ISR ──► SPSC queue ──► ByteSource ──► Interface::update() ──► Handler
//!                                                                      │
//! UART ISR ◄── SPSC queue ◄── ByteSink   ◄── Sender ◄──────────────────┘
//! ```
//!
//! ## Non-blocking Strategy
//!
//! Every receive step does bounded work:
//! 1. Bytes are pulled one at a time and never waited for
//! 2. Parse position, CRC and handler continuation survive between polls
//! 3. Handlers return [`ppp::Progress::Pending`] instead of blocking
//! 4. Only the bootloader and the send-and-wait loop block on purpose

#![cfg_attr(not(feature = "std"), no_std)]

pub mod ack;
pub mod boot;
pub mod buffer;
pub mod config;
pub mod crc;
pub mod error;
pub mod idle;
pub mod ppp;
pub mod reliable;
pub mod rome;
pub mod traits;

// Re-export main types for convenience
pub use ack::AckTable;
pub use config::{AckConfig, NodeConfig};
pub use crc::Crc16;
pub use error::{ConfigError, FrameError, IdleError};
pub use idle::{Idle, IdleScheduler, IdleTask};
pub use traits::{ByteSink, ByteSource, Clock, IoPort};

/// Library version for protocol compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Node address reserved for broadcast frames
pub const BROADCAST: u8 = 0xFF;
