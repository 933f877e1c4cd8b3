//! # Avarix Host Tools
//!
//! Host side of the flash bootloader protocol. Works over anything that
//! implements [`std::io::Read`] and [`std::io::Write`], typically a serial
//! port configured with a short read timeout.
//!
//! ## Programming Flow
//!
//! ```text
//!  HEX file ──► parse_hex() ──► split_pages() ──► diff_pages() (optional)
//!                                                      │
//!                                                      ▼
//!  device ◄── ProgPage + Buffer... + Buffer(end) ◄── program()
//!     │
//!     └──► check() compares MemCrc replies with local CRCs
//! ```
//!
//! Pages failing the device-side CRC check are sent again, up to
//! [`client::CRC_ATTEMPTS`] times.

pub mod client;
pub mod error;
pub mod hex;

pub use client::BootClient;
pub use error::{ClientError, Result};
pub use hex::{diff_pages, load_hex, parse_hex, split_pages, Chunk, HexError, Page};
