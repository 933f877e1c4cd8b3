//! # Perlimpinpin (PPP)
//!
//! Addressed multi-node framing. Each node owns an [`Interface`] per serial
//! line; received frames are routed through a filter to a payload
//! [`Handler`], and replies go out through the interface [`Sender`].

pub mod handler;
pub mod header;
pub mod interface;
pub mod payload;
pub mod sender;

pub use handler::{default_filter, Application, Handler, Progress};
pub use header::{Header, FRAME_OVERHEAD, HEADER_SIZE, START_BYTE};
pub use interface::{Interface, RecvState};
pub use payload::log::Severity;
pub use payload::room::{RoomCatalog, RoomMessage};
pub use payload::PayloadSet;
pub use sender::Sender;
