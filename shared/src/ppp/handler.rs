//! Payload handlers and application hooks.
//!
//! A handler is a step of a resumable state machine. It is stored in the
//! receive state as a [`Handler`] value and called again on every
//! [`Interface::update`] until it reports [`Progress::Done`] or
//! [`Progress::Abort`]. A handler may rebind itself to a continuation, which
//! is how multi-step payloads like SYSTEM or ROOM are parsed.

use crate::config::NodeConfig;
use crate::traits::{ByteSink, ByteSource};

use super::header::Header;
use super::interface::Interface;
use super::payload;
use super::sender::Sender;

/// Result of one handler step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// Waiting for more bytes, call again
    Pending,
    /// Frame fully consumed
    Done,
    /// Drop the rest of the frame
    Abort,
}

/// Receive handler bound to the current frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Handler {
    /// Skip payload and CRC
    Drop,
    /// Read the SYSTEM message id
    System,
    SystemPing,
    SystemTraceroute,
    SystemName,
    SystemSupportedPayloads,
    /// STOP or RESET, holding the message id
    SystemControl(u8),
    /// Read a LOG message
    Log,
    /// Read the ROOM message id
    Room,
    /// Read the ROOM message body
    RoomProcess,
    /// Application handler, dispatched to [`Application::custom`]
    Custom(u8),
}

/// Application side of a PPP node
///
/// Every method has a default, so `()` is a valid application for nodes that
/// only answer SYSTEM requests.
pub trait Application {
    /// Choose the handler of an incoming frame; `None` drops it
    fn filter(&mut self, config: &NodeConfig, header: &Header) -> Option<Handler> {
        default_filter(config, header)
    }

    /// A valid SYSTEM STOP was received
    fn on_stop(&mut self) {}

    /// A valid SYSTEM RESET was received, after the reply was sent
    fn on_reset(&mut self) {}

    /// A valid LOG message was received; `text` may be truncated
    fn on_log(&mut self, header: &Header, severity: u8, text: &[u8]) {
        let _ = (header, severity, text);
    }

    /// Expected body size of ROOM message `mid`, `None` if unknown
    fn room_message_size(&self, mid: u8) -> Option<usize> {
        let _ = mid;
        None
    }

    /// A valid ROOM message was received
    fn on_room<W: ByteSink>(&mut self, tx: &mut Sender<W>, request: &Header, mid: u8, data: &[u8]) {
        let _ = (tx, request, mid, data);
    }

    /// Step of an application handler selected through the filter
    fn custom<R: ByteSource, W: ByteSink, const N: usize>(
        &mut self,
        tag: u8,
        intf: &mut Interface<R, W, N>,
    ) -> Progress {
        let _ = (tag, intf);
        Progress::Abort
    }
}

impl Application for () {}

/// Accept frames addressed to this node or broadcast, for supported types
pub fn default_filter(config: &NodeConfig, header: &Header) -> Option<Handler> {
    if !header.is_for(config.addr) || !config.supported.contains(header.pltype) {
        return None;
    }
    match header.pltype {
        payload::SYSTEM => Some(Handler::System),
        #[cfg(feature = "payload-log")]
        payload::LOG => Some(Handler::Log),
        #[cfg(feature = "payload-room")]
        payload::ROOM => Some(Handler::Room),
        _ => None,
    }
}
