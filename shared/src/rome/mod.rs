//! # ROME
//!
//! Point-to-point framing with a one-byte payload size and a single CRC.
//! Used between the main boards and by the bootloader.

pub mod frame;
pub mod reader;

pub use frame::{Frame, FRAME_OVERHEAD, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE, START_BYTE};
pub use reader::Reader;

use crate::ack::AckTable;
use crate::traits::ByteSink;

/// Reserved message ids
pub mod mid {
    /// Never sent
    pub const NONE: u8 = 0x00;
    /// ACK of an order, payload is the ACK id
    pub const ACK: u8 = 0x01;
    /// Log message, payload is severity and text
    pub const LOG: u8 = 0x02;
}

/// ACK frame for `ack`
pub fn ack_frame(ack: u8) -> Frame {
    let mut frame = Frame::empty(mid::ACK);
    frame.set_ack(ack);
    frame
}

/// Acknowledge a received order
pub fn reply_ack<W: ByteSink>(sink: &mut W, order: &Frame) {
    if let Some(ack) = order.ack() {
        ack_frame(ack).send(sink);
    }
}

/// Release the ACK id carried by an ACK frame; false for other frames
pub fn handle_ack(frame: &Frame, acks: &AckTable) -> bool {
    if frame.mid() != mid::ACK {
        return false;
    }
    match frame.ack() {
        Some(ack) if acks.in_range(ack) => {
            acks.free_ack(ack);
            true
        }
        _ => {
            log::debug!("rome: ignoring ACK out of range");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_ack() {
        let mut order = Frame::order(0x30, &[1]).unwrap();
        order.set_ack(0x90);
        let mut sink = Vec::new();
        reply_ack(&mut sink, &order);
        assert_eq!(Frame::parse(&sink), Ok(ack_frame(0x90)));
    }

    #[test]
    fn test_handle_ack_frees_id() {
        let acks = AckTable::new(0x80, 0x8F);
        let id = acks.next_ack();
        assert!(acks.ack_expected(id));
        assert!(handle_ack(&ack_frame(id), &acks));
        assert!(!acks.ack_expected(id));
        assert!(!handle_ack(&Frame::empty(0x30), &acks));
    }
}
