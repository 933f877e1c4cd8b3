//! ROOM payload: typed application messages.
//!
//! Payload is a message id followed by a fixed-size body. The application
//! declares body sizes through [`Application::room_message_size`]; frames
//! with an unknown id or a wrong size are dropped before their body is read.
//!
//! Message bodies are `serde` types encoded with `postcard`. Multi-byte
//! integers should use `postcard::fixint::le` so each message keeps the
//! fixed size announced in [`RoomMessage::SIZE`].

use core::task::Poll;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::FrameError;
use crate::ppp::handler::{Application, Handler, Progress};
use crate::ppp::header::Header;
use crate::ppp::interface::Interface;
use crate::ppp::payload;
use crate::ppp::sender::Sender;
use crate::traits::{ByteSink, ByteSource};

/// Largest ROOM body handled by [`Sender::send_room`]
pub const MAX_BODY_SIZE: usize = 254;

/// A ROOM message with a fixed wire size
pub trait RoomMessage: Serialize + DeserializeOwned {
    /// Message id
    const MID: u8;
    /// Encoded body size
    const SIZE: usize;
}

/// Static table of message ids and body sizes
#[derive(Debug, Clone, Copy)]
pub struct RoomCatalog {
    entries: &'static [(u8, usize)],
}

impl RoomCatalog {
    pub const fn new(entries: &'static [(u8, usize)]) -> Self {
        Self { entries }
    }

    pub fn size_of(&self, mid: u8) -> Option<usize> {
        self.entries.iter().find(|(m, _)| *m == mid).map(|(_, size)| *size)
    }
}

/// Decode a received ROOM body
pub fn decode<M: RoomMessage>(data: &[u8]) -> Result<M, FrameError> {
    if data.len() != M::SIZE {
        return Err(FrameError::LengthMismatch);
    }
    postcard::from_bytes(data).map_err(|_| FrameError::Deserialization)
}

impl<R: ByteSource, W: ByteSink, const N: usize> Interface<R, W, N> {
    pub(crate) fn handle_room<A: Application>(&mut self, app: &mut A) -> Progress {
        if self.rx.payload_pos() == 0 && self.rx.remaining() == 0 {
            return Progress::Abort;
        }
        if !self.recv_payload(1) {
            return Progress::Pending;
        }
        let mid = self.rx.payload()[0];
        let Some(size) = app.room_message_size(mid) else {
            log::debug!("ppp: unknown room message {:02x}", mid);
            return Progress::Abort;
        };
        if self.rx.remaining() as usize != size || 1 + size > N {
            log::debug!("ppp: room message {:02x} has bad size", mid);
            return Progress::Abort;
        }
        self.continue_with(app, Handler::RoomProcess)
    }

    pub(crate) fn handle_room_process<A: Application>(&mut self, app: &mut A) -> Progress {
        match self.recv_payload_all() {
            Poll::Pending => Progress::Pending,
            Poll::Ready(false) => Progress::Done,
            Poll::Ready(true) => {
                let request = *self.header();
                let mid = self.rx.payload()[0];
                app.on_room(&mut self.tx, &request, mid, &self.rx.payload()[1..]);
                Progress::Done
            }
        }
    }
}

impl<W: ByteSink> Sender<W> {
    /// Send a ROOM message to `dst`
    pub fn send_room<M: RoomMessage>(&mut self, dst: u8, msg: &M) -> Result<(), FrameError> {
        let mut body = [0u8; MAX_BODY_SIZE];
        let used = postcard::to_slice(msg, &mut body)
            .map_err(|_| FrameError::Serialization)?
            .len();
        if used != M::SIZE {
            return Err(FrameError::LengthMismatch);
        }
        let header = Header::new(1 + used as u16, self.addr(), dst, payload::ROOM);
        self.send_frame_parts(&header, &[&[M::MID], &body[..used]])
    }

    /// Answer `request` with a ROOM message
    pub fn reply_room<M: RoomMessage>(&mut self, request: &Header, msg: &M) -> Result<(), FrameError> {
        self.send_room(request.src, msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use serde::Deserialize;
    use std::collections::VecDeque;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct SetSpeed {
        #[serde(with = "postcard::fixint::le")]
        left: i16,
        #[serde(with = "postcard::fixint::le")]
        right: i16,
    }

    impl RoomMessage for SetSpeed {
        const MID: u8 = 0x20;
        const SIZE: usize = 4;
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct SpeedAck {
        accepted: bool,
    }

    impl RoomMessage for SpeedAck {
        const MID: u8 = 0x21;
        const SIZE: usize = 1;
    }

    const CATALOG: RoomCatalog = RoomCatalog::new(&[(SetSpeed::MID, SetSpeed::SIZE), (SpeedAck::MID, SpeedAck::SIZE)]);

    #[derive(Default)]
    struct Motor {
        speeds: Vec<SetSpeed>,
    }

    impl Application for Motor {
        fn room_message_size(&self, mid: u8) -> Option<usize> {
            CATALOG.size_of(mid)
        }

        fn on_room<W: ByteSink>(&mut self, tx: &mut Sender<W>, request: &Header, mid: u8, data: &[u8]) {
            if mid == SetSpeed::MID {
                let msg: SetSpeed = decode(data).unwrap();
                tx.reply_room(request, &SpeedAck { accepted: true }).unwrap();
                self.speeds.push(msg);
            }
        }
    }

    fn run(input: Vec<u8>) -> (Motor, Vec<u8>) {
        let mut app = Motor::default();
        let mut intf: Interface<VecDeque<u8>, Vec<u8>> =
            Interface::new(NodeConfig::new(0x10), input.into(), Vec::new());
        intf.update(&mut app);
        (app, intf.into_parts().1)
    }

    fn run_bytewise(input: Vec<u8>) -> (Motor, Vec<u8>) {
        let mut app = Motor::default();
        let mut intf: Interface<VecDeque<u8>, Vec<u8>> =
            Interface::new(NodeConfig::new(0x10), VecDeque::new(), Vec::new());
        for byte in input {
            intf.source_mut().push_back(byte);
            intf.update(&mut app);
        }
        (app, intf.into_parts().1)
    }

    #[test]
    fn test_room_message_dispatched() {
        let mut tx = Sender::new(Vec::new(), 0x01);
        tx.send_room(0x10, &SetSpeed { left: -300, right: 300 }).unwrap();
        let (app, out) = run(tx.into_inner());

        assert_eq!(app.speeds, vec![SetSpeed { left: -300, right: 300 }]);
        // reply: mid + body
        assert_eq!(&out[8..10], &[SpeedAck::MID, 1]);
        assert_eq!(out[4], 0x01);
    }

    #[test]
    fn test_room_message_resumes_across_partial_reads() {
        let mut tx = Sender::new(Vec::new(), 0x01);
        tx.send_room(0x10, &SetSpeed { left: 12, right: -7 }).unwrap();
        let input = tx.into_inner();

        let (whole_app, whole_out) = run(input.clone());
        let (app, out) = run_bytewise(input);
        assert_eq!(app.speeds, vec![SetSpeed { left: 12, right: -7 }]);
        assert_eq!(app.speeds, whole_app.speeds);
        assert_eq!(out, whole_out);
    }

    #[test]
    fn test_room_wire_layout() {
        let mut tx = Sender::new(Vec::new(), 0x01);
        tx.send_room(0x10, &SetSpeed { left: 1, right: -1 }).unwrap();
        let out = tx.into_inner();
        assert_eq!(&out[8..13], &[0x20, 0x01, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_unknown_or_bad_size_dropped() {
        let mut tx = Sender::new(Vec::new(), 0x01);
        tx.send_to(0x10, payload::ROOM, &[0x55, 1, 2]).unwrap();
        tx.send_to(0x10, payload::ROOM, &[SetSpeed::MID, 1, 2]).unwrap();
        tx.send_to(0x10, payload::ROOM, &[]).unwrap();
        let (app, out) = run(tx.into_inner());
        assert!(app.speeds.is_empty());
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_checks_size() {
        assert_eq!(decode::<SpeedAck>(&[1, 0]), Err(FrameError::LengthMismatch));
        assert_eq!(decode::<SpeedAck>(&[0]), Ok(SpeedAck { accepted: false }));
    }
}
