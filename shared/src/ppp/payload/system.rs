//! SYSTEM payload: node management requests.
//!
//! The first payload byte is the message id. Responses reuse the request id
//! with the high bit set and are sent back to the request source. Received
//! responses are ignored.

use core::task::Poll;

use crate::error::FrameError;
use crate::traits::{ByteSink, ByteSource};
use crate::BROADCAST;

use crate::ppp::handler::{Application, Handler, Progress};
use crate::ppp::header::Header;
use crate::ppp::interface::Interface;
use crate::ppp::payload;
use crate::ppp::sender::Sender;

pub const ACK: u8 = 0x00;
pub const NAK: u8 = 0x01;
pub const PING: u8 = 0x02;
pub const TRACEROUTE: u8 = 0x03;
pub const NAME: u8 = 0x04;
pub const STOP: u8 = 0x05;
pub const RESET: u8 = 0x06;
pub const SUPPORTED_PAYLOADS: u8 = 0x07;

/// Set on response ids
pub const RESPONSE: u8 = 0x80;

/// Payload bytes expected after the id of a request
const fn request_size(id: u8) -> Option<u16> {
    match id {
        PING | TRACEROUTE => Some(1),
        NAME | STOP | RESET | SUPPORTED_PAYLOADS => Some(0),
        _ => None,
    }
}

impl<R: ByteSource, W: ByteSink, const N: usize> Interface<R, W, N> {
    pub(crate) fn handle_system<A: Application>(&mut self, app: &mut A) -> Progress {
        if self.rx.remaining() == 0 {
            return Progress::Abort;
        }
        let Some(id) = self.recv_data() else {
            return Progress::Pending;
        };
        if id & RESPONSE != 0 {
            log::trace!("ppp: ignoring system response {:02x}", id);
            return Progress::Abort;
        }
        let Some(size) = request_size(id) else {
            log::debug!("ppp: unknown system request {:02x}", id);
            return Progress::Abort;
        };
        if self.rx.remaining() != size {
            log::debug!("ppp: system request {:02x} has bad size", id);
            return Progress::Abort;
        }
        let next = match id {
            PING => Handler::SystemPing,
            TRACEROUTE => Handler::SystemTraceroute,
            NAME => Handler::SystemName,
            SUPPORTED_PAYLOADS => Handler::SystemSupportedPayloads,
            _ => Handler::SystemControl(id),
        };
        self.continue_with(app, next)
    }

    pub(crate) fn handle_system_ping(&mut self) -> Progress {
        match self.recv_payload_all() {
            Poll::Pending => Progress::Pending,
            Poll::Ready(false) => Progress::Done,
            Poll::Ready(true) => {
                let value = self.rx.payload()[0];
                let request = *self.header();
                self.reply_system(&request, &[PING | RESPONSE, value]);
                Progress::Done
            }
        }
    }

    pub(crate) fn handle_system_traceroute(&mut self) -> Progress {
        match self.recv_payload_all() {
            Poll::Pending => Progress::Pending,
            Poll::Ready(false) => Progress::Done,
            Poll::Ready(true) => {
                let request = *self.header();
                self.reply_system(&request, &[TRACEROUTE | RESPONSE, 0]);
                Progress::Done
            }
        }
    }

    pub(crate) fn handle_system_name(&mut self) -> Progress {
        match self.recv_crc() {
            Poll::Pending => Progress::Pending,
            Poll::Ready(false) => Progress::Done,
            Poll::Ready(true) => {
                let request = *self.header();
                let name = self.config().name;
                if let Err(e) = self.tx.reply_parts(&request, payload::SYSTEM, &[&[NAME | RESPONSE], name.as_bytes()]) {
                    log::warn!("ppp: NAME reply failed: {}", e);
                }
                Progress::Done
            }
        }
    }

    pub(crate) fn handle_system_supported(&mut self) -> Progress {
        match self.recv_crc() {
            Poll::Pending => Progress::Pending,
            Poll::Ready(false) => Progress::Done,
            Poll::Ready(true) => {
                let request = *self.header();
                let bitmap = *self.config().supported.as_bytes();
                if let Err(e) = self.tx.reply_parts(
                    &request,
                    payload::SYSTEM,
                    &[&[SUPPORTED_PAYLOADS | RESPONSE], &bitmap],
                ) {
                    log::warn!("ppp: SUPPORTED_PAYLOADS reply failed: {}", e);
                }
                Progress::Done
            }
        }
    }

    /// STOP and RESET only act on a valid CRC
    pub(crate) fn handle_system_control<A: Application>(&mut self, app: &mut A, id: u8) -> Progress {
        match self.recv_crc() {
            Poll::Pending => Progress::Pending,
            Poll::Ready(false) => Progress::Done,
            Poll::Ready(true) => {
                let request = *self.header();
                self.reply_system(&request, &[id | RESPONSE]);
                if id == STOP {
                    log::info!("ppp: STOP from {:02x}", request.src);
                    app.on_stop();
                } else {
                    log::info!("ppp: RESET from {:02x}", request.src);
                    app.on_reset();
                }
                Progress::Done
            }
        }
    }

    fn reply_system(&mut self, request: &Header, data: &[u8]) {
        if let Err(e) = self.tx.reply_parts(request, payload::SYSTEM, &[data]) {
            log::warn!("ppp: system reply failed: {}", e);
        }
    }
}

impl<W: ByteSink> Sender<W> {
    /// Answer `request` with an ACK or a NAK
    pub fn send_system_ack(&mut self, request: &Header, ack: bool) -> Result<(), FrameError> {
        let id = if ack { ACK } else { NAK };
        self.reply_parts(request, payload::SYSTEM, &[&[id | RESPONSE]])
    }

    /// Ask every node on the line to reset
    pub fn send_system_reset(&mut self) -> Result<(), FrameError> {
        self.send_to(BROADCAST, payload::SYSTEM, &[RESET])
    }

    /// Ping node `dst`
    pub fn send_system_ping(&mut self, dst: u8, value: u8) -> Result<(), FrameError> {
        self.send_to(dst, payload::SYSTEM, &[PING, value])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::ppp::header::FRAME_OVERHEAD;
    use std::collections::VecDeque;

    fn request(dst: u8, data: &[u8]) -> Vec<u8> {
        let mut tx = Sender::new(Vec::new(), 0x01);
        tx.send_to(dst, payload::SYSTEM, data).unwrap();
        tx.into_inner()
    }

    fn run<A: Application>(app: &mut A, input: Vec<u8>) -> Vec<u8> {
        let config = NodeConfig::new(0x10).with_name("motor");
        let mut intf: Interface<VecDeque<u8>, Vec<u8>> = Interface::new(config, input.into(), Vec::new());
        intf.update(app);
        intf.into_parts().1
    }

    /// Like `run`, with one byte made available per `update`
    fn run_bytewise<A: Application>(app: &mut A, input: Vec<u8>) -> Vec<u8> {
        let config = NodeConfig::new(0x10).with_name("motor");
        let mut intf: Interface<VecDeque<u8>, Vec<u8>> = Interface::new(config, VecDeque::new(), Vec::new());
        for byte in input {
            intf.source_mut().push_back(byte);
            intf.update(app);
        }
        intf.into_parts().1
    }

    /// Header and payload of the single frame in `out`
    fn single_reply(out: &[u8]) -> (Header, &[u8]) {
        let header = Header::decode(out[1..6].try_into().unwrap());
        assert_eq!(out.len(), header.plsize as usize + FRAME_OVERHEAD);
        (header, &out[8..8 + header.plsize as usize])
    }

    #[derive(Default)]
    struct Hooks {
        stops: usize,
        resets: usize,
    }

    impl Application for Hooks {
        fn on_stop(&mut self) {
            self.stops += 1;
        }

        fn on_reset(&mut self) {
            self.resets += 1;
        }
    }

    #[test]
    fn test_ping() {
        let out = run(&mut (), request(0x10, &[PING, 0x2A]));
        let (header, data) = single_reply(&out);
        assert_eq!(header, Header::new(2, 0x10, 0x01, payload::SYSTEM));
        assert_eq!(data, &[0x82, 0x2A]);
    }

    #[test]
    fn test_ping_bad_size_ignored() {
        let out = run(&mut (), request(0x10, &[PING, 0x2A, 0x00]));
        assert!(out.is_empty());
    }

    #[test]
    fn test_traceroute() {
        let out = run(&mut (), request(0x10, &[TRACEROUTE, 0x00]));
        let (_, data) = single_reply(&out);
        assert_eq!(data, &[0x83, 0x00]);
    }

    #[test]
    fn test_name() {
        let out = run(&mut (), request(0x10, &[NAME]));
        let (header, data) = single_reply(&out);
        assert_eq!(header.plsize, 6);
        assert_eq!(data, b"\x84motor");
    }

    #[test]
    fn test_supported_payloads() {
        let out = run(&mut (), request(0x10, &[SUPPORTED_PAYLOADS]));
        let (header, data) = single_reply(&out);
        assert_eq!(header.plsize, 33);
        assert_eq!(data[0], 0x87);
        assert_eq!(data[1] & 0x01, 0x01);
        assert_eq!(&data[1..], NodeConfig::new(0x10).supported.as_bytes());
    }

    #[test]
    fn test_supported_payloads_system_and_log_only() {
        let config = NodeConfig::new(0x10).with_supported(payload::PayloadSet::from_ids(&[payload::LOG]));
        let input = request(0x10, &[SUPPORTED_PAYLOADS]);
        let mut intf: Interface<VecDeque<u8>, Vec<u8>> = Interface::new(config, input.into(), Vec::new());
        intf.update(&mut ());
        let out = intf.into_parts().1;

        let (_, data) = single_reply(&out);
        let mut expected = [0u8; 32];
        expected[0] = 0b0000_0011;
        assert_eq!(&data[1..], &expected);
    }

    #[test]
    fn test_requests_resume_across_partial_reads() {
        let requests: [&[u8]; 4] = [&[PING, 0x2A], &[TRACEROUTE, 0x00], &[NAME], &[SUPPORTED_PAYLOADS]];
        for data in requests {
            let whole = run(&mut (), request(0x10, data));
            let bytewise = run_bytewise(&mut (), request(0x10, data));
            assert!(!whole.is_empty());
            assert_eq!(bytewise, whole, "request {:02x}", data[0]);
        }
    }

    #[test]
    fn test_reset_hook_runs_once_across_partial_reads() {
        let mut hooks = Hooks::default();
        let out = run_bytewise(&mut hooks, request(0x10, &[RESET]));
        assert_eq!(hooks.resets, 1);
        let (_, data) = single_reply(&out);
        assert_eq!(data, &[RESET | RESPONSE]);
    }

    #[test]
    fn test_stop_and_reset_hooks() {
        let mut hooks = Hooks::default();
        let mut input = request(0x10, &[STOP]);
        input.extend(request(0xFF, &[RESET]));
        let out = run(&mut hooks, input);

        assert_eq!(hooks.stops, 1);
        assert_eq!(hooks.resets, 1);
        let (_, first) = single_reply(&out[..FRAME_OVERHEAD + 1]);
        assert_eq!(first, &[STOP | RESPONSE]);
    }

    #[test]
    fn test_reset_with_bad_crc_ignored() {
        let mut hooks = Hooks::default();
        let mut input = request(0x10, &[RESET]);
        let last = input.len() - 1;
        input[last] ^= 0x01;
        let out = run(&mut hooks, input);
        assert_eq!(hooks.resets, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_responses_and_other_nodes_ignored() {
        let mut input = request(0x10, &[PING | RESPONSE, 1]);
        input.extend(request(0x11, &[PING, 1]));
        input.extend(request(0x10, &[0x42]));
        assert!(run(&mut (), input).is_empty());
    }

    #[test]
    fn test_send_system_reset_is_broadcast() {
        let mut tx = Sender::new(Vec::new(), 0x10);
        tx.send_system_reset().unwrap();
        let out = tx.into_inner();
        let (header, data) = single_reply(&out);
        assert_eq!(header.dst, BROADCAST);
        assert_eq!(data, &[RESET]);
    }

    #[test]
    fn test_send_system_ack() {
        let request = Header::new(1, 0x01, 0x10, payload::LOG);
        let mut tx = Sender::new(Vec::new(), 0x10);
        tx.send_system_ack(&request, false).unwrap();
        let out = tx.into_inner();
        let (header, data) = single_reply(&out);
        assert_eq!(header.dst, 0x01);
        assert_eq!(header.pltype, payload::SYSTEM);
        assert_eq!(data, &[NAK | RESPONSE]);
    }
}
