//! Bootloader state machine.

use avarix_proto::boot::{
    self, BufferChunk, Command, MemCrc, ProgPage, Status, ENTER_MESSAGE, MID_REPLY, USER_SIG_SIZE,
};
use avarix_proto::crc::{self, Crc16};
use avarix_proto::ppp::Severity;
use avarix_proto::rome::{self, Frame, Reader, MAX_PAYLOAD_SIZE};
use avarix_proto::{ByteSink, ByteSource, Clock, ConfigError};
use log::{error, info, warn};

use crate::flash::Flash;
use crate::BootConfig;

/// Reply fields after the command and status bytes
const MAX_FIELDS: usize = MAX_PAYLOAD_SIZE - 2;

/// What to do after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Keep listening
    Continue,
    /// Start the application
    Boot,
}

/// Why [`Bootloader::run`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BootReason {
    /// No client, or the client went quiet
    Timeout,
    /// `Boot` command received
    Command,
}

/// Write session opened by `ProgPage` or `ProgUserSig`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Session {
    Idle,
    Page { addr: u32, crc: u16 },
    UserSig { crc: u16 },
}

/// Bootloader for flash pages of `PAGE` bytes
pub struct Bootloader<F, const PAGE: usize> {
    flash: F,
    config: BootConfig,
    session: Session,
    /// Staged page, erased bytes are 0xFF
    staging: [u8; PAGE],
}

impl<F: Flash, const PAGE: usize> Bootloader<F, PAGE> {
    /// Check `config` and bind it to `flash`
    ///
    /// `config.page_size` must equal `PAGE`.
    pub fn new(flash: F, config: BootConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.page_size as usize != PAGE {
            return Err(ConfigError::InvalidPageSize(config.page_size));
        }
        Ok(Self {
            flash,
            config,
            session: Session::Idle,
            staging: [0xFF; PAGE],
        })
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn flash_mut(&mut self) -> &mut F {
        &mut self.flash
    }

    pub fn into_flash(self) -> F {
        self.flash
    }

    /// Whether a write session is open
    pub fn in_session(&self) -> bool {
        self.session != Session::Idle
    }

    /// Announce the bootloader with a log frame
    pub fn enter<W: ByteSink>(&mut self, tx: &mut W) {
        info!("boot: enter");
        self.session = Session::Idle;
        let mut frame = Frame::empty(rome::mid::LOG);
        match frame
            .push(&[Severity::Notice as u8])
            .and_then(|()| frame.push(ENTER_MESSAGE))
        {
            Ok(()) => frame.send(tx),
            Err(e) => error!("boot: enter message dropped: {}", e),
        }
    }

    /// Process one command frame and send its reply
    pub fn handle<W: ByteSink>(&mut self, frame: &Frame, tx: &mut W) -> Step {
        let Ok(command) = Command::try_from(frame.mid()) else {
            warn!("boot: unknown command 0x{:02x}", frame.mid());
            self.abort_session();
            reply(tx, frame.mid(), Status::UnknownCommand, &[]);
            return Step::Continue;
        };

        if self.session != Session::Idle && command != Command::Buffer {
            warn!("boot: {:?} during a write session", command);
            self.abort_session();
            reply(tx, command as u8, Status::UnexpectedCommand, &[]);
            return Step::Continue;
        }

        let mut fields = [0u8; MAX_FIELDS];
        let params = frame.payload();
        let result = match command {
            Command::Boot => expect_empty(params),
            Command::Info => self.info(params, &mut fields),
            Command::Mirror => mirror(params, &mut fields),
            Command::ProgPage => self.prog_page(params),
            Command::Buffer => self.buffer(params),
            Command::MemCrc => self.mem_crc(params, &mut fields),
            Command::FuseRead => self.fuse_read(params, &mut fields),
            Command::ReadUserSig => self.read_user_sig(params, &mut fields),
            Command::ProgUserSig => self.prog_user_sig(params),
        };

        match result {
            Ok(len) => {
                reply(tx, command as u8, Status::Success, &fields[..len]);
                if command == Command::Boot {
                    return Step::Boot;
                }
            }
            Err(status) => {
                warn!("boot: {:?} rejected with {:?}", command, status);
                reply(tx, command as u8, status, &[]);
            }
        }
        Step::Continue
    }

    /// Serve commands until told to boot or until a timeout
    ///
    /// The connect timeout applies until the first byte is received, the
    /// command timeout afterwards.
    pub fn run<R, W, C>(&mut self, source: &mut R, sink: &mut W, clock: &C) -> BootReason
    where
        R: ByteSource,
        W: ByteSink,
        C: Clock,
    {
        self.enter(sink);
        let mut reader = Reader::new();
        let mut connected = false;
        let mut last = clock.now_us();
        loop {
            match source.recv_nowait() {
                Some(byte) => {
                    if !connected {
                        info!("boot: client connected");
                        connected = true;
                    }
                    last = clock.now_us();
                    if reader.feed(byte) && self.handle(reader.frame(), sink) == Step::Boot {
                        info!("boot: starting application");
                        return BootReason::Command;
                    }
                }
                None => {
                    let timeout_ms = if connected {
                        self.config.command_timeout_ms
                    } else {
                        self.config.connect_timeout_ms
                    };
                    let armed = !connected || timeout_ms != 0;
                    if armed && clock.elapsed_us(last) >= timeout_ms.saturating_mul(1000) {
                        info!("boot: timeout, starting application");
                        return BootReason::Timeout;
                    }
                }
            }
        }
    }

    fn abort_session(&mut self) {
        if self.session != Session::Idle {
            info!("boot: write session aborted");
            self.session = Session::Idle;
        }
    }

    fn open_session(&mut self, session: Session) {
        self.staging.fill(0xFF);
        self.session = session;
    }

    fn info(&self, params: &[u8], out: &mut [u8]) -> Result<usize, Status> {
        expect_empty(params)?;
        out[..2].copy_from_slice(&self.config.page_size.to_le_bytes());
        Ok(2)
    }

    fn prog_page(&mut self, params: &[u8]) -> Result<usize, Status> {
        let ProgPage { addr, crc } = boot::decode_params::<ProgPage>(params).map_err(|_| Status::BadValue)?;
        if addr as usize % PAGE != 0 || !self.config.in_app(addr, PAGE as u32) {
            return Err(Status::BadValue);
        }
        info!("boot: programming page 0x{:06x}", addr);
        self.open_session(Session::Page { addr, crc });
        Ok(0)
    }

    fn prog_user_sig(&mut self, params: &[u8]) -> Result<usize, Status> {
        let &[lo, hi] = params else {
            return Err(Status::BadValue);
        };
        info!("boot: programming user signature");
        self.open_session(Session::UserSig {
            crc: u16::from_le_bytes([lo, hi]),
        });
        Ok(0)
    }

    fn buffer(&mut self, params: &[u8]) -> Result<usize, Status> {
        if self.session == Session::Idle {
            return Err(Status::UnexpectedCommand);
        }
        let chunk = match BufferChunk::parse(params) {
            Ok(chunk) => chunk,
            Err(_) => {
                self.abort_session();
                return Err(Status::BadValue);
            }
        };
        if chunk.is_end() {
            return self.commit();
        }

        let offset = chunk.offset as usize;
        let size = chunk.data.len();
        if offset % 2 != 0 || size % 2 != 0 || offset + size > PAGE {
            self.abort_session();
            return Err(Status::BadValue);
        }
        self.staging[offset..offset + size].copy_from_slice(chunk.data);
        Ok(0)
    }

    /// Check the staged page and write it
    fn commit(&mut self) -> Result<usize, Status> {
        let session = core::mem::replace(&mut self.session, Session::Idle);
        let expected = match session {
            Session::Page { crc, .. } | Session::UserSig { crc } => crc,
            Session::Idle => return Err(Status::UnexpectedCommand),
        };
        let actual = crc::checksum(&self.staging);
        if actual != expected {
            warn!("boot: staged CRC 0x{:04x}, expected 0x{:04x}", actual, expected);
            return Err(Status::CrcMismatch);
        }

        for (i, word) in self.staging.chunks_exact(2).enumerate() {
            let word = u16::from_le_bytes([word[0], word[1]]);
            let offset = (i * 2) as u32;
            match session {
                Session::Page { addr, .. } => self.flash.load_page_word(addr + offset, word),
                _ => self.flash.load_user_sig_word(offset as u16, word),
            }
        }
        match session {
            Session::Page { addr, .. } => {
                self.flash.erase_write_app_page(addr);
                info!("boot: page 0x{:06x} written", addr);
            }
            _ => {
                self.flash.erase_write_user_sig();
                info!("boot: user signature written");
            }
        }
        Ok(0)
    }

    fn mem_crc(&self, params: &[u8], out: &mut [u8]) -> Result<usize, Status> {
        let MemCrc { start, size } = boot::decode_params::<MemCrc>(params).map_err(|_| Status::BadValue)?;
        if !self.config.in_app(start, size) {
            return Err(Status::BadValue);
        }
        let mut crc = Crc16::new();
        for i in 0..size {
            crc.update(self.flash.read_byte(start + i));
        }
        out[..2].copy_from_slice(&crc.value().to_le_bytes());
        Ok(2)
    }

    fn fuse_read(&self, params: &[u8], out: &mut [u8]) -> Result<usize, Status> {
        expect_empty(params)?;
        let count = (self.config.fuse_count as usize).min(out.len());
        for (i, byte) in out[..count].iter_mut().enumerate() {
            *byte = self.flash.fuse(i as u8);
        }
        Ok(count)
    }

    fn read_user_sig(&self, params: &[u8], out: &mut [u8]) -> Result<usize, Status> {
        expect_empty(params)?;
        for (i, byte) in out[..USER_SIG_SIZE].iter_mut().enumerate() {
            *byte = self.flash.read_user_sig(i as u16);
        }
        Ok(USER_SIG_SIZE)
    }
}

fn expect_empty(params: &[u8]) -> Result<usize, Status> {
    if params.is_empty() {
        Ok(0)
    } else {
        Err(Status::BadValue)
    }
}

fn mirror(params: &[u8], out: &mut [u8]) -> Result<usize, Status> {
    let &[byte] = params else {
        return Err(Status::BadValue);
    };
    out[0] = byte;
    Ok(1)
}

fn reply<W: ByteSink>(tx: &mut W, command: u8, status: Status, fields: &[u8]) {
    let mut frame = Frame::empty(MID_REPLY);
    match frame
        .push(&[command, status as u8])
        .and_then(|()| frame.push(fields))
    {
        Ok(()) => frame.send(tx),
        Err(e) => error!("boot: reply to 0x{:02x} dropped: {}", command, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::MemFlash;
    use avarix_proto::boot::{encode_params, UserSignature};
    use core::cell::Cell;
    use std::collections::VecDeque;

    const PAGE: usize = 64;

    fn config() -> BootConfig {
        BootConfig {
            page_size: PAGE as u16,
            app_end: 0x3FFF,
            connect_timeout_ms: 10,
            command_timeout_ms: 0,
            fuse_count: 6,
        }
    }

    fn bootloader() -> Bootloader<MemFlash, PAGE> {
        Bootloader::new(MemFlash::new(0x4000, PAGE), config()).unwrap()
    }

    fn frames(bytes: &[u8]) -> Vec<Frame> {
        let mut source: VecDeque<u8> = bytes.iter().copied().collect();
        let mut reader = Reader::new();
        let mut out = Vec::new();
        while let Some(frame) = reader.read(&mut source) {
            out.push(frame.clone());
        }
        out
    }

    /// Send one command, return the reply status and fields
    fn command(boot: &mut Bootloader<MemFlash, PAGE>, cmd: u8, params: &[u8]) -> (u8, Vec<u8>) {
        let mut tx = Vec::new();
        boot.handle(&Frame::new(cmd, params).unwrap(), &mut tx);
        let replies = frames(&tx);
        assert_eq!(replies.len(), 1);
        let reply = &replies[0];
        assert_eq!(reply.mid(), MID_REPLY);
        assert_eq!(reply.payload()[0], cmd);
        (reply.payload()[1], reply.payload()[2..].to_vec())
    }

    fn prog_page(boot: &mut Bootloader<MemFlash, PAGE>, addr: u32, crc: u16) -> u8 {
        let mut buf = [0u8; 8];
        let params = encode_params(&ProgPage { addr, crc }, &mut buf).unwrap();
        command(boot, Command::ProgPage as u8, params).0
    }

    fn buffer(boot: &mut Bootloader<MemFlash, PAGE>, offset: u16, data: &[u8]) -> u8 {
        let mut buf = [0u8; MAX_PAYLOAD_SIZE];
        let len = BufferChunk { offset, data }.encode(&mut buf).unwrap();
        command(boot, Command::Buffer as u8, &buf[..len]).0
    }

    /// Upload `page` in 16-byte chunks announcing `crc`, return the final status
    fn upload(boot: &mut Bootloader<MemFlash, PAGE>, addr: u32, page: &[u8], crc: u16) -> u8 {
        assert_eq!(prog_page(boot, addr, crc), Status::Success as u8);
        for (i, chunk) in page.chunks(16).enumerate() {
            assert_eq!(buffer(boot, (i * 16) as u16, chunk), Status::Success as u8);
        }
        buffer(boot, 0, &[])
    }

    fn test_page() -> Vec<u8> {
        (0..PAGE as u8).map(|i| i.wrapping_mul(7)).collect()
    }

    #[test]
    fn test_new_rejects_page_size_mismatch() {
        let config = BootConfig {
            page_size: 128,
            ..config()
        };
        assert!(matches!(
            Bootloader::<_, PAGE>::new(MemFlash::new(0x4000, PAGE), config),
            Err(ConfigError::InvalidPageSize(128))
        ));
    }

    #[test]
    fn test_enter_sends_log_frame() {
        let mut boot = bootloader();
        let mut tx = Vec::new();
        boot.enter(&mut tx);
        let sent = frames(&tx);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].mid(), rome::mid::LOG);
        assert_eq!(sent[0].payload()[0], Severity::Notice as u8);
        assert_eq!(&sent[0].payload()[1..], ENTER_MESSAGE);
    }

    #[test]
    fn test_info_and_mirror() {
        let mut boot = bootloader();
        assert_eq!(
            command(&mut boot, Command::Info as u8, &[]),
            (Status::Success as u8, vec![PAGE as u8, 0])
        );
        assert_eq!(
            command(&mut boot, Command::Mirror as u8, &[0x5A]),
            (Status::Success as u8, vec![0x5A])
        );
        assert_eq!(command(&mut boot, Command::Mirror as u8, &[]).0, Status::BadValue as u8);
        assert_eq!(command(&mut boot, Command::Info as u8, &[1]).0, Status::BadValue as u8);
    }

    #[test]
    fn test_unknown_command() {
        let mut boot = bootloader();
        assert_eq!(command(&mut boot, 0x42, &[]).0, Status::UnknownCommand as u8);
    }

    #[test]
    fn test_prog_page_writes_on_good_crc() {
        let mut boot = bootloader();
        let page = test_page();
        let status = upload(&mut boot, 0x2000, &page, crc::checksum(&page));

        assert_eq!(status, Status::Success as u8);
        assert_eq!(&boot.flash().app()[0x2000..0x2000 + PAGE], &page[..]);
        assert_eq!(boot.flash().page_writes(), 1);
        assert!(!boot.in_session());
    }

    #[test]
    fn test_prog_page_crc_mismatch_leaves_flash() {
        let mut boot = bootloader();
        let page = test_page();
        let crc = crc::checksum(&page);
        let mut corrupted = page.clone();
        corrupted[10] ^= 0x01;
        let status = upload(&mut boot, 0x2000, &corrupted, crc);

        assert_eq!(status, Status::CrcMismatch as u8);
        assert!(boot.flash().app()[0x2000..0x2000 + PAGE].iter().all(|&b| b == 0xFF));
        assert_eq!(boot.flash().page_writes(), 0);
        assert!(!boot.in_session());
    }

    #[test]
    fn test_partial_page_padded_with_ff() {
        let mut boot = bootloader();
        let mut page = vec![0xFF; PAGE];
        page[..4].copy_from_slice(&[1, 2, 3, 4]);
        let status = upload(&mut boot, 0, &page[..4], crc::checksum(&page));
        assert_eq!(status, Status::Success as u8);
        assert_eq!(&boot.flash().app()[..PAGE], &page[..]);
    }

    #[test]
    fn test_prog_page_bad_address() {
        let mut boot = bootloader();
        // unaligned
        assert_eq!(prog_page(&mut boot, 0x2001, 0), Status::BadValue as u8);
        // last page is fine, the next one is outside the application
        assert_eq!(prog_page(&mut boot, 0x4000 - PAGE as u32, 0), Status::Success as u8);
        buffer(&mut boot, 0, &[]);
        assert_eq!(prog_page(&mut boot, 0x4000, 0), Status::BadValue as u8);
        assert_eq!(command(&mut boot, Command::ProgPage as u8, &[0; 3]).0, Status::BadValue as u8);
    }

    #[test]
    fn test_buffer_validation() {
        let mut boot = bootloader();
        assert_eq!(buffer(&mut boot, 0, &[1, 2]), Status::UnexpectedCommand as u8);

        prog_page(&mut boot, 0, 0);
        assert_eq!(buffer(&mut boot, 1, &[1, 2]), Status::BadValue as u8);
        assert!(!boot.in_session());

        prog_page(&mut boot, 0, 0);
        assert_eq!(buffer(&mut boot, 0, &[1, 2, 3]), Status::BadValue as u8);

        prog_page(&mut boot, 0, 0);
        assert_eq!(buffer(&mut boot, PAGE as u16 - 2, &[1, 2, 3, 4]), Status::BadValue as u8);

        prog_page(&mut boot, 0, 0);
        assert_eq!(buffer(&mut boot, PAGE as u16 - 2, &[1, 2]), Status::Success as u8);
    }

    #[test]
    fn test_other_command_aborts_session() {
        let mut boot = bootloader();
        prog_page(&mut boot, 0, 0);
        assert_eq!(command(&mut boot, Command::Info as u8, &[]).0, Status::UnexpectedCommand as u8);
        assert!(!boot.in_session());
        assert_eq!(buffer(&mut boot, 0, &[]), Status::UnexpectedCommand as u8);
    }

    #[test]
    fn test_mem_crc() {
        let mut boot = bootloader();
        boot.flash_mut().app_mut()[0x100..0x104].copy_from_slice(&[1, 2, 3, 4]);
        let mut buf = [0u8; 8];
        let params = encode_params(&MemCrc { start: 0x100, size: 4 }, &mut buf).unwrap();
        let (status, fields) = command(&mut boot, Command::MemCrc as u8, params);
        assert_eq!(status, Status::Success as u8);
        assert_eq!(fields, crc::checksum(&[1, 2, 3, 4]).to_le_bytes());

        let params = encode_params(&MemCrc { start: 0x3FFF, size: 2 }, &mut buf).unwrap();
        assert_eq!(command(&mut boot, Command::MemCrc as u8, params).0, Status::BadValue as u8);
    }

    #[test]
    fn test_fuse_read() {
        let flash = MemFlash::new(0x4000, PAGE).with_fuses(&[1, 2, 3, 4, 5, 6]);
        let mut boot = Bootloader::<_, PAGE>::new(flash, config()).unwrap();
        assert_eq!(
            command(&mut boot, Command::FuseRead as u8, &[]),
            (Status::Success as u8, vec![1, 2, 3, 4, 5, 6])
        );
    }

    #[test]
    fn test_user_signature_roundtrip() {
        let mut boot = bootloader();
        let (status, fields) = command(&mut boot, Command::ReadUserSig as u8, &[]);
        assert_eq!(status, Status::Success as u8);
        assert_eq!(UserSignature::decode(&fields), Ok(None));

        let sig = UserSignature::new("mot1", 1_600_000_000, "alice");
        let mut row = vec![0xFF; PAGE];
        row[..USER_SIG_SIZE].copy_from_slice(&sig.encode().unwrap());
        let crc = crc::checksum(&row).to_le_bytes();
        assert_eq!(command(&mut boot, Command::ProgUserSig as u8, &crc).0, Status::Success as u8);
        for (i, chunk) in row.chunks(32).enumerate() {
            assert_eq!(buffer(&mut boot, (i * 32) as u16, chunk), Status::Success as u8);
        }
        assert_eq!(buffer(&mut boot, 0, &[]), Status::Success as u8);
        assert!(boot.flash().app().iter().all(|&b| b == 0xFF));

        let (_, fields) = command(&mut boot, Command::ReadUserSig as u8, &[]);
        assert_eq!(UserSignature::decode(&fields), Ok(Some(sig)));
    }

    /// Clock advancing by 1 ms at each reading
    struct TickClock(Cell<u32>);

    impl Clock for TickClock {
        fn now_us(&self) -> u32 {
            let now = self.0.get();
            self.0.set(now + 1000);
            now
        }
    }

    #[test]
    fn test_run_times_out_without_client() {
        let mut boot = bootloader();
        let mut source = VecDeque::new();
        let mut sink = Vec::new();
        let clock = TickClock(Cell::new(0));
        assert_eq!(boot.run(&mut source, &mut sink, &clock), BootReason::Timeout);
        assert_eq!(frames(&sink).len(), 1);
    }

    #[test]
    fn test_run_until_boot_command() {
        let mut boot = bootloader();
        let mut source = VecDeque::new();
        for frame in [
            Frame::new(Command::Mirror as u8, &[7]).unwrap(),
            Frame::empty(Command::Boot as u8),
        ] {
            frame.send(&mut source);
        }
        let mut sink = Vec::new();
        let clock = TickClock(Cell::new(0));
        assert_eq!(boot.run(&mut source, &mut sink, &clock), BootReason::Command);

        let sent = frames(&sink);
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].payload(), &[Command::Mirror as u8, Status::Success as u8, 7]);
        assert_eq!(sent[2].payload(), &[Command::Boot as u8, Status::Success as u8]);
    }

    #[test]
    fn test_run_command_timeout() {
        let config = BootConfig {
            command_timeout_ms: 50,
            ..config()
        };
        let mut boot = Bootloader::<_, PAGE>::new(MemFlash::new(0x4000, PAGE), config).unwrap();
        let mut source = VecDeque::new();
        Frame::new(Command::Mirror as u8, &[1]).unwrap().send(&mut source);
        let mut sink = Vec::new();
        let clock = TickClock(Cell::new(0));
        assert_eq!(boot.run(&mut source, &mut sink, &clock), BootReason::Timeout);
        assert_eq!(frames(&sink).len(), 2);
        // waited past the connect timeout once connected
        assert!(clock.0.get() >= 50_000);
    }
}
