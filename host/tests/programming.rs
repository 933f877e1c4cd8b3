//! End-to-end tests: the host client against the real bootloader state
//! machine running on an in-memory flash.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::time::Duration;

use avarix_bootloader::{BootConfig, Bootloader, Flash, MemFlash};
use avarix_host::{parse_hex, BootClient, Chunk, ClientError, Page};
use avarix_proto::boot::{Command, Status, UserSignature, MID_REPLY};
use avarix_proto::rome::{Frame, Reader, MAX_FRAME_SIZE};

const PAGE: usize = 64;
const APP_SIZE: usize = 0x1000;

/// Serial link to a simulated device
///
/// Bytes written by the client are fed to the bootloader synchronously and
/// its replies are queued for reading.
struct SimDevice {
    boot: Bootloader<MemFlash, PAGE>,
    reader: Reader,
    output: VecDeque<u8>,
    /// Number of upcoming `Buffer` data frames to corrupt
    corrupt: usize,
    booted: bool,
}

impl SimDevice {
    fn new() -> Self {
        let config = BootConfig {
            page_size: PAGE as u16,
            app_end: APP_SIZE as u32 - 1,
            ..BootConfig::default()
        };
        let flash = MemFlash::new(APP_SIZE, PAGE).with_fuses(&[0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
        let mut boot = Bootloader::new(flash, config).unwrap();
        let mut output = VecDeque::new();
        boot.enter(&mut output);
        Self {
            boot,
            reader: Reader::new(),
            output,
            corrupt: 0,
            booted: false,
        }
    }

    fn flash(&self) -> &MemFlash {
        self.boot.flash()
    }

    fn handle(&mut self, mut frame: Frame) {
        let is_data = frame.mid() == Command::Buffer as u8 && frame.payload().len() > 3;
        if is_data && self.corrupt > 0 {
            self.corrupt -= 1;
            let mut payload = frame.payload().to_vec();
            payload[3] ^= 0x01;
            frame = Frame::new(frame.mid(), &payload).unwrap();
        }
        if self.boot.handle(&frame, &mut self.output) == avarix_bootloader::Step::Boot {
            self.booted = true;
        }
    }
}

impl Write for SimDevice {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if self.reader.feed(byte) {
                let frame = self.reader.frame().clone();
                self.handle(frame);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for SimDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.output.len());
        for (dst, src) in buf.iter_mut().zip(self.output.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

/// Port that never answers
struct Silent;

impl Write for Silent {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Silent {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::ErrorKind::TimedOut.into())
    }
}

/// Port replaying canned device output, ignoring what is written
struct Canned(VecDeque<u8>);

impl Canned {
    fn reply(command: Command, fields: &[u8]) -> Self {
        let payload = [&[command as u8, Status::Success as u8][..], fields].concat();
        let frame = Frame::new(MID_REPLY, &payload).unwrap();
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = frame.encode(&mut buf).unwrap();
        Self(buf[..len].iter().copied().collect())
    }
}

impl Write for Canned {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for Canned {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.0.len());
        for (dst, src) in buf.iter_mut().zip(self.0.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

fn client() -> BootClient<SimDevice> {
    BootClient::new(SimDevice::new())
}

fn page(addr: u32, seed: u8) -> Page {
    Page {
        addr,
        data: (0..PAGE as u8).map(|i| i.wrapping_add(seed)).collect(),
    }
}

#[test]
fn test_infos_and_mirror() {
    let mut client = client();
    assert_eq!(client.infos().unwrap(), PAGE as u16);
    assert!(client.mirror(0x33).unwrap());
    assert_eq!(client.fuse_read().unwrap(), vec![0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5]);
}

#[test]
fn test_program_and_check() {
    let mut client = client();
    let pages = [page(0x100, 1), page(0x140, 2)];
    assert_eq!(client.program(&pages, None).unwrap(), 2);

    let device = client.into_inner();
    assert_eq!(&device.flash().app()[0x100..0x140], &pages[0].data[..]);
    assert_eq!(&device.flash().app()[0x140..0x180], &pages[1].data[..]);
    assert_eq!(device.flash().page_writes(), 2);

    let mut client = BootClient::new(device);
    let image = [Chunk {
        addr: 0x100,
        data: [pages[0].data.clone(), pages[1].data.clone()].concat(),
    }];
    assert!(client.check(&image).unwrap());

    let other = [Chunk {
        addr: 0x100,
        data: vec![0; 4],
    }];
    assert!(!client.check(&other).unwrap());
}

#[test]
fn test_short_page_padded() {
    let mut client = client();
    let short = Page {
        addr: 0,
        data: vec![1, 2, 3],
    };
    client.program(&[short], None).unwrap();
    let device = client.into_inner();
    assert_eq!(&device.flash().app()[..4], &[1, 2, 3, 0xFF]);
}

#[test]
fn test_crc_mismatch_retried() {
    let mut device = SimDevice::new();
    device.corrupt = 2;
    let mut client = BootClient::new(device);
    client.program(&[page(0, 9)], None).unwrap();

    let device = client.into_inner();
    assert_eq!(&device.flash().app()[..PAGE], &page(0, 9).data[..]);
    assert_eq!(device.flash().page_writes(), 1);
}

#[test]
fn test_crc_mismatch_gives_up() {
    let mut device = SimDevice::new();
    device.corrupt = 3;
    let mut client = BootClient::new(device);
    let err = client.program(&[page(0x40, 0)], None).unwrap_err();
    assert!(matches!(err, ClientError::TooManyRetries(0x40)));
    assert_eq!(client.into_inner().flash().page_writes(), 0);
}

#[test]
fn test_bad_address_reported() {
    let mut client = client();
    let err = client.prog_page(APP_SIZE as u32, &[0; PAGE]).unwrap_err();
    assert!(matches!(
        err,
        ClientError::Status {
            command: Command::ProgPage,
            status: Status::BadValue
        }
    ));
    let err = client.prog_page(0x10, &[0; PAGE]).unwrap_err();
    assert!(matches!(err, ClientError::BadPage { addr: 0x10, .. }));
}

#[test]
fn test_user_signature() {
    let mut client = client();
    assert_eq!(client.read_user_sig().unwrap(), None);

    let sig = UserSignature::new("mot1", 1_700_000_000, "bob");
    client.prog_user_sig(&sig).unwrap();
    assert_eq!(client.read_user_sig().unwrap(), Some(sig));
}

#[test]
fn test_program_hex_diff() {
    let old = parse_hex(":0400000001020304F2\n:00000001FF\n").unwrap();
    let new = parse_hex(":0400000001020304F2\n:0400400005060708A2\n:00000001FF\n").unwrap();
    let mut client = client();
    assert_eq!(client.program_hex(&new, Some(old.as_slice())).unwrap(), 1);

    let device = client.into_inner();
    assert_eq!(&device.flash().app()[0x40..0x44], &[5, 6, 7, 8]);
    assert_eq!(device.flash().read_byte(0), 0xFF);
}

#[test]
fn test_empty_image_rejected() {
    let mut client = client();
    assert!(matches!(client.program_hex(&[], None), Err(ClientError::EmptyImage)));
    assert!(matches!(client.check(&[]), Err(ClientError::EmptyImage)));
}

#[test]
fn test_boot() {
    let mut client = client();
    client.boot().unwrap();
    assert!(client.into_inner().booted);
}

#[test]
fn test_timeout() {
    let mut client = BootClient::new(Silent).with_timeout(Duration::from_millis(20));
    assert!(matches!(client.infos(), Err(ClientError::Timeout(Command::Info))));
}

#[test]
fn test_invalid_page_size_rejected() {
    for size in [0u16, 63] {
        let mut client = BootClient::new(Canned::reply(Command::Info, &size.to_le_bytes()))
            .with_timeout(Duration::from_millis(20));
        assert!(matches!(client.infos(), Err(ClientError::MalformedReply(Command::Info))));
        // not cached: the next query asks the device again
        assert!(matches!(client.page_size(), Err(ClientError::Timeout(Command::Info))));
        assert!(matches!(
            client.prog_page(0, &[]),
            Err(ClientError::Timeout(Command::Info))
        ));
    }
}
