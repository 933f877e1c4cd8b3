//! Bootloader client.
//!
//! Each command is one ROME frame answered by one reply frame. Log frames
//! sent by the device (such as the `boot ENTER` announce) are skipped while
//! waiting for a reply.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use avarix_proto::boot::{
    self, BufferChunk, Command, MemCrc, ProgPage, Status, UserSignature, MID_REPLY,
};
use avarix_proto::crc;
use avarix_proto::rome::{self, Frame, Reader, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
use log::{debug, info, warn};

use crate::error::{ClientError, Result};
use crate::hex::{self, Chunk, Page, UNUSED_BYTE};

/// Default reply timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Data bytes per `Buffer` command, even and below the frame limit
pub const CHUNK_SIZE: usize = 128;

/// Attempts to write a page whose CRC check fails
pub const CRC_ATTEMPTS: usize = 3;

/// Client for the flash bootloader over a byte stream
pub struct BootClient<T> {
    port: T,
    reader: Reader,
    /// Received bytes not parsed yet
    pending: VecDeque<u8>,
    timeout: Duration,
    page_size: Option<u16>,
}

impl<T: Read + Write> BootClient<T> {
    pub fn new(port: T) -> Self {
        Self {
            port,
            reader: Reader::new(),
            pending: VecDeque::new(),
            timeout: DEFAULT_TIMEOUT,
            page_size: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn into_inner(self) -> T {
        self.port
    }

    /// Device page size, queried once
    pub fn page_size(&mut self) -> Result<u16> {
        match self.page_size {
            Some(size) => Ok(size),
            None => self.infos(),
        }
    }

    /// Query the page size, which must be even and non-zero
    pub fn infos(&mut self) -> Result<u16> {
        let fields = self.request(Command::Info, &[])?;
        let &[lo, hi] = fields.as_slice() else {
            return Err(ClientError::MalformedReply(Command::Info));
        };
        let size = u16::from_le_bytes([lo, hi]);
        if size == 0 || size % 2 != 0 {
            return Err(ClientError::MalformedReply(Command::Info));
        }
        self.page_size = Some(size);
        Ok(size)
    }

    /// Check that the device echoes `byte`
    pub fn mirror(&mut self, byte: u8) -> Result<bool> {
        Ok(self.request(Command::Mirror, &[byte])? == [byte])
    }

    pub fn fuse_read(&mut self) -> Result<Vec<u8>> {
        self.request(Command::FuseRead, &[])
    }

    /// CRC of a flash range computed by the device
    pub fn mem_crc(&mut self, start: u32, size: u32) -> Result<u16> {
        let mut buf = [0u8; 8];
        let params = boot::encode_params(&MemCrc { start, size }, &mut buf)?;
        let fields = self.request(Command::MemCrc, params)?;
        let &[lo, hi] = fields.as_slice() else {
            return Err(ClientError::MalformedReply(Command::MemCrc));
        };
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Read the user signature, `None` if the row holds none
    pub fn read_user_sig(&mut self) -> Result<Option<UserSignature>> {
        let fields = self.request(Command::ReadUserSig, &[])?;
        UserSignature::decode(&fields).map_err(|_| ClientError::MalformedReply(Command::ReadUserSig))
    }

    /// Write the user signature row, retrying on CRC mismatch
    pub fn prog_user_sig(&mut self, sig: &UserSignature) -> Result<()> {
        let page_size = self.page_size()? as usize;
        let mut row = vec![UNUSED_BYTE; page_size];
        let encoded = sig.encode()?;
        let n = encoded.len().min(page_size);
        row[..n].copy_from_slice(&encoded[..n]);

        let crc = crc::checksum(&row).to_le_bytes();
        self.with_crc_retry(0, |client| {
            client.request(Command::ProgUserSig, &crc)?;
            client.send_buffer(&row)
        })
    }

    /// Program one page, `data` must be exactly one page
    ///
    /// A CRC mismatch is returned as an error, see [`BootClient::program`]
    /// for retries.
    pub fn prog_page(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let page_size = self.page_size()?;
        if data.len() != page_size as usize || addr % page_size as u32 != 0 {
            return Err(ClientError::BadPage { addr, page_size });
        }
        let mut buf = [0u8; 8];
        let params = boot::encode_params(
            &ProgPage {
                addr,
                crc: crc::checksum(data),
            },
            &mut buf,
        )?;
        self.request(Command::ProgPage, params)?;
        self.send_buffer(data)
    }

    /// Program `pages`, then the user signature if given
    ///
    /// Short pages are padded. Returns the number of pages written.
    pub fn program(&mut self, pages: &[Page], user_sig: Option<&UserSignature>) -> Result<usize> {
        let page_size = self.page_size()?;
        if let Some(sig) = user_sig {
            self.prog_user_sig(sig)?;
        }
        for (i, page) in pages.iter().enumerate() {
            info!("programming page {}/{} at 0x{:06x}", i + 1, pages.len(), page.addr);
            if page.data.len() > page_size as usize {
                return Err(ClientError::BadPage {
                    addr: page.addr,
                    page_size,
                });
            }
            let mut data = page.data.clone();
            data.resize(page_size as usize, UNUSED_BYTE);
            self.with_crc_retry(page.addr, |client| client.prog_page(page.addr, &data))?;
        }
        Ok(pages.len())
    }

    /// Program a HEX image, only pages differing from `previous` if given
    pub fn program_hex(&mut self, image: &[Chunk], previous: Option<&[Chunk]>) -> Result<usize> {
        if image.is_empty() {
            return Err(ClientError::EmptyImage);
        }
        let page_size = self.page_size()? as usize;
        let mut pages = hex::split_pages(image, page_size);
        if let Some(previous) = previous {
            pages = hex::diff_pages(&pages, &hex::split_pages(previous, page_size));
            info!("{} page(s) changed", pages.len());
        }
        self.program(&pages, None)
    }

    /// Compare the device flash with `image` using MEM_CRC
    pub fn check(&mut self, image: &[Chunk]) -> Result<bool> {
        if image.is_empty() {
            return Err(ClientError::EmptyImage);
        }
        for chunk in image {
            let expected = crc::checksum(&chunk.data);
            let actual = self.mem_crc(chunk.addr, chunk.data.len() as u32)?;
            if actual != expected {
                warn!("CRC mismatch for 0x{:06x}..0x{:06x}", chunk.addr, chunk.end());
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Leave the bootloader and start the application
    pub fn boot(&mut self) -> Result<()> {
        self.request(Command::Boot, &[])?;
        info!("device booted");
        Ok(())
    }

    fn with_crc_retry<F>(&mut self, addr: u32, mut op: F) -> Result<()>
    where
        F: FnMut(&mut Self) -> Result<()>,
    {
        for attempt in 1..=CRC_ATTEMPTS {
            match op(self) {
                Err(ClientError::Status {
                    status: Status::CrcMismatch,
                    ..
                }) => warn!("CRC mismatch at 0x{:06x}, attempt {}/{}", addr, attempt, CRC_ATTEMPTS),
                other => return other,
            }
        }
        Err(ClientError::TooManyRetries(addr))
    }

    /// Stream a staged write, then close it with an empty `Buffer`
    fn send_buffer(&mut self, data: &[u8]) -> Result<()> {
        let mut params = [0u8; MAX_PAYLOAD_SIZE];
        for (i, part) in data.chunks(CHUNK_SIZE).enumerate() {
            let chunk = BufferChunk {
                offset: (i * CHUNK_SIZE) as u16,
                data: part,
            };
            let len = chunk.encode(&mut params)?;
            self.request(Command::Buffer, &params[..len])?;
        }
        self.request(Command::Buffer, &[0, 0, 0])?;
        Ok(())
    }

    /// Send a command, return the reply fields on success
    fn request(&mut self, command: Command, params: &[u8]) -> Result<Vec<u8>> {
        let frame = Frame::new(command as u8, params)?;
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let len = frame.encode(&mut buf)?;
        self.port.write_all(&buf[..len])?;
        self.port.flush()?;

        let reply = self.recv_reply(command)?;
        let status = reply.payload()[1];
        match Status::try_from(status) {
            Ok(Status::Success) => Ok(reply.payload()[2..].to_vec()),
            Ok(status) => Err(ClientError::Status { command, status }),
            Err(status) => Err(ClientError::UnknownStatus { command, status }),
        }
    }

    fn recv_reply(&mut self, command: Command) -> Result<Frame> {
        let deadline = Instant::now() + self.timeout;
        loop {
            while let Some(frame) = self.reader.read(&mut self.pending) {
                match frame.mid() {
                    MID_REPLY if frame.payload().len() >= 2 && frame.payload()[0] == command as u8 => {
                        return Ok(frame.clone());
                    }
                    rome::mid::LOG if !frame.payload().is_empty() => {
                        let text = String::from_utf8_lossy(&frame.payload()[1..]);
                        debug!("device log: {}", text.trim());
                    }
                    other => debug!("ignoring frame 0x{:02x}", other),
                }
            }
            if Instant::now() >= deadline {
                return Err(ClientError::Timeout(command));
            }
            if self.fill()? == 0 {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Read what the port has, 0 if nothing is available yet
    fn fill(&mut self) -> Result<usize> {
        let mut buf = [0u8; 64];
        match self.port.read(&mut buf) {
            Ok(n) => {
                self.pending.extend(&buf[..n]);
                Ok(n)
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}
