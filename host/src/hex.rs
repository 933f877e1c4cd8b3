//! Intel HEX images.
//!
//! Only the record types produced by AVR toolchains are supported: data
//! (00), end of file (01) and extended segment address (02).

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

/// Value of unprogrammed flash bytes
pub const UNUSED_BYTE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HexErrorKind {
    #[error("not a HEX record")]
    Syntax,
    #[error("byte count does not match data")]
    ByteCount,
    #[error("checksum mismatch")]
    Checksum,
    #[error("unsupported record type {0:02x}")]
    RecordType(u8),
    #[error("invalid extended segment address record")]
    Segment,
    #[error("backward address jump")]
    Backward,
}

/// HEX parsing error with its line number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("line {line}: {kind}")]
pub struct HexError {
    pub line: usize,
    pub kind: HexErrorKind,
}

/// Contiguous bytes at an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub addr: u32,
    pub data: Vec<u8>,
}

impl Chunk {
    /// Address following the last byte
    pub fn end(&self) -> u32 {
        self.addr + self.data.len() as u32
    }
}

/// One flash page, `addr` is aligned on the page size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub addr: u32,
    pub data: Vec<u8>,
}

struct Record {
    addr: u16,
    kind: u8,
    data: Vec<u8>,
}

impl Record {
    fn parse(line: &str) -> Result<Self, HexErrorKind> {
        let digits = line.strip_prefix(':').ok_or(HexErrorKind::Syntax)?;
        if !digits.is_ascii() || digits.len() < 10 || digits.len() % 2 != 0 {
            return Err(HexErrorKind::Syntax);
        }
        let bytes = (0..digits.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&digits[i..i + 2], 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| HexErrorKind::Syntax)?;

        let count = bytes[0] as usize;
        if bytes.len() != count + 5 {
            return Err(HexErrorKind::ByteCount);
        }
        if bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b)) != 0 {
            return Err(HexErrorKind::Checksum);
        }
        Ok(Self {
            addr: u16::from_be_bytes([bytes[1], bytes[2]]),
            kind: bytes[3],
            data: bytes[4..4 + count].to_vec(),
        })
    }
}

/// Parse HEX text into contiguous chunks
pub fn parse_hex(text: &str) -> Result<Vec<Chunk>, HexError> {
    let mut chunks = Vec::new();
    let mut current: Option<Chunk> = None;
    let mut base = 0u32;

    for (i, line) in text.lines().enumerate() {
        let err = |kind| HexError { line: i + 1, kind };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = Record::parse(line).map_err(err)?;
        match record.kind {
            0x00 => {
                let addr = base + record.addr as u32;
                match current.as_mut() {
                    Some(chunk) if addr == chunk.end() => chunk.data.extend_from_slice(&record.data),
                    Some(chunk) if addr < chunk.end() => return Err(err(HexErrorKind::Backward)),
                    _ => {
                        chunks.extend(current.take());
                        current = Some(Chunk {
                            addr,
                            data: record.data,
                        });
                    }
                }
            }
            0x01 => break,
            0x02 => {
                let &[hi, lo] = record.data.as_slice() else {
                    return Err(err(HexErrorKind::Segment));
                };
                base = (u16::from_be_bytes([hi, lo]) as u32) << 4;
            }
            other => return Err(err(HexErrorKind::RecordType(other))),
        }
    }
    chunks.extend(current);
    Ok(chunks)
}

/// Read and parse a HEX file
pub fn load_hex(path: impl AsRef<Path>) -> crate::Result<Vec<Chunk>> {
    let text = std::fs::read_to_string(path)?;
    Ok(parse_hex(&text)?)
}

/// Cut chunks into pages, padding with [`UNUSED_BYTE`]
///
/// Pages are sorted by address. Overlapping chunks keep the last value.
/// A zero `page_size` yields no pages.
pub fn split_pages(chunks: &[Chunk], page_size: usize) -> Vec<Page> {
    if page_size == 0 {
        return Vec::new();
    }
    let mut pages: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
    for chunk in chunks {
        for (i, &byte) in chunk.data.iter().enumerate() {
            let addr = chunk.addr as usize + i;
            let page_addr = (addr - addr % page_size) as u32;
            let page = pages
                .entry(page_addr)
                .or_insert_with(|| vec![UNUSED_BYTE; page_size]);
            page[addr % page_size] = byte;
        }
    }
    pages
        .into_iter()
        .map(|(addr, data)| Page { addr, data })
        .collect()
}

/// Pages of `new` that are not identical in `old`
pub fn diff_pages(new: &[Page], old: &[Page]) -> Vec<Page> {
    new.iter().filter(|page| !old.contains(page)).cloned().collect()
}
