//! CRC-16/CCITT as computed by AVR `_crc_ccitt_update()`.
//!
//! Polynomial 0x1021 processed LSB first (reflected form 0x8408), initial
//! value 0xFFFF, no final XOR. CRCs are sent little-endian, so a receiver can
//! XOR the two trailer bytes into its accumulator and test for zero.

/// Initial accumulator value
pub const CRC_INIT: u16 = 0xFFFF;

const POLY_REFLECTED: u16 = 0x8408;

const fn make_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY_REFLECTED
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static TABLE: [u16; 256] = make_table();

/// Update a CRC value with one byte
#[inline]
pub fn update(crc: u16, byte: u8) -> u16 {
    (crc >> 8) ^ TABLE[((crc ^ byte as u16) & 0xFF) as usize]
}

/// Compute the CRC of a whole slice
pub fn checksum(data: &[u8]) -> u16 {
    data.iter().fold(CRC_INIT, |crc, &b| update(crc, b))
}

/// Running CRC accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    pub const fn new() -> Self {
        Self { value: CRC_INIT }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.value = CRC_INIT;
    }

    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.value = update(self.value, byte);
    }

    pub fn update_slice(&mut self, data: &[u8]) {
        for &b in data {
            self.update(b);
        }
    }

    #[inline]
    pub const fn value(&self) -> u16 {
        self.value
    }

    /// XOR the low trailer byte into the accumulator
    #[inline]
    pub fn xor_low(&mut self, byte: u8) {
        self.value ^= byte as u16;
    }

    /// XOR the high trailer byte into the accumulator
    #[inline]
    pub fn xor_high(&mut self, byte: u8) {
        self.value ^= (byte as u16) << 8;
    }

    /// After both trailer bytes were XOR-ed, zero means match
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.value == 0
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}
