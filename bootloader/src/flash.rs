//! Flash memory access.
//!
//! Writes go through a page buffer: words are loaded first, then the whole
//! page is erased and written in one operation. This matches the NVM
//! controllers of the target chips and keeps the bootloader from ever
//! writing a partial page.

/// Chip flash operations used by the bootloader
pub trait Flash {
    /// Read an application flash byte
    fn read_byte(&self, addr: u32) -> u8;

    /// Load a little-endian word into the page buffer
    ///
    /// Only the offset of `addr` in its page matters.
    fn load_page_word(&mut self, addr: u32, word: u16);

    /// Erase the page at `addr` and write the page buffer to it
    fn erase_write_app_page(&mut self, addr: u32);

    /// Read fuse byte `index`
    fn fuse(&self, index: u8) -> u8;

    /// Read a user signature row byte
    fn read_user_sig(&self, offset: u16) -> u8;

    /// Load a little-endian word into the page buffer for the signature row
    fn load_user_sig_word(&mut self, offset: u16, word: u16) {
        self.load_page_word(offset as u32, word);
    }

    /// Erase the user signature row and write the page buffer to it
    fn erase_write_user_sig(&mut self);
}

impl<T: Flash + ?Sized> Flash for &mut T {
    fn read_byte(&self, addr: u32) -> u8 {
        (**self).read_byte(addr)
    }

    fn load_page_word(&mut self, addr: u32, word: u16) {
        (**self).load_page_word(addr, word)
    }

    fn erase_write_app_page(&mut self, addr: u32) {
        (**self).erase_write_app_page(addr)
    }

    fn fuse(&self, index: u8) -> u8 {
        (**self).fuse(index)
    }

    fn read_user_sig(&self, offset: u16) -> u8 {
        (**self).read_user_sig(offset)
    }

    fn load_user_sig_word(&mut self, offset: u16, word: u16) {
        (**self).load_user_sig_word(offset, word)
    }

    fn erase_write_user_sig(&mut self) {
        (**self).erase_write_user_sig()
    }
}

/// Flash held in memory
///
/// Erased bytes read as 0xFF. Used by host-side simulations and tests.
#[cfg(any(test, feature = "std"))]
#[derive(Debug, Clone)]
pub struct MemFlash {
    app: std::vec::Vec<u8>,
    page_size: usize,
    page_buffer: std::vec::Vec<u8>,
    user_sig: std::vec::Vec<u8>,
    fuses: std::vec::Vec<u8>,
    page_writes: usize,
}

#[cfg(any(test, feature = "std"))]
impl MemFlash {
    /// Blank flash of `app_size` bytes; the signature row is one page
    pub fn new(app_size: usize, page_size: usize) -> Self {
        Self {
            app: vec![0xFF; app_size],
            page_size,
            page_buffer: vec![0xFF; page_size],
            user_sig: vec![0xFF; page_size],
            fuses: vec![0xFF; avarix_proto::boot::FUSE_COUNT],
            page_writes: 0,
        }
    }

    pub fn with_fuses(mut self, fuses: &[u8]) -> Self {
        self.fuses = fuses.to_vec();
        self
    }

    pub fn app(&self) -> &[u8] {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut [u8] {
        &mut self.app
    }

    pub fn user_sig(&self) -> &[u8] {
        &self.user_sig
    }

    /// Erase/write operations performed so far, signature row included
    pub fn page_writes(&self) -> usize {
        self.page_writes
    }

    fn take_page_buffer(&mut self) -> std::vec::Vec<u8> {
        core::mem::replace(&mut self.page_buffer, vec![0xFF; self.page_size])
    }
}

#[cfg(any(test, feature = "std"))]
impl Flash for MemFlash {
    fn read_byte(&self, addr: u32) -> u8 {
        self.app.get(addr as usize).copied().unwrap_or(0xFF)
    }

    fn load_page_word(&mut self, addr: u32, word: u16) {
        let offset = addr as usize % self.page_size;
        if offset + 1 < self.page_size {
            self.page_buffer[offset..offset + 2].copy_from_slice(&word.to_le_bytes());
        }
    }

    fn erase_write_app_page(&mut self, addr: u32) {
        let start = addr as usize - addr as usize % self.page_size;
        let page = self.take_page_buffer();
        if let Some(dest) = self.app.get_mut(start..start + self.page_size) {
            dest.copy_from_slice(&page);
        }
        self.page_writes += 1;
    }

    fn fuse(&self, index: u8) -> u8 {
        self.fuses.get(index as usize).copied().unwrap_or(0)
    }

    fn read_user_sig(&self, offset: u16) -> u8 {
        self.user_sig.get(offset as usize).copied().unwrap_or(0xFF)
    }

    fn erase_write_user_sig(&mut self) {
        self.user_sig = self.take_page_buffer();
        self.page_writes += 1;
    }
}
