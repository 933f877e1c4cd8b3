//! # Avarix Flash Bootloader
//!
//! Serial bootloader for the robot controllers. It speaks ROME frames on the
//! same UART as the application and programs the application section one
//! page at a time.
//!
//! ## Session
//!
//! ```text
//!  ENTER ──► "boot ENTER" log frame
//!    │
//!    ▼
//!  LISTEN ──(no byte before connect timeout)──────────────► BOOT
//!    │
//!    ▼
//!  COMMAND ──► reply ──► LISTEN ──(command timeout)───────► BOOT
//!    │
//!    └──(Boot command)─────────────────────────────────────► BOOT
//! ```
//!
//! Page programming is split into a `ProgPage` command announcing the
//! address and CRC, `Buffer` commands carrying the data and an empty `Buffer`
//! closing the session. See [`avarix_proto::boot`] for the wire format.
//!
//! The chip-specific part (page buffer, erase/write, fuses, signature row) is
//! behind the [`Flash`] trait.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod flash;
pub mod loader;

pub use flash::Flash;
#[cfg(any(test, feature = "std"))]
pub use flash::MemFlash;
pub use loader::{BootReason, Bootloader, Step};

use avarix_proto::boot::FUSE_COUNT;
use avarix_proto::ConfigError;

/// Bootloader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootConfig {
    /// Flash page size in bytes
    pub page_size: u16,
    /// Last address of the application section
    pub app_end: u32,
    /// Time to wait for a first byte before booting
    pub connect_timeout_ms: u32,
    /// Time to wait between commands once connected, 0 waits forever
    pub command_timeout_ms: u32,
    /// Fuse bytes returned by `FuseRead`
    pub fuse_count: u8,
}

impl BootConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size % 2 != 0 {
            return Err(ConfigError::InvalidPageSize(self.page_size));
        }
        if (self.app_end as u64 + 1) % self.page_size as u64 != 0 {
            return Err(ConfigError::UnalignedAppEnd(self.app_end));
        }
        Ok(())
    }

    /// Whether `[start, start + size)` lies in the application section
    pub fn in_app(&self, start: u32, size: u32) -> bool {
        start as u64 + size as u64 <= self.app_end as u64 + 1
    }
}

impl Default for BootConfig {
    /// 128 KiB application section with 512-byte pages
    fn default() -> Self {
        Self {
            page_size: 512,
            app_end: 0x1_FFFF,
            connect_timeout_ms: 2000,
            command_timeout_ms: 0,
            fuse_count: FUSE_COUNT as u8,
        }
    }
}
