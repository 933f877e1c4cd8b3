//! # ACK Id Allocation
//!
//! Orders sent with send-and-wait carry an ACK id taken from a configured
//! range. The id stays active until the matching ACK frame frees it.
//!
//! The table is shared between the sending code and the receive path (which
//! may run from the idle loop or an interrupt), so every access happens
//! inside a `critical_section`.

use core::cell::RefCell;

use critical_section::Mutex;

use crate::config::AckConfig;
use crate::error::ConfigError;

#[derive(Debug)]
struct AckState {
    /// Last id handed out
    last: u8,
    /// One bit per id in 0..=255
    active: [u32; 8],
}

impl AckState {
    fn is_active(&self, id: u8) -> bool {
        self.active[(id / 32) as usize] & (1 << (id % 32)) != 0
    }

    fn set(&mut self, id: u8, active: bool) {
        let word = &mut self.active[(id / 32) as usize];
        if active {
            *word |= 1 << (id % 32);
        } else {
            *word &= !(1 << (id % 32));
        }
    }
}

/// Table of ACK ids awaiting acknowledgement
pub struct AckTable {
    min: u8,
    max: u8,
    state: Mutex<RefCell<AckState>>,
}

impl AckTable {
    /// Table over `min..=max`
    ///
    /// # Panics
    ///
    /// If `min > max`; use [`AckTable::from_config`] for runtime values.
    pub const fn new(min: u8, max: u8) -> Self {
        assert!(min <= max, "empty ACK range");
        Self {
            min,
            max,
            state: Mutex::new(RefCell::new(AckState {
                // first allocation wraps to min
                last: max,
                active: [0; 8],
            })),
        }
    }

    pub fn from_config(config: &AckConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(config.min, config.max))
    }

    pub const fn min(&self) -> u8 {
        self.min
    }

    pub const fn max(&self) -> u8 {
        self.max
    }

    /// Number of ids in the range
    pub const fn len(&self) -> usize {
        (self.max - self.min) as usize + 1
    }

    pub const fn in_range(&self, ack: u8) -> bool {
        ack >= self.min && ack <= self.max
    }

    /// Allocate an ACK id and mark it active
    ///
    /// Scans the range starting after the last id handed out. When every id
    /// is active the last scanned id is reused.
    pub fn next_ack(&self) -> u8 {
        critical_section::with(|cs| {
            let mut state = self.state.borrow_ref_mut(cs);
            let mut ack = state.last;
            let mut found = false;
            for _ in 0..self.len() {
                ack = if ack >= self.max { self.min } else { ack + 1 };
                if !state.is_active(ack) {
                    found = true;
                    break;
                }
            }
            if !found {
                log::warn!("ack: all ids in use, reusing 0x{:02x}", ack);
            }
            state.last = ack;
            state.set(ack, true);
            ack
        })
    }

    /// Whether `ack` is still waiting for its ACK
    pub fn ack_expected(&self, ack: u8) -> bool {
        if !self.in_range(ack) {
            return false;
        }
        critical_section::with(|cs| self.state.borrow_ref(cs).is_active(ack))
    }

    /// Release `ack`; out-of-range ids are ignored
    pub fn free_ack(&self, ack: u8) {
        if !self.in_range(ack) {
            return;
        }
        critical_section::with(|cs| self.state.borrow_ref_mut(cs).set(ack, false));
    }

    /// Number of active ids
    pub fn active_count(&self) -> usize {
        critical_section::with(|cs| {
            let state = self.state.borrow_ref(cs);
            state.active.iter().map(|w| w.count_ones() as usize).sum()
        })
    }
}

impl Default for AckTable {
    fn default() -> Self {
        let config = AckConfig::default();
        Self::new(config.min, config.max)
    }
}

impl core::fmt::Debug for AckTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AckTable")
            .field("min", &self.min)
            .field("max", &self.max)
            .field("active", &self.active_count())
            .finish()
    }
}
