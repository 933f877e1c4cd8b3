//! Payload types: identifiers, the supported-payloads bitmap and the
//! built-in handlers.

pub mod log;
pub mod room;
pub mod system;

/// Node management: ping, name, stop, reset...
pub const SYSTEM: u8 = 0x00;
/// Text log messages
pub const LOG: u8 = 0x01;
/// Application messages identified by a message id
pub const ROOM: u8 = 0x10;

/// Set of payload types, one bit per id
///
/// Bit `n % 8` of byte `n / 8` is set iff id `n` is in the set. This is also
/// the wire layout of the SUPPORTED_PAYLOADS reply. SYSTEM is always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PayloadSet([u8; 32]);

impl PayloadSet {
    /// Set holding only SYSTEM
    pub const fn new() -> Self {
        Self([0; 32]).with(SYSTEM)
    }

    /// Set holding SYSTEM and the given ids
    pub const fn from_ids(ids: &[u8]) -> Self {
        let mut set = Self::new();
        let mut i = 0;
        while i < ids.len() {
            set = set.with(ids[i]);
            i += 1;
        }
        set
    }

    pub const fn with(mut self, id: u8) -> Self {
        self.0[(id / 8) as usize] |= 1 << (id % 8);
        self
    }

    pub const fn with_if(self, cond: bool, id: u8) -> Self {
        if cond {
            self.with(id)
        } else {
            self
        }
    }

    pub const fn contains(&self, id: u8) -> bool {
        self.0[(id / 8) as usize] & (1 << (id % 8)) != 0
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Default for PayloadSet {
    fn default() -> Self {
        COMPILED_IN
    }
}

/// Payload types whose handlers are compiled in
pub const COMPILED_IN: PayloadSet = PayloadSet::new()
    .with_if(cfg!(feature = "payload-log"), LOG)
    .with_if(cfg!(feature = "payload-room"), ROOM);
