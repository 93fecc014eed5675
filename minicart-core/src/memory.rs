pub mod address;

use crate::bus::{LOW_ADDRESS_BITS, LOW_ADDRESS_MASK};
use address::{
    MAX_WINDOW_BITS, MIN_WINDOW_BITS, XIP_ALIAS_SPAN, XIP_CACHE_BASE, XIP_NOCACHE_BASE,
    XIP_NOCACHE_OFFSET,
};
use std::fmt::Formatter;

/// Translate a cached flash address into the uncached alias the pipeline fetches through.
/// Addresses that are already uncached are returned unchanged.
pub fn uncached_alias(address: u32) -> u32 {
    if (XIP_CACHE_BASE..XIP_CACHE_BASE + XIP_ALIAS_SPAN).contains(&address) {
        address + XIP_NOCACHE_OFFSET
    } else {
        address
    }
}

/// Map either flash alias back to an offset into the flash part.
pub fn flash_offset(address: u32) -> Option<u32> {
    [XIP_CACHE_BASE, XIP_NOCACHE_BASE]
        .into_iter()
        .find(|&base| (base..base + XIP_ALIAS_SPAN).contains(&address))
        .map(|base| address - base)
}

/// A power-of-two region of controller memory that the console sees mirrored across its
/// whole cartridge address space.
///
/// The low-address latcher holds `seed = uncached_address >> bits` and composes
/// `seed << bits | page << 10 | low` on every access, so the window's page component only
/// carries `bits - 10` address lines and the rest of the console address is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressWindow {
    bits: u32,
}

impl AddressWindow {
    pub fn from_size(size: u32) -> Option<Self> {
        if !size.is_power_of_two() {
            return None;
        }

        let bits = size.trailing_zeros();
        (MIN_WINDOW_BITS..=MAX_WINDOW_BITS)
            .contains(&bits)
            .then_some(Self { bits })
    }

    pub fn bits(self) -> u32 {
        self.bits
    }

    pub fn size(self) -> u32 {
        1 << self.bits
    }

    pub fn page_bits(self) -> u32 {
        self.bits - LOW_ADDRESS_BITS
    }

    pub fn page_mask(self) -> u32 {
        (1 << self.page_bits()) - 1
    }

    pub fn is_aligned(self, address: u32) -> bool {
        address & (self.size() - 1) == 0
    }

    /// The word pushed into the low-address latcher to point this window at `address`.
    pub fn seed(self, address: u32) -> u32 {
        uncached_alias(address) >> self.bits
    }

    /// The controller address fetched for a console access, given the latcher's seed, the
    /// most recent page word and the sampled low address lines.
    pub fn compose(self, seed: u32, page: u32, low: u32) -> u32 {
        (seed << self.bits)
            | ((page & self.page_mask()) << LOW_ADDRESS_BITS)
            | (low & LOW_ADDRESS_MASK)
    }
}

impl std::fmt::Display for AddressWindow {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let size = self.size();
        if size >= 1 << 20 {
            write!(f, "{} MiB", size >> 20)
        } else {
            write!(f, "{} KiB", size >> 10)
        }
    }
}
