use crate::memory::AddressWindow;
use std::ops::Range;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotError {
    #[error("slot {slot} is out of range, store has {slot_count} slots")]
    OutOfRange { slot: u8, slot_count: u32 },
}

/// Geometry of the read-only region holding the menu and user images. Slot 0 holds the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageStore {
    base: u32,
    window: AddressWindow,
    slot_count: u32,
}

impl ImageStore {
    pub const MENU_SLOT: u8 = 0;

    pub(crate) fn new(base: u32, window: AddressWindow, slot_count: u32) -> Self {
        Self {
            base,
            window,
            slot_count,
        }
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn window(&self) -> AddressWindow {
        self.window
    }

    pub fn slot_size(&self) -> u32 {
        self.window.size()
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    pub fn len(&self) -> u32 {
        self.slot_count * self.slot_size()
    }

    pub fn is_empty(&self) -> bool {
        self.slot_count == 0
    }

    pub fn contains_range(&self, address: u32, len: u32) -> bool {
        let start = u64::from(address);
        let end = start + u64::from(len);
        start >= u64::from(self.base) && end <= u64::from(self.base) + u64::from(self.len())
    }

    /// Address of the first byte of `slot`. Pure in the slot index and the store geometry.
    pub fn target_address(&self, slot: u8) -> Result<u32, SlotError> {
        if u32::from(slot) >= self.slot_count {
            return Err(SlotError::OutOfRange {
                slot,
                slot_count: self.slot_count,
            });
        }

        Ok(self.base + u32::from(slot) * self.slot_size())
    }

    /// Byte range of `slot` relative to the start of the store.
    pub fn slot_range(&self, slot: u8) -> Result<Range<usize>, SlotError> {
        let start = (self.target_address(slot)? - self.base) as usize;
        Ok(start..start + self.slot_size() as usize)
    }
}
