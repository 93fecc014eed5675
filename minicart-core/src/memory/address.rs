//
// Controller flash aliases
//

pub const XIP_CACHE_BASE: u32 = 0x1000_0000;
pub const XIP_NOCACHE_BASE: u32 = 0x1300_0000;
pub const XIP_NOCACHE_OFFSET: u32 = XIP_NOCACHE_BASE - XIP_CACHE_BASE;

/// Largest flash part the aliases can address.
pub const XIP_ALIAS_SPAN: u32 = 0x0100_0000;

//
// Window limits
//

pub const MIN_WINDOW_BITS: u32 = crate::bus::LOW_ADDRESS_BITS;
pub const MAX_WINDOW_BITS: u32 = crate::bus::ADDRESS_BUS_WIDTH;

//
// Defaults taken from the shipping hardware
//

pub const DEFAULT_FLASH_SIZE: u32 = 16 * 1024 * 1024;
pub const DEFAULT_IMAGE_STORE_OFFSET: u32 = 0x0010_0000;
pub const DEFAULT_SLOT_SIZE: u32 = 512 * 1024;
pub const DEFAULT_MENU_WINDOW_SIZE: u32 = 16 * 1024;
pub const DEFAULT_SINGLE_IMAGE_SIZE: u32 = 1024 * 1024;
pub const DEFAULT_SELECTION_SENTINEL: u32 = 0x3FF;
