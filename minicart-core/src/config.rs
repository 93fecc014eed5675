use crate::bus::LOW_ADDRESS_MASK;
use crate::memory::address::{
    DEFAULT_FLASH_SIZE, DEFAULT_IMAGE_STORE_OFFSET, DEFAULT_MENU_WINDOW_SIZE,
    DEFAULT_SELECTION_SENTINEL, DEFAULT_SINGLE_IMAGE_SIZE, DEFAULT_SLOT_SIZE, XIP_ALIAS_SPAN,
    XIP_CACHE_BASE,
};
use crate::memory::AddressWindow;
use crate::store::ImageStore;
use serde::{Deserialize, Serialize};
use std::fmt::Formatter;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} of {size:#X} bytes is not a power of two between 1 KiB and 2 MiB")]
    InvalidWindowSize { name: &'static str, size: u32 },
    #[error("slot count must be between 1 and 256, was {slot_count}")]
    InvalidSlotCount { slot_count: u32 },
    #[error("flash size {flash_size:#X} exceeds the 16 MiB XIP alias")]
    FlashTooLarge { flash_size: u32 },
    #[error("image store ends at flash offset {end:#X}, past the end of {flash_size:#X} byte flash")]
    StoreOutsideFlash { end: u64, flash_size: u32 },
    #[error("image store base {base:#010X} is not aligned to its {window} window")]
    MisalignedStore { base: u32, window: AddressWindow },
    #[error("menu image address {address:#010X} is not aligned to its {window} window")]
    MisalignedMenu { address: u32, window: AddressWindow },
    #[error("menu window at {address:#010X} does not lie inside the image store")]
    MenuOutsideStore { address: u32 },
    #[error("selection sentinel {sentinel:#X} does not fit in the low address lines")]
    SentinelOutOfRange { sentinel: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartLayout {
    /// Menu in slot 0, user images behind it, selected at boot through the menu.
    #[default]
    Multi,
    /// One image served directly from the store base, no menu and no selection listener.
    Single,
}

/// What to do with a captured selection whose slot index is past the end of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangePolicy {
    /// Discard the capture like any other non-qualifying write and keep listening.
    #[default]
    Ignore,
    /// Accept the capture but serve slot 0.
    ClampToMenu,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CoreVoltage {
    #[serde(rename = "1.10")]
    V1_10,
    #[serde(rename = "1.15")]
    V1_15,
    #[serde(rename = "1.20")]
    V1_20,
    #[serde(rename = "1.25")]
    V1_25,
    #[default]
    #[serde(rename = "1.30")]
    V1_30,
}

impl std::fmt::Display for CoreVoltage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let volts = match self {
            Self::V1_10 => "1.10",
            Self::V1_15 => "1.15",
            Self::V1_20 => "1.20",
            Self::V1_25 => "1.25",
            Self::V1_30 => "1.30",
        };
        write!(f, "{volts}V")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartConfig {
    #[serde(default)]
    pub layout: CartLayout,

    #[serde(default = "default_settle_delay")]
    pub settle_delay: u32,

    #[serde(default = "default_slot_size")]
    pub slot_size: u32,

    #[serde(default = "default_slot_count")]
    pub slot_count: u32,

    #[serde(default = "default_menu_window_size")]
    pub menu_window_size: u32,

    #[serde(default = "default_single_image_size")]
    pub single_image_size: u32,

    #[serde(default = "default_flash_size")]
    pub flash_size: u32,

    #[serde(default = "default_image_store_offset")]
    pub image_store_offset: u32,

    /// Defaults to the address of slot 0.
    pub menu_image_address: Option<u32>,

    #[serde(default = "default_selection_sentinel")]
    pub selection_sentinel: u32,

    #[serde(default)]
    pub out_of_range_policy: OutOfRangePolicy,

    #[serde(default = "default_sys_clock_khz")]
    pub sys_clock_khz: u32,

    #[serde(default)]
    pub core_voltage: CoreVoltage,
}

fn default_settle_delay() -> u32 {
    100_000
}

fn default_slot_size() -> u32 {
    DEFAULT_SLOT_SIZE
}

fn default_slot_count() -> u32 {
    // Menu plus 20 user slots fills a 16 MiB part
    21
}

fn default_menu_window_size() -> u32 {
    DEFAULT_MENU_WINDOW_SIZE
}

fn default_single_image_size() -> u32 {
    DEFAULT_SINGLE_IMAGE_SIZE
}

fn default_flash_size() -> u32 {
    DEFAULT_FLASH_SIZE
}

fn default_image_store_offset() -> u32 {
    DEFAULT_IMAGE_STORE_OFFSET
}

fn default_selection_sentinel() -> u32 {
    DEFAULT_SELECTION_SENTINEL
}

fn default_sys_clock_khz() -> u32 {
    240_000
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            layout: CartLayout::default(),
            settle_delay: default_settle_delay(),
            slot_size: default_slot_size(),
            slot_count: default_slot_count(),
            menu_window_size: default_menu_window_size(),
            single_image_size: default_single_image_size(),
            flash_size: default_flash_size(),
            image_store_offset: default_image_store_offset(),
            menu_image_address: None,
            selection_sentinel: default_selection_sentinel(),
            out_of_range_policy: OutOfRangePolicy::default(),
            sys_clock_khz: default_sys_clock_khz(),
            core_voltage: CoreVoltage::default(),
        }
    }
}

impl CartConfig {
    pub fn store_base(&self) -> u32 {
        XIP_CACHE_BASE + self.image_store_offset
    }

    /// The window the low-address latcher uses once an image has been selected.
    pub fn direct_window(&self) -> Result<AddressWindow, ConfigError> {
        match self.layout {
            CartLayout::Multi => window("slot size", self.slot_size),
            CartLayout::Single => window("single image size", self.single_image_size),
        }
    }

    pub fn menu_window(&self) -> Result<AddressWindow, ConfigError> {
        window("menu window size", self.menu_window_size)
    }

    /// Build and check the store geometry. Every address the controller seeds into the pipeline
    /// is derived from the returned store.
    pub fn image_store(&self) -> Result<ImageStore, ConfigError> {
        if self.flash_size > XIP_ALIAS_SPAN {
            return Err(ConfigError::FlashTooLarge {
                flash_size: self.flash_size,
            });
        }

        let direct_window = self.direct_window()?;
        let slot_count = match self.layout {
            CartLayout::Multi => self.slot_count,
            CartLayout::Single => 1,
        };
        if !(1..=256).contains(&slot_count) {
            return Err(ConfigError::InvalidSlotCount { slot_count });
        }

        let end = u64::from(self.image_store_offset)
            + u64::from(slot_count) * u64::from(direct_window.size());
        if end > u64::from(self.flash_size) {
            return Err(ConfigError::StoreOutsideFlash {
                end,
                flash_size: self.flash_size,
            });
        }

        let base = self.store_base();
        if !direct_window.is_aligned(base) {
            return Err(ConfigError::MisalignedStore {
                base,
                window: direct_window,
            });
        }

        Ok(ImageStore::new(base, direct_window, slot_count))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let store = self.image_store()?;

        if self.selection_sentinel > LOW_ADDRESS_MASK {
            return Err(ConfigError::SentinelOutOfRange {
                sentinel: self.selection_sentinel,
            });
        }

        if self.layout == CartLayout::Multi {
            let menu_window = self.menu_window()?;
            let address = self.menu_image_address(&store);
            if !menu_window.is_aligned(address) {
                return Err(ConfigError::MisalignedMenu {
                    address,
                    window: menu_window,
                });
            }
            if !store.contains_range(address, menu_window.size()) {
                return Err(ConfigError::MenuOutsideStore { address });
            }
        }

        Ok(())
    }

    pub fn menu_image_address(&self, store: &ImageStore) -> u32 {
        self.menu_image_address.unwrap_or_else(|| store.base())
    }
}

fn window(name: &'static str, size: u32) -> Result<AddressWindow, ConfigError> {
    AddressWindow::from_size(size).ok_or(ConfigError::InvalidWindowSize { name, size })
}

impl std::fmt::Display for CartConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "layout: {:?}", self.layout)?;
        writeln!(f, "settle_delay: {}", self.settle_delay)?;
        writeln!(f, "slot_size: {:#X}", self.slot_size)?;
        writeln!(f, "slot_count: {}", self.slot_count)?;
        writeln!(f, "menu_window_size: {:#X}", self.menu_window_size)?;
        writeln!(f, "single_image_size: {:#X}", self.single_image_size)?;
        writeln!(f, "flash_size: {:#X}", self.flash_size)?;
        writeln!(f, "image_store_offset: {:#X}", self.image_store_offset)?;
        writeln!(
            f,
            "menu_image_address: {}",
            fmt_option(self.menu_image_address.map(|address| format!("{address:#010X}")).as_ref())
        )?;
        writeln!(f, "selection_sentinel: {:#X}", self.selection_sentinel)?;
        writeln!(f, "out_of_range_policy: {:?}", self.out_of_range_policy)?;
        writeln!(f, "sys_clock_khz: {}", self.sys_clock_khz)?;
        writeln!(f, "core_voltage: {}", self.core_voltage)?;

        Ok(())
    }
}

fn fmt_option<T: std::fmt::Display>(option: Option<&T>) -> String {
    match option {
        Some(value) => format!("{value}"),
        None => "<None>".into(),
    }
}

/// How the simulated console behaves during a `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunScript {
    /// Boot the menu, select `slot`, reset, then read back the selected image.
    Select {
        slot: u8,
        menu_reads: u32,
        image_reads: u32,
    },
    /// Replay a bus trace recorded earlier.
    Trace { trace_path: String },
}

impl std::fmt::Display for RunScript {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Select {
                slot,
                menu_reads,
                image_reads,
            } => write!(
                f,
                "Select(slot={slot}, menu_reads={menu_reads}, image_reads={image_reads})"
            ),
            Self::Trace { trace_path } => write!(f, "Trace({trace_path})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub store_path: String,
    pub script: RunScript,
    pub save_trace_path: Option<String>,
    /// Upper bound on controller iterations before the run is abandoned.
    pub max_spins: u64,
}

impl std::fmt::Display for RunConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "store_path: {}", self.store_path)?;
        writeln!(f, "script: {}", self.script)?;
        writeln!(
            f,
            "save_trace_path: {}",
            fmt_option(self.save_trace_path.as_ref())
        )?;
        writeln!(f, "max_spins: {}", self.max_spins)?;

        Ok(())
    }
}
