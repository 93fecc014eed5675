use serde::{Deserialize, Serialize};
use std::fmt::Formatter;

/// Number of console address lines (A0..A20).
pub const ADDRESS_BUS_WIDTH: u32 = 21;

/// Number of address bits carried on the shared lines during an access latch or write strobe.
pub const LOW_ADDRESS_BITS: u32 = 10;
pub const LOW_ADDRESS_MASK: u32 = (1 << LOW_ADDRESS_BITS) - 1;

/// Number of address bits carried on the shared lines during a page latch (A10..A20).
pub const HIGH_ADDRESS_BITS: u32 = ADDRESS_BUS_WIDTH - LOW_ADDRESS_BITS;
pub const HIGH_ADDRESS_MASK: u32 = (1 << HIGH_ADDRESS_BITS) - 1;

pub const ADDRESS_MASK: u32 = (1 << ADDRESS_BUS_WIDTH) - 1;

pub const DATA_BUS_WIDTH: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControlLine {
    PageLatch,
    AccessLatch,
    WriteStrobe,
    OutputEnable,
    ChipSelect,
}

impl std::fmt::Display for ControlLine {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PageLatch => "HALE",
            Self::AccessLatch => "LALE",
            Self::WriteStrobe => "WE",
            Self::OutputEnable => "OE",
            Self::ChipSelect => "CS",
        };
        write!(f, "{name}")
    }
}

/// Which group of bus pins a state machine samples or drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusLines {
    Address,
    Data,
}

/// Pin routing handed to a state machine when it is initialized.
///
/// `strobe` is the control line the machine waits on; the data pusher is the only role
/// without one since it free-runs off its input queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinBinding {
    pub lines: BusLines,
    pub strobe: Option<ControlLine>,
}

impl PinBinding {
    pub fn new(lines: BusLines, strobe: ControlLine) -> Self {
        Self {
            lines,
            strobe: Some(strobe),
        }
    }

    pub fn free_running(lines: BusLines) -> Self {
        Self {
            lines,
            strobe: None,
        }
    }
}

/// Split a console address into the values visible on the multiplexed lines during the page
/// latch and the access latch respectively.
pub fn split_address(address: u32) -> (u32, u32) {
    let address = address & ADDRESS_MASK;
    (
        (address >> LOW_ADDRESS_BITS) & HIGH_ADDRESS_MASK,
        address & LOW_ADDRESS_MASK,
    )
}

/// A single console-side bus operation, as recorded in or replayed from a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusEvent {
    Read { address: u32 },
    Write { address: u32, value: u8 },
    /// Console-level reset; the next access always re-latches the page.
    Reset,
    /// No bus activity for this many controller spins.
    Idle { cycles: u32 },
}

impl std::fmt::Display for BusEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { address } => write!(f, "read {address:06X}"),
            Self::Write { address, value } => write!(f, "write {value:02X} -> {address:06X}"),
            Self::Reset => write!(f, "reset"),
            Self::Idle { cycles } => write!(f, "idle {cycles}"),
        }
    }
}
