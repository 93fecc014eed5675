use crate::bus::PinBinding;
use crate::hal::HalError;
use crate::memory::AddressWindow;
use crate::pipeline::PipelineMode;
use std::fmt::Formatter;

pub const STATE_MACHINES_PER_BLOCK: usize = 4;
pub const INSTRUCTION_MEMORY_SIZE: u8 = 32;
pub const FIFO_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PioId {
    Pio0,
    Pio1,
}

impl PioId {
    pub const ALL: [Self; 2] = [Self::Pio0, Self::Pio1];

    pub fn index(self) -> usize {
        match self {
            Self::Pio0 => 0,
            Self::Pio1 => 1,
        }
    }
}

impl std::fmt::Display for PioId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pio0 => write!(f, "PIO0"),
            Self::Pio1 => write!(f, "PIO1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateMachineId(pub u8);

impl std::fmt::Display for StateMachineId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SM{}", self.0)
    }
}

/// The bus-edge programs. Only their queue contract is modeled, see `sim::pio` for how each
/// one reacts to its strobe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Program {
    /// Drives the staged data bits onto the bus while output enable is asserted.
    OutputEnableToggle,
    /// Pulls one byte per access from TX and stages it on the data pins.
    PushDataBits,
    /// Pushes A10..A20 to RX on every page latch.
    HighAddressLatch,
    /// Composes a controller address from its seed, the latest page word and A0..A9, and
    /// pushes it to RX on every access latch.
    LowAddressLatch {
        mode: PipelineMode,
        window: AddressWindow,
    },
    /// Pushes the data lines to RX on every write strobe.
    WriteCheck,
    /// Pushes A0..A9 to RX on every write strobe.
    WriteCheckAddress,
}

impl Program {
    /// Number of instruction words the program occupies.
    pub fn len(self) -> u8 {
        match self {
            Self::OutputEnableToggle => 3,
            Self::PushDataBits => 2,
            Self::HighAddressLatch => 4,
            // Both variants are assembled to the same length so either fits the other's offset
            Self::LowAddressLatch { .. } => 7,
            Self::WriteCheck | Self::WriteCheckAddress => 4,
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutputEnableToggle => write!(f, "oe_toggle"),
            Self::PushDataBits => write!(f, "push_databits"),
            Self::HighAddressLatch => write!(f, "hale_latch"),
            Self::LowAddressLatch { mode, window } => write!(f, "lale_latch[{mode}, {window}]"),
            Self::WriteCheck => write!(f, "write_check"),
            Self::WriteCheckAddress => write!(f, "write_check_addr"),
        }
    }
}

/// A DMA pacing signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dreq {
    PioRx { pio: PioId, sm: StateMachineId },
    PioTx { pio: PioId, sm: StateMachineId },
    /// Unpaced; the channel transfers as soon as it is triggered.
    Permanent,
}

pub trait PioBlock {
    fn id(&self) -> PioId;

    fn claim_unused_sm(&mut self) -> Result<StateMachineId, HalError>;

    /// Load `program` into the first free run of instruction memory and return its offset.
    fn add_program(&mut self, program: Program) -> Result<u8, HalError>;

    fn add_program_at_offset(&mut self, program: Program, offset: u8) -> Result<(), HalError>;

    fn remove_program(&mut self, program: Program, offset: u8) -> Result<(), HalError>;

    /// Configure `sm` to run the program at `offset` with the given pins, clear its FIFOs and
    /// internal state, and start it.
    fn init_sm(&mut self, sm: StateMachineId, program: Program, offset: u8, pins: PinBinding);

    fn set_enabled(&mut self, sm: StateMachineId, enabled: bool);

    fn is_enabled(&self, sm: StateMachineId) -> bool;

    fn put(&mut self, sm: StateMachineId, word: u32) -> Result<(), HalError>;

    fn get(&mut self, sm: StateMachineId) -> Option<u32>;

    fn is_rx_fifo_empty(&self, sm: StateMachineId) -> bool;

    fn rx_dreq(&self, sm: StateMachineId) -> Dreq {
        Dreq::PioRx { pio: self.id(), sm }
    }
}
