//! Peripheral interfaces the firmware is written against. The bus pipeline never touches a
//! concrete chip; `sim::SimBoard` implements these for the host and a real board crate would
//! implement them on top of its HAL.

pub mod dma;
pub mod pio;

use crate::config::CoreVoltage;
use thiserror::Error;

pub use dma::{ChannelConfig, ChannelId, DmaEngine, Endpoint, TransferSize};
pub use pio::{Dreq, PioBlock, PioId, Program, StateMachineId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HalError {
    #[error("no unclaimed state machine left in {pio}")]
    NoFreeStateMachine { pio: PioId },
    #[error("no unclaimed DMA channel left")]
    NoFreeChannel,
    #[error("no room in {pio} instruction memory for {program}")]
    NoProgramSpace { pio: PioId, program: Program },
    #[error("cannot load {program} at offset {offset} of {pio}, instruction memory in use")]
    OffsetInUse {
        pio: PioId,
        program: Program,
        offset: u8,
    },
    #[error("cannot remove {program} from offset {offset} of {pio}, it is not loaded there")]
    ProgramNotLoaded {
        pio: PioId,
        program: Program,
        offset: u8,
    },
    #[error("TX FIFO of {pio} {sm} is full")]
    TxFifoFull { pio: PioId, sm: StateMachineId },
    #[error("system clock of {khz} kHz cannot be generated")]
    UnsupportedClock { khz: u32 },
}

/// Everything the controller needs from the chip it runs on.
pub trait Board {
    type Pio: PioBlock;
    type Dma: DmaEngine;

    fn pio(&mut self, id: PioId) -> &mut Self::Pio;

    fn dma(&mut self) -> &mut Self::Dma;

    fn set_core_voltage(&mut self, voltage: CoreVoltage);

    fn set_sys_clock_khz(&mut self, khz: u32) -> Result<(), HalError>;

    fn sleep_ms(&mut self, ms: u32);

    /// One iteration of a busy-wait loop. Does no work on real hardware.
    fn tight_loop_contents(&mut self);
}
