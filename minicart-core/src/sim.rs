//! Host-side model of the controller and the console bus, used by the tests and by the CLI's
//! `run` command. Nothing here runs on the cartridge.

mod board;
mod console;
mod dma;
mod pio;
mod queue;

use crate::bus::{ControlLine, LOW_ADDRESS_BITS};
use crate::hal::{ChannelId, PioId, StateMachineId, TransferSize};
use crate::memory;
use std::fmt::Formatter;
use thiserror::Error;

pub use board::{ServedRead, SimBoard};
pub use console::Console;
pub use dma::SimDma;
pub use pio::{DataDrive, SimPio};

/// A bus-level misbehavior observed by the fabric. Any of these on real hardware means the
/// console read garbage or hung.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    /// Output enable asserted with nothing new staged by the data pusher; the ring fell behind.
    StaleData { address: u32 },
    /// A DMA channel touched an address outside flash, or tried to write flash.
    UnmappedAccess { channel: ChannelId, address: u32 },
    /// A state machine produced a word while its FIFO was full and the word was lost.
    FifoOverflow { pio: PioId, sm: StateMachineId },
}

impl std::fmt::Display for BusFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StaleData { address } => {
                write!(f, "stale data driven for console address {address:06X}")
            }
            Self::UnmappedAccess { channel, address } => {
                write!(f, "{channel} accessed unmapped address {address:#010X}")
            }
            Self::FifoOverflow { pio, sm } => write!(f, "{pio} {sm} FIFO overflow"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlashError {
    #[error("{len} bytes at offset {offset:#X} do not fit in {size:#X} bytes of flash")]
    OutOfBounds { offset: u32, len: usize, size: usize },
}

/// Controller flash, reachable through both XIP aliases. Erased flash reads as `0xFF`.
#[derive(Debug, Clone)]
pub struct Flash {
    data: Vec<u8>,
}

impl Flash {
    pub fn new(size: u32) -> Self {
        Self {
            data: vec![0xFF; size as usize],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn load(&mut self, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        let start = offset as usize;
        let Some(dest) = self.data.get_mut(start..start + bytes.len()) else {
            return Err(FlashError::OutOfBounds {
                offset,
                len: bytes.len(),
                size: self.data.len(),
            });
        };

        dest.copy_from_slice(bytes);
        Ok(())
    }

    pub fn read_byte(&self, address: u32) -> Option<u8> {
        let offset = memory::flash_offset(address)?;
        self.data.get(offset as usize).copied()
    }

    /// Little-endian read of one transfer unit.
    pub fn read(&self, address: u32, size: TransferSize) -> Option<u32> {
        let len = match size {
            TransferSize::Byte => 1,
            TransferSize::HalfWord => 2,
            TransferSize::Word => 4,
        };

        (0..len).rev().try_fold(0_u32, |value, i| {
            let byte = self.read_byte(address.checked_add(i)?)?;
            Some((value << 8) | u32::from(byte))
        })
    }
}

/// Both PIO blocks, the DMA engine and flash, wired together the way the bus pipeline expects.
#[derive(Debug, Clone)]
pub struct Fabric {
    pios: [SimPio; 2],
    dma: SimDma,
    flash: Flash,
    faults: Vec<BusFault>,
    address_lines: (u32, u32),
}

/// Bound on service/DMA rounds after one strobe.
const SETTLE_ROUNDS: usize = 64;

impl Fabric {
    pub fn new(flash: Flash) -> Self {
        Self {
            pios: [SimPio::new(PioId::Pio0), SimPio::new(PioId::Pio1)],
            dma: SimDma::new(),
            flash,
            faults: Vec::new(),
            address_lines: (0, 0),
        }
    }

    pub fn pio(&self, id: PioId) -> &SimPio {
        &self.pios[id.index()]
    }

    pub fn pio_mut(&mut self, id: PioId) -> &mut SimPio {
        &mut self.pios[id.index()]
    }

    pub fn dma(&self) -> &SimDma {
        &self.dma
    }

    pub fn dma_mut(&mut self) -> &mut SimDma {
        &mut self.dma
    }

    pub fn flash(&self) -> &Flash {
        &self.flash
    }

    pub fn faults(&self) -> &[BusFault] {
        &self.faults
    }

    pub fn take_faults(&mut self) -> Vec<BusFault> {
        std::mem::take(&mut self.faults)
    }

    /// Pulse `line` with the given levels on the shared address lines and the data lines, then
    /// let the state machines and DMA settle.
    pub fn strobe(&mut self, line: ControlLine, address_lines: u32, data_lines: u8) {
        log::trace!("{line} strobe, address lines {address_lines:03X}, data {data_lines:02X}");

        match line {
            ControlLine::PageLatch => self.address_lines.0 = address_lines,
            ControlLine::AccessLatch => self.address_lines.1 = address_lines,
            _ => {}
        }

        for pio in &mut self.pios {
            pio.strobe(line, address_lines, data_lines, &mut self.faults);
        }

        self.settle();
    }

    /// Assert output enable and return what ends up on the data lines, `None` if nothing
    /// drives them.
    pub fn output_enable(&mut self) -> Option<u8> {
        self.settle();

        let drive = self.pios.iter_mut().find_map(SimPio::output_enable)?;
        if let DataDrive::Stale(_) = drive {
            let (high, low) = self.address_lines;
            let address = (high << LOW_ADDRESS_BITS) | low;
            log::warn!("stale data on read of {address:06X}");
            self.faults.push(BusFault::StaleData { address });
        }

        Some(drive.value())
    }

    /// Run free-running machines and DMA until nothing moves.
    pub fn settle(&mut self) {
        for _ in 0..SETTLE_ROUNDS {
            let mut moved = 0;
            for pio in &mut self.pios {
                moved += pio.service();
            }
            moved += self.dma.run(&mut self.pios, &self.flash, &mut self.faults);

            if moved == 0 {
                return;
            }
        }

        log::warn!("fabric did not settle after {SETTLE_ROUNDS} rounds");
    }

    /// Expected byte for a console read of `address` from a window of `window_size` bytes
    /// based at `image_address`.
    pub fn expected_byte(&self, image_address: u32, window_size: u32, address: u32) -> Option<u8> {
        let offset = address & (window_size - 1);
        self.flash
            .read_byte(memory::uncached_alias(image_address) + offset)
    }
}
