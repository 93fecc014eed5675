use crate::config::CartLayout;
use crate::controller::{BootState, Controller};
use crate::pipeline::PipelineError;
use crate::sim::{BusFault, ServedRead, SimBoard};
use crate::startup::StartupError;
use crate::trace::TraceError;
use std::fmt::Formatter;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("error starting simulation: {source}")]
    Startup {
        #[from]
        source: StartupError,
    },
    #[error("bus pipeline error: {source}")]
    Pipeline {
        #[from]
        source: PipelineError,
    },
    #[error("error saving bus trace: {source}")]
    Trace {
        #[from]
        source: TraceError,
    },
    #[error("controller still in {state} after {max_spins} spins")]
    SpinLimit { max_spins: u64, state: BootState },
}

/// A console read whose byte differs from the image that should have been mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMismatch {
    pub epoch: u32,
    pub address: u32,
    pub expected: Option<u8>,
    pub actual: u8,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub final_state: BootState,
    pub selected_slot: Option<u8>,
    pub serving_address: Option<u32>,
    pub spins: u64,
    pub reads_served: usize,
    /// Reads between the retarget and the next console reset, which map to no defined image.
    pub reads_unverified: usize,
    pub mismatches: Vec<ReadMismatch>,
    pub faults: Vec<BusFault>,
    pub ignored_writes: u64,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty() && self.faults.is_empty()
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "final state: {}", self.final_state)?;
        match self.selected_slot {
            Some(slot) => writeln!(f, "selected slot: {slot}")?,
            None => writeln!(f, "selected slot: <None>")?,
        }
        if let Some(address) = self.serving_address {
            writeln!(f, "serving from: {address:#010X}")?;
        }
        writeln!(f, "spins: {}", self.spins)?;
        writeln!(
            f,
            "reads served: {} ({} unverified)",
            self.reads_served, self.reads_unverified
        )?;
        writeln!(f, "ignored writes: {}", self.ignored_writes)?;
        writeln!(f, "mismatches: {}", self.mismatches.len())?;
        for mismatch in self.mismatches.iter().take(10) {
            writeln!(
                f,
                "  {:06X}: expected {:02X?}, read {:02X}",
                mismatch.address, mismatch.expected, mismatch.actual
            )?;
        }
        writeln!(f, "bus faults: {}", self.faults.len())?;
        for fault in self.faults.iter().take(10) {
            writeln!(f, "  {fault}")?;
        }

        Ok(())
    }
}

/// Where the retarget landed relative to the console's reads.
#[derive(Debug, Clone, Copy)]
struct RetargetPoint {
    epoch: u32,
    read_index: usize,
}

/// Step the controller until the board's script has played out and the controller is waiting
/// on the console, then check every served byte against the image that should be mapped.
pub fn run(
    controller: &mut Controller,
    board: &mut SimBoard,
    max_spins: u64,
) -> Result<RunSummary, RunError> {
    let mut retarget = None;

    loop {
        let state = controller.step(board)?;

        if retarget.is_none() && controller.selected_slot().is_some() {
            retarget = Some(RetargetPoint {
                epoch: board.epoch(),
                read_index: board.served().len(),
            });
        }

        let waiting = matches!(
            state,
            BootState::AwaitingSelect | BootState::DirectServing
        );
        if waiting && board.is_script_finished() {
            break;
        }

        if board.spins() >= max_spins {
            return Err(RunError::SpinLimit { max_spins, state });
        }
    }

    Ok(summarize(controller, board, retarget))
}

fn summarize(
    controller: &Controller,
    board: &SimBoard,
    retarget: Option<RetargetPoint>,
) -> RunSummary {
    let config = controller.config();
    let store = controller.store();
    let fabric = board.fabric();

    let menu = config
        .menu_window()
        .map(|window| (config.menu_image_address(store), window.size()))
        .ok();
    let selected = controller
        .selected_slot()
        .and_then(|slot| store.target_address(slot).ok())
        .map(|address| (address, store.slot_size()));
    let direct = (store.base(), store.slot_size());

    let mut mismatches = Vec::new();
    let mut reads_unverified = 0;

    for (i, read) in board.served().iter().enumerate() {
        let mapping = match (config.layout, retarget) {
            (CartLayout::Single, _) => Some(direct),
            (CartLayout::Multi, Some(point)) if i >= point.read_index => {
                if read.epoch > point.epoch {
                    selected
                } else {
                    None
                }
            }
            (CartLayout::Multi, _) => menu,
        };

        let Some((image_address, window_size)) = mapping else {
            reads_unverified += 1;
            continue;
        };

        let expected = fabric.expected_byte(image_address, window_size, read.address);
        if expected != Some(read.value) {
            mismatches.push(mismatch(read, expected));
        }
    }

    if !mismatches.is_empty() {
        log::warn!("{} reads did not match the mapped image", mismatches.len());
    }

    RunSummary {
        final_state: controller.state(),
        selected_slot: controller.selected_slot(),
        serving_address: controller.serving_address(),
        spins: board.spins(),
        reads_served: board.served().len(),
        reads_unverified,
        mismatches,
        faults: fabric.faults().to_vec(),
        ignored_writes: controller.ignored_writes(),
    }
}

fn mismatch(read: &ServedRead, expected: Option<u8>) -> ReadMismatch {
    ReadMismatch {
        epoch: read.epoch,
        address: read.address,
        expected,
        actual: read.value,
    }
}
