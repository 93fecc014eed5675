use crate::bus::{BusLines, ControlLine, PinBinding, HIGH_ADDRESS_MASK, LOW_ADDRESS_MASK};
use crate::hal::pio::{INSTRUCTION_MEMORY_SIZE, STATE_MACHINES_PER_BLOCK};
use crate::hal::{HalError, PioBlock, PioId, Program, StateMachineId};
use crate::sim::queue::Fifo;
use crate::sim::BusFault;

/// What the output-enable toggler put on the data lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDrive {
    Fresh(u8),
    /// Nothing new was staged since the previous access; the old bits were driven again.
    Stale(u8),
}

impl DataDrive {
    pub fn value(self) -> u8 {
        match self {
            Self::Fresh(value) | Self::Stale(value) => value,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SimStateMachine {
    claimed: bool,
    enabled: bool,
    program: Option<(Program, u8)>,
    pins: Option<PinBinding>,
    tx: Fifo<u32>,
    rx: Fifo<u32>,
    // Low-address latcher: first word pulled after init is the seed, later ones are pages
    seed: Option<u32>,
    page: u32,
    // Data pusher
    staged: u8,
    fresh: bool,
}

impl SimStateMachine {
    fn reset(&mut self) {
        self.tx.clear();
        self.rx.clear();
        self.seed = None;
        self.page = 0;
        self.staged = 0;
        self.fresh = false;
    }

    fn absorb_tx(&mut self) -> usize {
        let mut pulled = 0;
        while let Some(word) = self.tx.pop_front() {
            if self.seed.is_none() {
                self.seed = Some(word);
            } else {
                self.page = word;
            }
            pulled += 1;
        }
        pulled
    }
}

/// Host model of one PIO block. Programs are symbolic; each one reacts to its strobe the way
/// its queue contract describes.
#[derive(Debug, Clone)]
pub struct SimPio {
    id: PioId,
    sms: [SimStateMachine; STATE_MACHINES_PER_BLOCK],
    loaded: Vec<(u8, Program)>,
}

impl SimPio {
    pub fn new(id: PioId) -> Self {
        Self {
            id,
            sms: std::array::from_fn(|_| SimStateMachine::default()),
            loaded: Vec::new(),
        }
    }

    /// Programs resident in instruction memory as `(offset, program)`, in load order.
    pub fn loaded_programs(&self) -> &[(u8, Program)] {
        &self.loaded
    }

    pub fn program_of(&self, sm: StateMachineId) -> Option<(Program, u8)> {
        self.sms[usize::from(sm.0)].program
    }

    pub fn tx_len(&self, sm: StateMachineId) -> usize {
        self.sms[usize::from(sm.0)].tx.len()
    }

    pub fn rx_len(&self, sm: StateMachineId) -> usize {
        self.sms[usize::from(sm.0)].rx.len()
    }

    pub(crate) fn is_tx_fifo_full(&self, sm: StateMachineId) -> bool {
        self.sms[usize::from(sm.0)].tx.is_full()
    }

    pub(crate) fn push_tx(&mut self, sm: StateMachineId, word: u32) -> Result<(), u32> {
        self.sms[usize::from(sm.0)].tx.push_back(word)
    }

    /// React to a control strobe with the given levels on the shared address lines and the
    /// data lines.
    pub(crate) fn strobe(
        &mut self,
        line: ControlLine,
        address_lines: u32,
        data_lines: u8,
        faults: &mut Vec<BusFault>,
    ) {
        for (i, sm) in self.sms.iter_mut().enumerate() {
            let Some((program, pins)) = running(&self.loaded, sm) else {
                continue;
            };
            if pins.strobe != Some(line) {
                continue;
            }

            let sample = match pins.lines {
                BusLines::Address => address_lines,
                BusLines::Data => u32::from(data_lines),
            };

            let word = match program {
                Program::HighAddressLatch => sample & HIGH_ADDRESS_MASK,
                Program::LowAddressLatch { window, .. } => {
                    sm.absorb_tx();
                    let Some(seed) = sm.seed else {
                        log::warn!("{} SM{i}: access latch before the latcher was seeded", self.id);
                        continue;
                    };
                    window.compose(seed, sm.page, sample)
                }
                Program::WriteCheck => sample & 0xFF,
                Program::WriteCheckAddress => sample & LOW_ADDRESS_MASK,
                Program::OutputEnableToggle | Program::PushDataBits => continue,
            };

            if sm.rx.push_back(word).is_err() {
                faults.push(BusFault::FifoOverflow {
                    pio: self.id,
                    sm: StateMachineId(i as u8),
                });
            }
        }
    }

    /// Output enable asserted. `None` if no toggler is running in this block.
    pub(crate) fn output_enable(&mut self) -> Option<DataDrive> {
        let toggler_running = self.sms.iter().any(|sm| {
            running(&self.loaded, sm).is_some_and(|(program, pins)| {
                program == Program::OutputEnableToggle
                    && pins.strobe == Some(ControlLine::OutputEnable)
            })
        });
        if !toggler_running {
            return None;
        }

        let loaded = &self.loaded;
        let pusher = self.sms.iter_mut().find(|sm| {
            running(loaded, sm).is_some_and(|(program, _)| program == Program::PushDataBits)
        })?;

        if pusher.fresh {
            pusher.fresh = false;
            Some(DataDrive::Fresh(pusher.staged))
        } else {
            Some(DataDrive::Stale(pusher.staged))
        }
    }

    /// Let free-running machines pull from their TX FIFOs. Returns the number of words moved.
    pub(crate) fn service(&mut self) -> usize {
        let mut moved = 0;

        for sm in &mut self.sms {
            let Some((program, _)) = running(&self.loaded, sm) else {
                continue;
            };

            match program {
                Program::LowAddressLatch { .. } => moved += sm.absorb_tx(),
                Program::PushDataBits => {
                    // The pins always hold the most recent byte
                    while let Some(word) = sm.tx.pop_front() {
                        sm.staged = word as u8;
                        sm.fresh = true;
                        moved += 1;
                    }
                }
                _ => {}
            }
        }

        moved
    }

    fn is_free(&self, offset: u8, len: u8) -> bool {
        let end = offset + len;
        end <= INSTRUCTION_MEMORY_SIZE
            && self
                .loaded
                .iter()
                .all(|&(o, program)| end <= o || o + program.len() <= offset)
    }
}

fn running(loaded: &[(u8, Program)], sm: &SimStateMachine) -> Option<(Program, PinBinding)> {
    if !sm.enabled {
        return None;
    }

    let (program, offset) = sm.program?;
    if !loaded.contains(&(offset, program)) {
        return None;
    }

    Some((program, sm.pins?))
}

impl PioBlock for SimPio {
    fn id(&self) -> PioId {
        self.id
    }

    fn claim_unused_sm(&mut self) -> Result<StateMachineId, HalError> {
        let (i, sm) = self
            .sms
            .iter_mut()
            .enumerate()
            .find(|(_, sm)| !sm.claimed)
            .ok_or(HalError::NoFreeStateMachine { pio: self.id })?;

        sm.claimed = true;
        Ok(StateMachineId(i as u8))
    }

    fn add_program(&mut self, program: Program) -> Result<u8, HalError> {
        let len = program.len();
        let offset = (0..=INSTRUCTION_MEMORY_SIZE.saturating_sub(len))
            .find(|&offset| self.is_free(offset, len))
            .ok_or(HalError::NoProgramSpace {
                pio: self.id,
                program,
            })?;

        self.loaded.push((offset, program));
        Ok(offset)
    }

    fn add_program_at_offset(&mut self, program: Program, offset: u8) -> Result<(), HalError> {
        if offset
            .checked_add(program.len())
            .map_or(true, |end| end > INSTRUCTION_MEMORY_SIZE)
        {
            return Err(HalError::NoProgramSpace {
                pio: self.id,
                program,
            });
        }

        if !self.is_free(offset, program.len()) {
            return Err(HalError::OffsetInUse {
                pio: self.id,
                program,
                offset,
            });
        }

        self.loaded.push((offset, program));
        Ok(())
    }

    fn remove_program(&mut self, program: Program, offset: u8) -> Result<(), HalError> {
        let Some(position) = self.loaded.iter().position(|&loaded| loaded == (offset, program))
        else {
            return Err(HalError::ProgramNotLoaded {
                pio: self.id,
                program,
                offset,
            });
        };

        self.loaded.remove(position);
        Ok(())
    }

    fn init_sm(&mut self, sm: StateMachineId, program: Program, offset: u8, pins: PinBinding) {
        if !self.loaded.contains(&(offset, program)) {
            log::warn!("{} {sm}: {program} is not resident at offset {offset}", self.id);
        }

        let state = &mut self.sms[usize::from(sm.0)];
        state.reset();
        state.program = Some((program, offset));
        state.pins = Some(pins);
        state.enabled = true;
    }

    fn set_enabled(&mut self, sm: StateMachineId, enabled: bool) {
        self.sms[usize::from(sm.0)].enabled = enabled;
    }

    fn is_enabled(&self, sm: StateMachineId) -> bool {
        self.sms[usize::from(sm.0)].enabled
    }

    fn put(&mut self, sm: StateMachineId, word: u32) -> Result<(), HalError> {
        self.sms[usize::from(sm.0)]
            .tx
            .push_back(word)
            .map_err(|_| HalError::TxFifoFull { pio: self.id, sm })
    }

    fn get(&mut self, sm: StateMachineId) -> Option<u32> {
        self.sms[usize::from(sm.0)].rx.pop_front()
    }

    fn is_rx_fifo_empty(&self, sm: StateMachineId) -> bool {
        self.sms[usize::from(sm.0)].rx.is_empty()
    }
}
