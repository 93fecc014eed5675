use crate::bus::PinBinding;
use crate::hal::{Dreq, Endpoint, HalError, PioBlock, PioId, Program, StateMachineId};

/// A claimed state machine whose program is resident in its block's instruction memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusMachine {
    pio: PioId,
    sm: StateMachineId,
    program: Program,
    offset: u8,
    pins: PinBinding,
}

impl BusMachine {
    /// Claim a state machine and load `program`. The machine is not started until
    /// [`BusMachine::start`].
    pub fn load<P: PioBlock>(
        pio: &mut P,
        program: Program,
        pins: PinBinding,
    ) -> Result<Self, HalError> {
        let sm = pio.claim_unused_sm()?;
        let offset = pio.add_program(program)?;

        log::debug!("{} {sm}: loaded {program} at offset {offset}", pio.id());

        Ok(Self {
            pio: pio.id(),
            sm,
            program,
            offset,
            pins,
        })
    }

    pub fn pio(&self) -> PioId {
        self.pio
    }

    pub fn sm(&self) -> StateMachineId {
        self.sm
    }

    pub fn program(&self) -> Program {
        self.program
    }

    pub fn offset(&self) -> u8 {
        self.offset
    }

    pub fn start<P: PioBlock>(&self, pio: &mut P) {
        pio.init_sm(self.sm, self.program, self.offset, self.pins);
    }

    pub fn stop<P: PioBlock>(&self, pio: &mut P) {
        pio.set_enabled(self.sm, false);
    }

    pub fn push<P: PioBlock>(&self, pio: &mut P, word: u32) -> Result<(), HalError> {
        pio.put(self.sm, word)
    }

    pub fn pop<P: PioBlock>(&self, pio: &mut P) -> Option<u32> {
        pio.get(self.sm)
    }

    pub fn has_output<P: PioBlock>(&self, pio: &P) -> bool {
        !pio.is_rx_fifo_empty(self.sm)
    }

    pub fn output_ready(&self) -> Dreq {
        Dreq::PioRx {
            pio: self.pio,
            sm: self.sm,
        }
    }

    pub fn input_queue(&self) -> Endpoint {
        Endpoint::PioTxFifo {
            pio: self.pio,
            sm: self.sm,
        }
    }

    pub fn output_queue(&self) -> Endpoint {
        Endpoint::PioRxFifo {
            pio: self.pio,
            sm: self.sm,
        }
    }

    /// Replace the running program with `program` at the same offset and restart the machine.
    ///
    /// Stop, unload, load and reinitialize happen back to back; nothing else may touch this
    /// machine in between. If the new program cannot be placed, the old one is put back and
    /// restarted before the error is returned.
    pub fn swap_program<P: PioBlock>(
        &mut self,
        pio: &mut P,
        program: Program,
    ) -> Result<(), HalError> {
        self.stop(pio);
        pio.remove_program(self.program, self.offset)?;

        if let Err(err) = pio.add_program_at_offset(program, self.offset) {
            pio.add_program_at_offset(self.program, self.offset)?;
            self.start(pio);
            return Err(err);
        }

        log::debug!(
            "{} {}: swapped {} for {program} at offset {}",
            self.pio,
            self.sm,
            self.program,
            self.offset
        );

        self.program = program;
        self.start(pio);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusLines, ControlLine};
    use crate::memory::AddressWindow;
    use crate::pipeline::PipelineMode;
    use crate::sim::SimPio;

    fn low_latch(mode: PipelineMode) -> Program {
        Program::LowAddressLatch {
            mode,
            window: AddressWindow::from_size(16 * 1024).unwrap(),
        }
    }

    #[test]
    fn swap_keeps_offset() {
        let mut pio = SimPio::new(PioId::Pio0);
        let pins = PinBinding::new(BusLines::Address, ControlLine::AccessLatch);

        let mut machine =
            BusMachine::load(&mut pio, low_latch(PipelineMode::MenuAddressing), pins).unwrap();
        let other = BusMachine::load(&mut pio, Program::HighAddressLatch, pins).unwrap();
        machine.start(&mut pio);

        machine
            .swap_program(&mut pio, low_latch(PipelineMode::DirectAddressing))
            .unwrap();

        assert_eq!(0, machine.offset());
        assert_eq!(low_latch(PipelineMode::DirectAddressing), machine.program());
        assert_eq!(Some((machine.program(), 0)), pio.program_of(machine.sm()));
        assert!(pio.is_enabled(machine.sm()));
        assert_eq!(7, other.offset());
    }

    #[test]
    fn failed_swap_restores_old_program() {
        let mut pio = SimPio::new(PioId::Pio0);
        let pins = PinBinding::new(BusLines::Data, ControlLine::WriteStrobe);

        let mut machine = BusMachine::load(&mut pio, Program::WriteCheck, pins).unwrap();
        BusMachine::load(&mut pio, Program::WriteCheckAddress, pins).unwrap();
        machine.start(&mut pio);

        // Seven words at offset 0 would run into the program loaded at offset 4
        let replacement = low_latch(PipelineMode::DirectAddressing);
        assert_eq!(
            Err(HalError::OffsetInUse {
                pio: PioId::Pio0,
                program: replacement,
                offset: 0
            }),
            machine.swap_program(&mut pio, replacement)
        );

        assert_eq!(Program::WriteCheck, machine.program());
        assert!(pio.loaded_programs().contains(&(0, Program::WriteCheck)));
        assert_eq!(Some((Program::WriteCheck, 0)), pio.program_of(machine.sm()));
        assert!(pio.is_enabled(machine.sm()));
    }

    #[test]
    fn swap_of_unloaded_program_fails() {
        let mut pio = SimPio::new(PioId::Pio1);
        let pins = PinBinding::free_running(BusLines::Data);

        let mut machine = BusMachine::load(&mut pio, Program::PushDataBits, pins).unwrap();
        pio.remove_program(Program::PushDataBits, 0).unwrap();

        assert_eq!(
            Err(HalError::ProgramNotLoaded {
                pio: PioId::Pio1,
                program: Program::PushDataBits,
                offset: 0
            }),
            machine.swap_program(&mut pio, Program::OutputEnableToggle)
        );
    }
}
