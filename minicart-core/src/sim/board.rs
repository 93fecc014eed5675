use crate::bus::BusEvent;
use crate::config::CoreVoltage;
use crate::hal::{Board, HalError, PioId};
use crate::sim::{Console, Fabric, Flash, SimDma, SimPio};
use std::collections::VecDeque;

pub const MIN_SYS_CLOCK_KHZ: u32 = 10_000;
pub const MAX_SYS_CLOCK_KHZ: u32 = 300_000;

/// One console read and the byte that was on the data lines. `epoch` counts console resets
/// before the read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServedRead {
    pub epoch: u32,
    pub address: u32,
    pub value: u8,
}

/// A host board: the fabric plus a console that performs one scripted bus operation per
/// controller spin.
#[derive(Debug, Clone)]
pub struct SimBoard {
    fabric: Fabric,
    console: Console,
    script: VecDeque<BusEvent>,
    history: Vec<BusEvent>,
    idle_remaining: u32,
    served: Vec<ServedRead>,
    epoch: u32,
    spins: u64,
    slept_ms: u64,
    core_voltage: Option<CoreVoltage>,
    sys_clock_khz: Option<u32>,
}

impl SimBoard {
    pub fn new(flash: Flash) -> Self {
        Self {
            fabric: Fabric::new(flash),
            console: Console::new(),
            script: VecDeque::new(),
            history: Vec::new(),
            idle_remaining: 0,
            served: Vec::new(),
            epoch: 0,
            spins: 0,
            slept_ms: 0,
            core_voltage: None,
            sys_clock_khz: None,
        }
    }

    /// Queue bus operations behind whatever is already scripted.
    pub fn script<I>(&mut self, events: I)
    where
        I: IntoIterator<Item = BusEvent>,
    {
        self.script.extend(events);
    }

    pub fn is_script_finished(&self) -> bool {
        self.script.is_empty() && self.idle_remaining == 0
    }

    /// Perform one bus operation immediately, bypassing the script.
    pub fn apply(&mut self, event: BusEvent) {
        log::trace!("console: {event}");

        match event {
            BusEvent::Read { address } => {
                let value = self.console.read(&mut self.fabric, address);
                self.served.push(ServedRead {
                    epoch: self.epoch,
                    address,
                    value,
                });
            }
            BusEvent::Write { address, value } => {
                self.console.write(&mut self.fabric, address, value);
            }
            BusEvent::Reset => {
                self.console.reset();
                self.epoch += 1;
                log::debug!("console reset, epoch {}", self.epoch);
            }
            BusEvent::Idle { cycles } => {
                self.idle_remaining = cycles;
            }
        }

        self.history.push(event);
    }

    pub fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    pub fn fabric_mut(&mut self) -> &mut Fabric {
        &mut self.fabric
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    pub fn served(&self) -> &[ServedRead] {
        &self.served
    }

    pub fn take_served(&mut self) -> Vec<ServedRead> {
        std::mem::take(&mut self.served)
    }

    /// Every bus operation performed so far, in order.
    pub fn history(&self) -> &[BusEvent] {
        &self.history
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn spins(&self) -> u64 {
        self.spins
    }

    pub fn slept_ms(&self) -> u64 {
        self.slept_ms
    }

    pub fn core_voltage(&self) -> Option<CoreVoltage> {
        self.core_voltage
    }

    pub fn sys_clock_khz(&self) -> Option<u32> {
        self.sys_clock_khz
    }
}

impl Board for SimBoard {
    type Pio = SimPio;
    type Dma = SimDma;

    fn pio(&mut self, id: PioId) -> &mut Self::Pio {
        self.fabric.pio_mut(id)
    }

    fn dma(&mut self) -> &mut Self::Dma {
        self.fabric.dma_mut()
    }

    fn set_core_voltage(&mut self, voltage: CoreVoltage) {
        log::debug!("core voltage set to {voltage}");
        self.core_voltage = Some(voltage);
    }

    fn set_sys_clock_khz(&mut self, khz: u32) -> Result<(), HalError> {
        if !(MIN_SYS_CLOCK_KHZ..=MAX_SYS_CLOCK_KHZ).contains(&khz) {
            return Err(HalError::UnsupportedClock { khz });
        }

        log::debug!("system clock set to {khz} kHz");
        self.sys_clock_khz = Some(khz);

        Ok(())
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.slept_ms += u64::from(ms);
    }

    fn tight_loop_contents(&mut self) {
        self.spins += 1;
        self.fabric.settle();

        if self.idle_remaining > 0 {
            self.idle_remaining -= 1;
            return;
        }

        if let Some(event) = self.script.pop_front() {
            self.apply(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_events_one_per_spin() {
        let mut board = SimBoard::new(Flash::new(0x1000));
        board.script([
            BusEvent::Read { address: 0x10 },
            BusEvent::Idle { cycles: 2 },
            BusEvent::Reset,
            BusEvent::Read { address: 0x11 },
        ]);

        board.tight_loop_contents();
        assert_eq!(1, board.served().len());

        // The idle event itself plus two idle spins
        for _ in 0..3 {
            board.tight_loop_contents();
        }
        assert_eq!(0, board.epoch());

        board.tight_loop_contents();
        assert_eq!(1, board.epoch());
        assert!(!board.is_script_finished());

        board.tight_loop_contents();
        assert!(board.is_script_finished());
        assert_eq!(
            vec![
                ServedRead {
                    epoch: 0,
                    address: 0x10,
                    value: 0xFF
                },
                ServedRead {
                    epoch: 1,
                    address: 0x11,
                    value: 0xFF
                },
            ],
            board.served()
        );
        assert_eq!(4, board.history().len());
        assert_eq!(6, board.spins());
    }

    #[test]
    fn clock_range_checked() {
        let mut board = SimBoard::new(Flash::new(0x1000));

        assert_eq!(
            Err(HalError::UnsupportedClock { khz: 400_000 }),
            board.set_sys_clock_khz(400_000)
        );
        assert_eq!(None, board.sys_clock_khz());

        board.set_sys_clock_khz(240_000).unwrap();
        assert_eq!(Some(240_000), board.sys_clock_khz());
    }
}
