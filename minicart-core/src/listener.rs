use crate::bus::{BusLines, ControlLine, PinBinding};
use crate::hal::{Board, HalError, PioBlock, PioId, Program};
use crate::machines::BusMachine;

/// One write strobe as seen by the listener pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// A write to the sentinel address; the data byte is the selected slot.
    Selection { slot: u8 },
    /// Any other write on the bus.
    Ignored { address: Option<u32>, value: u8 },
}

/// Two state machines snooping the write strobe: one reports the data lines, the other the
/// low address lines. Both see every strobe, so their outputs pair up one to one.
#[derive(Debug, Clone)]
pub struct SlotSelectListener {
    data: BusMachine,
    address: BusMachine,
    sentinel: u32,
    armed: bool,
}

impl SlotSelectListener {
    pub fn arm<B: Board>(board: &mut B, pio_id: PioId, sentinel: u32) -> Result<Self, HalError> {
        let pio = board.pio(pio_id);

        let data = BusMachine::load(
            pio,
            Program::WriteCheck,
            PinBinding::new(BusLines::Data, ControlLine::WriteStrobe),
        )?;
        data.start(pio);

        let address = BusMachine::load(
            pio,
            Program::WriteCheckAddress,
            PinBinding::new(BusLines::Address, ControlLine::WriteStrobe),
        )?;
        address.start(pio);

        log::info!("slot select listener armed, sentinel address {sentinel:#05X}");

        Ok(Self {
            data,
            address,
            sentinel,
            armed: true,
        })
    }

    pub fn pio(&self) -> PioId {
        self.data.pio()
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Take the next captured write, if any. Never blocks.
    pub fn poll<P: PioBlock>(&mut self, pio: &mut P) -> Option<Capture> {
        if !self.armed || !self.data.has_output(pio) {
            return None;
        }

        let value = self.data.pop(pio)? as u8;
        let address = self.address.pop(pio);

        let capture = if address == Some(self.sentinel) {
            Capture::Selection { slot: value }
        } else {
            Capture::Ignored { address, value }
        };

        log::trace!("listener captured {capture:?}");

        Some(capture)
    }

    pub fn disarm<P: PioBlock>(&mut self, pio: &mut P) {
        self.data.stop(pio);
        self.address.stop(pio);
        self.armed = false;

        log::info!("slot select listener disarmed");
    }

    pub fn machines(&self) -> [&BusMachine; 2] {
        [&self.data, &self.address]
    }
}
