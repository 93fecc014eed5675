use crate::bus::{split_address, ControlLine};
use crate::sim::Fabric;

/// What the console sees when nothing drives the data lines.
pub const FLOATING_BUS: u8 = 0xFF;

/// The console side of the cartridge bus. It only re-latches the page when the high part of
/// the address changes, so consecutive accesses within a 1 KiB page cost a single strobe.
#[derive(Debug, Clone, Default)]
pub struct Console {
    latched_page: Option<u32>,
    page_latches: u64,
}

impl Console {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latched_page(&self) -> Option<u32> {
        self.latched_page
    }

    pub fn page_latches(&self) -> u64 {
        self.page_latches
    }

    pub fn read(&mut self, fabric: &mut Fabric, address: u32) -> u8 {
        let low = self.latch(fabric, address);
        fabric.strobe(ControlLine::AccessLatch, low, 0);

        fabric.output_enable().unwrap_or(FLOATING_BUS)
    }

    pub fn write(&mut self, fabric: &mut Fabric, address: u32, value: u8) {
        let low = self.latch(fabric, address);
        fabric.strobe(ControlLine::AccessLatch, low, 0);
        fabric.strobe(ControlLine::WriteStrobe, low, value);
    }

    /// Forget the latched page; the next access always starts with a page latch.
    pub fn reset(&mut self) {
        self.latched_page = None;
    }

    fn latch(&mut self, fabric: &mut Fabric, address: u32) -> u32 {
        let (high, low) = split_address(address);

        if self.latched_page != Some(high) {
            fabric.strobe(ControlLine::PageLatch, high, 0);
            self.latched_page = Some(high);
            self.page_latches += 1;
        }

        low
    }
}
