use crate::hal::pio::{Dreq, PioId, StateMachineId};
use crate::hal::HalError;
use std::fmt::Formatter;

pub const CHANNEL_COUNT: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u8);

impl ChannelId {
    pub fn mask(self) -> u32 {
        1 << self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "DMA{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferSize {
    Byte,
    HalfWord,
    Word,
}

/// Something a DMA channel reads from or writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    PioTxFifo { pio: PioId, sm: StateMachineId },
    PioRxFifo { pio: PioId, sm: StateMachineId },
    /// The read address register of another channel, aliased so that writing it also
    /// triggers that channel.
    ReadAddressTrigger(ChannelId),
    Memory(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub transfer_size: TransferSize,
    pub read_increment: bool,
    pub write_increment: bool,
    pub dreq: Dreq,
    /// Channel triggered when this one completes its transfer count.
    pub chain_to: Option<ChannelId>,
    pub high_priority: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            transfer_size: TransferSize::Word,
            read_increment: true,
            write_increment: false,
            dreq: Dreq::Permanent,
            chain_to: None,
            high_priority: false,
        }
    }
}

pub trait DmaEngine {
    fn claim_unused_channel(&mut self) -> Result<ChannelId, HalError>;

    fn configure(
        &mut self,
        channel: ChannelId,
        config: ChannelConfig,
        write: Endpoint,
        read: Endpoint,
        transfer_count: u32,
        start: bool,
    );

    fn start_channel_mask(&mut self, mask: u32);
}
