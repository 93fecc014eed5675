use crate::hal::dma::CHANNEL_COUNT;
use crate::hal::{
    ChannelConfig, ChannelId, DmaEngine, Dreq, Endpoint, HalError, PioBlock, TransferSize,
};
use crate::sim::pio::SimPio;
use crate::sim::{BusFault, Flash};

/// Upper bound on transfers in one `run`; the ring moves three words per access.
const MAX_TRANSFERS_PER_RUN: usize = 4096;

#[derive(Debug, Clone)]
struct SimChannel {
    claimed: bool,
    config: ChannelConfig,
    write: Endpoint,
    read: Endpoint,
    transfer_count: u32,
    remaining: u32,
    busy: bool,
}

impl Default for SimChannel {
    fn default() -> Self {
        Self {
            claimed: false,
            config: ChannelConfig::default(),
            write: Endpoint::Memory(0),
            read: Endpoint::Memory(0),
            transfer_count: 0,
            remaining: 0,
            busy: false,
        }
    }
}

fn transfer_bytes(size: TransferSize) -> u32 {
    match size {
        TransferSize::Byte => 1,
        TransferSize::HalfWord => 2,
        TransferSize::Word => 4,
    }
}

fn truncate(value: u32, size: TransferSize) -> u32 {
    match size {
        TransferSize::Byte => value & 0xFF,
        TransferSize::HalfWord => value & 0xFFFF,
        TransferSize::Word => value,
    }
}

/// Host model of the DMA engine. Channels only move data when [`SimDma::run`] is called by
/// the fabric, which happens after every bus strobe.
#[derive(Debug, Clone)]
pub struct SimDma {
    channels: [SimChannel; CHANNEL_COUNT as usize],
    completions: Vec<ChannelId>,
    log_completions: bool,
}

impl SimDma {
    pub fn new() -> Self {
        Self {
            channels: std::array::from_fn(|_| SimChannel::default()),
            completions: Vec::new(),
            log_completions: false,
        }
    }

    pub fn is_busy(&self, channel: ChannelId) -> bool {
        self.channels[usize::from(channel.0)].busy
    }

    /// Current read endpoint of `channel`; for the data channel this is the last composed
    /// address.
    pub fn read_endpoint(&self, channel: ChannelId) -> Endpoint {
        self.channels[usize::from(channel.0)].read
    }

    /// Record every channel completion from now on. Off by default.
    pub fn set_completion_log(&mut self, enabled: bool) {
        self.log_completions = enabled;
        if !enabled {
            self.completions.clear();
        }
    }

    pub fn completions(&self) -> &[ChannelId] {
        &self.completions
    }

    pub fn take_completions(&mut self) -> Vec<ChannelId> {
        std::mem::take(&mut self.completions)
    }

    /// Run every channel that can make progress until none can. Returns the number of
    /// transfers performed.
    pub(crate) fn run(
        &mut self,
        pios: &mut [SimPio; 2],
        flash: &Flash,
        faults: &mut Vec<BusFault>,
    ) -> usize {
        let mut transfers = 0;

        while let Some(channel) = self.next_ready(pios) {
            self.transfer(channel, pios, flash, faults);

            transfers += 1;
            if transfers == MAX_TRANSFERS_PER_RUN {
                log::warn!("DMA did not quiesce after {transfers} transfers");
                break;
            }
        }

        transfers
    }

    fn next_ready(&self, pios: &[SimPio; 2]) -> Option<ChannelId> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, channel)| channel.busy && is_ready(channel, pios))
            .min_by_key(|&(i, channel)| (!channel.config.high_priority, i))
            .map(|(i, _)| ChannelId(i as u8))
    }

    fn transfer(
        &mut self,
        channel_id: ChannelId,
        pios: &mut [SimPio; 2],
        flash: &Flash,
        faults: &mut Vec<BusFault>,
    ) {
        let channel = &self.channels[usize::from(channel_id.0)];
        let size = channel.config.transfer_size;
        let (read, write) = (channel.read, channel.write);

        let value = match read {
            Endpoint::PioRxFifo { pio, sm } => pios[pio.index()].get(sm).unwrap_or(0),
            Endpoint::Memory(address) => flash.read(address, size).unwrap_or_else(|| {
                faults.push(BusFault::UnmappedAccess {
                    channel: channel_id,
                    address,
                });
                u32::MAX
            }),
            Endpoint::PioTxFifo { .. } | Endpoint::ReadAddressTrigger(_) => {
                log::warn!("{channel_id}: {read:?} is not readable");
                0
            }
        };
        let value = truncate(value, size);

        match write {
            Endpoint::PioTxFifo { pio, sm } => {
                if pios[pio.index()].push_tx(sm, value).is_err() {
                    faults.push(BusFault::FifoOverflow { pio, sm });
                }
            }
            Endpoint::ReadAddressTrigger(target) => {
                self.channels[usize::from(target.0)].read = Endpoint::Memory(value);
                self.trigger(target);
            }
            Endpoint::Memory(address) => {
                // Flash is the only memory on the map and it is read-only
                faults.push(BusFault::UnmappedAccess {
                    channel: channel_id,
                    address,
                });
            }
            Endpoint::PioRxFifo { .. } => {
                log::warn!("{channel_id}: {write:?} is not writable");
            }
        }

        let channel = &mut self.channels[usize::from(channel_id.0)];
        if channel.config.read_increment {
            if let Endpoint::Memory(address) = &mut channel.read {
                *address = address.wrapping_add(transfer_bytes(size));
            }
        }
        if channel.config.write_increment {
            if let Endpoint::Memory(address) = &mut channel.write {
                *address = address.wrapping_add(transfer_bytes(size));
            }
        }

        channel.remaining -= 1;
        if channel.remaining == 0 {
            channel.busy = false;
            let chain_to = channel.config.chain_to;

            if self.log_completions {
                self.completions.push(channel_id);
            }

            if let Some(next) = chain_to {
                self.trigger(next);
            }
        }
    }

    fn trigger(&mut self, channel_id: ChannelId) {
        let channel = &mut self.channels[usize::from(channel_id.0)];
        channel.remaining = channel.transfer_count;
        channel.busy = channel.transfer_count > 0;

        log::trace!("{channel_id} triggered");
    }
}

impl Default for SimDma {
    fn default() -> Self {
        Self::new()
    }
}

fn is_ready(channel: &SimChannel, pios: &[SimPio; 2]) -> bool {
    let paced = match channel.config.dreq {
        Dreq::PioRx { pio, sm } => !pios[pio.index()].is_rx_fifo_empty(sm),
        Dreq::PioTx { pio, sm } => !pios[pio.index()].is_tx_fifo_full(sm),
        Dreq::Permanent => true,
    };

    let readable = match channel.read {
        Endpoint::PioRxFifo { pio, sm } => !pios[pio.index()].is_rx_fifo_empty(sm),
        _ => true,
    };

    let writable = match channel.write {
        Endpoint::PioTxFifo { pio, sm } => !pios[pio.index()].is_tx_fifo_full(sm),
        _ => true,
    };

    paced && readable && writable
}

impl DmaEngine for SimDma {
    fn claim_unused_channel(&mut self) -> Result<ChannelId, HalError> {
        let (i, channel) = self
            .channels
            .iter_mut()
            .enumerate()
            .find(|(_, channel)| !channel.claimed)
            .ok_or(HalError::NoFreeChannel)?;

        channel.claimed = true;
        Ok(ChannelId(i as u8))
    }

    fn configure(
        &mut self,
        channel: ChannelId,
        config: ChannelConfig,
        write: Endpoint,
        read: Endpoint,
        transfer_count: u32,
        start: bool,
    ) {
        let state = &mut self.channels[usize::from(channel.0)];
        state.config = config;
        state.write = write;
        state.read = read;
        state.transfer_count = transfer_count;
        state.remaining = 0;
        state.busy = false;

        if start {
            self.trigger(channel);
        }
    }

    fn start_channel_mask(&mut self, mask: u32) {
        for i in 0..CHANNEL_COUNT {
            if mask & (1 << i) != 0 {
                self.trigger(ChannelId(i));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusLines, PinBinding};
    use crate::hal::{PioId, Program, StateMachineId};
    use crate::memory::address::XIP_NOCACHE_BASE;

    fn pios_with_pusher() -> ([SimPio; 2], StateMachineId) {
        let mut pio0 = SimPio::new(PioId::Pio0);
        let sm = pio0.claim_unused_sm().unwrap();
        let offset = pio0.add_program(Program::PushDataBits).unwrap();
        pio0.init_sm(
            sm,
            Program::PushDataBits,
            offset,
            PinBinding::free_running(BusLines::Data),
        );

        ([pio0, SimPio::new(PioId::Pio1)], sm)
    }

    fn flash() -> Flash {
        let mut flash = Flash::new(0x1000);
        flash.load(0, &[0x10, 0x11, 0x12, 0x13, 0x14]).unwrap();
        flash
    }

    #[test]
    fn claims_all_channels() {
        let mut dma = SimDma::new();

        for i in 0..CHANNEL_COUNT {
            assert_eq!(Ok(ChannelId(i)), dma.claim_unused_channel());
        }
        assert_eq!(Err(HalError::NoFreeChannel), dma.claim_unused_channel());
    }

    #[test]
    fn memory_to_fifo_stops_when_fifo_full() {
        let (mut pios, sm) = pios_with_pusher();
        let flash = flash();
        let mut faults = Vec::new();
        let mut dma = SimDma::new();

        let channel = dma.claim_unused_channel().unwrap();
        dma.configure(
            channel,
            ChannelConfig {
                transfer_size: TransferSize::Byte,
                read_increment: true,
                ..ChannelConfig::default()
            },
            Endpoint::PioTxFifo {
                pio: PioId::Pio0,
                sm,
            },
            Endpoint::Memory(XIP_NOCACHE_BASE),
            5,
            true,
        );

        // The pusher is not serviced here, so its FIFO fills after four bytes
        assert_eq!(4, dma.run(&mut pios, &flash, &mut faults));
        assert!(dma.is_busy(channel));
        assert_eq!(4, pios[0].tx_len(sm));
        assert_eq!(Endpoint::Memory(XIP_NOCACHE_BASE + 4), dma.read_endpoint(channel));
        assert!(faults.is_empty());
    }

    #[test]
    fn read_address_trigger_and_chain() {
        let (mut pios, sm) = pios_with_pusher();
        let mut flash = flash();
        flash
            .load(0x100, &(XIP_NOCACHE_BASE + 3).to_le_bytes())
            .unwrap();
        let mut faults = Vec::new();
        let mut dma = SimDma::new();
        dma.set_completion_log(true);

        let source = dma.claim_unused_channel().unwrap();
        let data = dma.claim_unused_channel().unwrap();
        let next = dma.claim_unused_channel().unwrap();

        // Paced by a FIFO nothing ever fills
        dma.configure(
            next,
            ChannelConfig {
                dreq: Dreq::PioRx {
                    pio: PioId::Pio1,
                    sm: StateMachineId(0),
                },
                ..ChannelConfig::default()
            },
            Endpoint::Memory(0),
            Endpoint::Memory(0),
            1,
            false,
        );
        dma.configure(
            data,
            ChannelConfig {
                transfer_size: TransferSize::Byte,
                read_increment: false,
                chain_to: Some(next),
                high_priority: true,
                ..ChannelConfig::default()
            },
            Endpoint::PioTxFifo {
                pio: PioId::Pio0,
                sm,
            },
            Endpoint::Memory(0),
            1,
            false,
        );
        dma.configure(
            source,
            ChannelConfig {
                read_increment: false,
                ..ChannelConfig::default()
            },
            Endpoint::ReadAddressTrigger(data),
            Endpoint::Memory(XIP_NOCACHE_BASE + 0x100),
            1,
            true,
        );

        assert_eq!(2, dma.run(&mut pios, &flash, &mut faults));
        assert_eq!(Endpoint::Memory(XIP_NOCACHE_BASE + 3), dma.read_endpoint(data));
        assert_eq!(1, pios[0].tx_len(sm));
        assert_eq!(vec![source, data], dma.take_completions());
        assert!(dma.is_busy(next));
        assert!(!dma.is_busy(data));
        assert!(faults.is_empty());
    }

    #[test]
    fn unmapped_read_is_a_fault() {
        let (mut pios, sm) = pios_with_pusher();
        let flash = flash();
        let mut faults = Vec::new();
        let mut dma = SimDma::new();

        let channel = dma.claim_unused_channel().unwrap();
        dma.configure(
            channel,
            ChannelConfig {
                transfer_size: TransferSize::Byte,
                ..ChannelConfig::default()
            },
            Endpoint::PioTxFifo {
                pio: PioId::Pio0,
                sm,
            },
            Endpoint::Memory(0x2000_0000),
            1,
            true,
        );
        dma.run(&mut pios, &flash, &mut faults);

        assert_eq!(
            vec![BusFault::UnmappedAccess {
                channel,
                address: 0x2000_0000
            }],
            faults
        );
    }
}
