//! The autonomous read path: four bus-edge state machines and a ring of three DMA channels
//! that turn every console access into a one-byte fetch from flash without the CPU.
//!
//! ```text
//!   HALE ──▶ hale SM ──A──▶ lale SM TX (page word)
//!   LALE ──▶ lale SM ──B──▶ C.READ_ADDR_TRIG
//!                            C: flash byte ──▶ push SM TX ──▶ OE SM drives D0..D7
//!   chains: B ⇒ A, C ⇒ B
//! ```

use crate::bus::{BusLines, ControlLine, PinBinding};
use crate::hal::{
    Board, ChannelConfig, ChannelId, DmaEngine, Dreq, Endpoint, HalError, PioBlock, PioId,
    Program, TransferSize,
};
use crate::machines::BusMachine;
use crate::memory::AddressWindow;
use crate::store::SlotError;
use std::fmt::Formatter;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("hardware error: {source}")]
    Hal {
        #[from]
        source: HalError,
    },
    #[error("slot error: {source}")]
    Slot {
        #[from]
        source: SlotError,
    },
    #[error("pipeline is already in direct addressing, it can only be retargeted once")]
    AlreadyRetargeted,
    #[error("pipeline has not been started")]
    NotStarted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    MenuAddressing,
    DirectAddressing,
}

impl std::fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MenuAddressing => write!(f, "menu"),
            Self::DirectAddressing => write!(f, "direct"),
        }
    }
}

/// The three ring channels, named after what they carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingChannels {
    /// Channel A: page word from the high-address latcher into the low-address latcher.
    pub page: ChannelId,
    /// Channel B: composed address into the data channel's trigger register.
    pub address: ChannelId,
    /// Channel C: one byte from flash into the data pusher.
    pub data: ChannelId,
}

impl RingChannels {
    /// Precedence edges of the ring in completion order: A feeds B, B triggers C, and C
    /// re-arms B which in turn re-arms A.
    pub fn precedence(&self) -> [(ChannelId, ChannelId); 3] {
        [
            (self.page, self.address),
            (self.address, self.data),
            (self.data, self.page),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct BusPipeline {
    output_enable: BusMachine,
    data_pusher: BusMachine,
    high_latch: BusMachine,
    low_latch: BusMachine,
    channels: RingChannels,
    mode: PipelineMode,
    window: AddressWindow,
    image_address: u32,
}

impl BusPipeline {
    /// Claim and wire the state machines and channels, seed the low-address latcher with
    /// `image_address`, and arm the ring.
    pub fn start<B: Board>(
        board: &mut B,
        pio_id: PioId,
        mode: PipelineMode,
        window: AddressWindow,
        image_address: u32,
    ) -> Result<Self, HalError> {
        let pio = board.pio(pio_id);

        let output_enable = BusMachine::load(
            pio,
            Program::OutputEnableToggle,
            PinBinding::new(BusLines::Data, ControlLine::OutputEnable),
        )?;
        let data_pusher = BusMachine::load(
            pio,
            Program::PushDataBits,
            PinBinding::free_running(BusLines::Data),
        )?;
        let high_latch = BusMachine::load(
            pio,
            Program::HighAddressLatch,
            PinBinding::new(BusLines::Address, ControlLine::PageLatch),
        )?;
        let low_latch = BusMachine::load(
            pio,
            Program::LowAddressLatch { mode, window },
            PinBinding::new(BusLines::Address, ControlLine::AccessLatch),
        )?;

        let dma = board.dma();
        let channels = RingChannels {
            page: dma.claim_unused_channel()?,
            address: dma.claim_unused_channel()?,
            data: dma.claim_unused_channel()?,
        };

        // A: move the latched page into the low-address latcher, one word per page latch
        dma.configure(
            channels.page,
            ChannelConfig {
                transfer_size: TransferSize::Word,
                read_increment: false,
                write_increment: false,
                dreq: high_latch.output_ready(),
                chain_to: None,
                high_priority: false,
            },
            low_latch.input_queue(),
            high_latch.output_queue(),
            1,
            false,
        );

        // B: composed address becomes the data channel's source and starts it
        dma.configure(
            channels.address,
            ChannelConfig {
                transfer_size: TransferSize::Word,
                read_increment: false,
                write_increment: false,
                dreq: low_latch.output_ready(),
                chain_to: Some(channels.page),
                high_priority: false,
            },
            Endpoint::ReadAddressTrigger(channels.data),
            low_latch.output_queue(),
            1,
            false,
        );

        // C: fetch the byte, read address is overwritten by B on every access
        dma.configure(
            channels.data,
            ChannelConfig {
                transfer_size: TransferSize::Byte,
                read_increment: false,
                write_increment: false,
                dreq: Dreq::Permanent,
                chain_to: Some(channels.address),
                high_priority: true,
            },
            data_pusher.input_queue(),
            Endpoint::Memory(image_address),
            1,
            false,
        );

        let pio = board.pio(pio_id);
        output_enable.start(pio);
        data_pusher.start(pio);
        high_latch.start(pio);
        low_latch.start(pio);
        low_latch.push(pio, window.seed(image_address))?;

        let dma = board.dma();
        dma.start_channel_mask(channels.page.mask());
        dma.start_channel_mask(channels.address.mask());

        log::info!(
            "bus pipeline armed in {mode} addressing, {window} window at {image_address:#010X}"
        );

        Ok(Self {
            output_enable,
            data_pusher,
            high_latch,
            low_latch,
            channels,
            mode,
            window,
            image_address,
        })
    }

    /// Switch the low-address latcher to the direct program and point it at `image_address`.
    ///
    /// The ring channels are left alone; they keep servicing the latcher once it restarts.
    pub fn retarget<B: Board>(
        &mut self,
        board: &mut B,
        window: AddressWindow,
        image_address: u32,
    ) -> Result<(), PipelineError> {
        if self.mode == PipelineMode::DirectAddressing {
            return Err(PipelineError::AlreadyRetargeted);
        }

        let pio = board.pio(self.low_latch.pio());
        self.low_latch.swap_program(
            pio,
            Program::LowAddressLatch {
                mode: PipelineMode::DirectAddressing,
                window,
            },
        )?;
        self.low_latch.push(pio, window.seed(image_address))?;

        self.mode = PipelineMode::DirectAddressing;
        self.window = window;
        self.image_address = image_address;

        log::info!("bus pipeline retargeted to {window} window at {image_address:#010X}");

        Ok(())
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    pub fn window(&self) -> AddressWindow {
        self.window
    }

    pub fn image_address(&self) -> u32 {
        self.image_address
    }

    pub fn channels(&self) -> RingChannels {
        self.channels
    }

    pub fn low_latch(&self) -> &BusMachine {
        &self.low_latch
    }

    pub fn machines(&self) -> [&BusMachine; 4] {
        [
            &self.output_enable,
            &self.data_pusher,
            &self.high_latch,
            &self.low_latch,
        ]
    }
}
