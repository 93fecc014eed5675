use crate::config::{CartConfig, CartLayout, ConfigError, OutOfRangePolicy};
use crate::hal::{Board, PioId};
use crate::listener::{Capture, SlotSelectListener};
use crate::memory::AddressWindow;
use crate::pipeline::{BusPipeline, PipelineError, PipelineMode};
use crate::store::ImageStore;
use std::convert::Infallible;
use std::fmt::Formatter;

pub const PIPELINE_PIO: PioId = PioId::Pio0;
pub const LISTENER_PIO: PioId = PioId::Pio1;

/// Settling time around the core voltage change, in milliseconds.
const VREG_SETTLE_MS: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Booting,
    MenuServing { settle_remaining: u32 },
    AwaitingSelect,
    Retargeting { slot: u8 },
    DirectServing,
}

impl std::fmt::Display for BootState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Booting => write!(f, "Booting"),
            Self::MenuServing { .. } => write!(f, "MenuServing"),
            Self::AwaitingSelect => write!(f, "AwaitingSelect"),
            Self::Retargeting { slot } => write!(f, "Retargeting(slot={slot})"),
            Self::DirectServing => write!(f, "DirectServing"),
        }
    }
}

/// Owns everything that changes over a power cycle: the pipeline and its channels, the
/// listener, the boot state and the captured selection.
#[derive(Debug)]
pub struct Controller {
    config: CartConfig,
    store: ImageStore,
    menu_window: AddressWindow,
    menu_address: u32,
    state: BootState,
    pipeline: Option<BusPipeline>,
    listener: Option<SlotSelectListener>,
    selected_slot: Option<u8>,
    ignored_writes: u64,
}

impl Controller {
    pub fn new(config: CartConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let store = config.image_store()?;
        let menu_window = config.menu_window()?;
        let menu_address = config.menu_image_address(&store);

        Ok(Self {
            config,
            store,
            menu_window,
            menu_address,
            state: BootState::Booting,
            pipeline: None,
            listener: None,
            selected_slot: None,
            ignored_writes: 0,
        })
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn config(&self) -> &CartConfig {
        &self.config
    }

    pub fn pipeline(&self) -> Option<&BusPipeline> {
        self.pipeline.as_ref()
    }

    pub fn listener(&self) -> Option<&SlotSelectListener> {
        self.listener.as_ref()
    }

    pub fn selected_slot(&self) -> Option<u8> {
        self.selected_slot
    }

    /// Number of write strobes the listener saw that were not a valid selection.
    pub fn ignored_writes(&self) -> u64 {
        self.ignored_writes
    }

    /// Address the pipeline is currently serving from, once it has been started.
    pub fn serving_address(&self) -> Option<u32> {
        self.pipeline.as_ref().map(BusPipeline::image_address)
    }

    /// Advance the boot sequence by one iteration. Waiting states spin the board once.
    pub fn step<B: Board>(&mut self, board: &mut B) -> Result<BootState, PipelineError> {
        let next = match self.state {
            BootState::Booting => self.boot(board)?,
            BootState::MenuServing {
                settle_remaining: 0,
            } => {
                self.listener = Some(SlotSelectListener::arm(
                    board,
                    LISTENER_PIO,
                    self.config.selection_sentinel,
                )?);
                BootState::AwaitingSelect
            }
            BootState::MenuServing { settle_remaining } => {
                board.tight_loop_contents();
                BootState::MenuServing {
                    settle_remaining: settle_remaining - 1,
                }
            }
            BootState::AwaitingSelect => match self.poll_selection(board) {
                Some(slot) => BootState::Retargeting { slot },
                None => {
                    board.tight_loop_contents();
                    BootState::AwaitingSelect
                }
            },
            BootState::Retargeting { slot } => {
                self.retarget(board, slot)?;
                BootState::DirectServing
            }
            BootState::DirectServing => {
                board.tight_loop_contents();
                BootState::DirectServing
            }
        };

        if std::mem::discriminant(&next) != std::mem::discriminant(&self.state) {
            log::info!("boot state {} -> {next}", self.state);
        }
        self.state = next;

        Ok(next)
    }

    /// Step until the selected image is being served and return its address.
    pub fn run_until_direct<B: Board>(&mut self, board: &mut B) -> Result<u32, PipelineError> {
        while self.state != BootState::DirectServing {
            self.step(board)?;
        }

        Ok(self.serving_address().unwrap_or(self.store.base()))
    }

    /// Firmware entry point: boot, serve the selected image, and idle for the rest of the
    /// power cycle.
    pub fn run<B: Board>(mut self, board: &mut B) -> Result<Infallible, PipelineError> {
        self.run_until_direct(board)?;

        loop {
            board.tight_loop_contents();
        }
    }

    fn boot<B: Board>(&mut self, board: &mut B) -> Result<BootState, PipelineError> {
        board.sleep_ms(VREG_SETTLE_MS);
        board.set_core_voltage(self.config.core_voltage);
        board.sleep_ms(VREG_SETTLE_MS);
        board.set_sys_clock_khz(self.config.sys_clock_khz)?;

        log::info!(
            "clocks configured: {} kHz at {}",
            self.config.sys_clock_khz,
            self.config.core_voltage
        );

        match self.config.layout {
            CartLayout::Multi => {
                self.pipeline = Some(BusPipeline::start(
                    board,
                    PIPELINE_PIO,
                    PipelineMode::MenuAddressing,
                    self.menu_window,
                    self.menu_address,
                )?);
                Ok(BootState::MenuServing {
                    settle_remaining: self.config.settle_delay,
                })
            }
            CartLayout::Single => {
                self.pipeline = Some(BusPipeline::start(
                    board,
                    PIPELINE_PIO,
                    PipelineMode::DirectAddressing,
                    self.store.window(),
                    self.store.base(),
                )?);
                Ok(BootState::DirectServing)
            }
        }
    }

    fn poll_selection<B: Board>(&mut self, board: &mut B) -> Option<u8> {
        let listener = self.listener.as_mut()?;
        let capture = listener.poll(board.pio(LISTENER_PIO))?;

        match capture {
            Capture::Selection { slot } => match self.store.target_address(slot) {
                Ok(_) => Some(slot),
                Err(err) => match self.config.out_of_range_policy {
                    OutOfRangePolicy::Ignore => {
                        log::warn!("ignoring selection: {err}");
                        self.ignored_writes += 1;
                        None
                    }
                    OutOfRangePolicy::ClampToMenu => {
                        log::warn!("{err}, falling back to the menu slot");
                        Some(ImageStore::MENU_SLOT)
                    }
                },
            },
            Capture::Ignored { address, value } => {
                log::debug!("ignoring write of {value:02X} to low address {address:03X?}");
                self.ignored_writes += 1;
                None
            }
        }
    }

    fn retarget<B: Board>(&mut self, board: &mut B, slot: u8) -> Result<(), PipelineError> {
        let target_address = self.store.target_address(slot)?;

        let Some(pipeline) = self.pipeline.as_mut() else {
            return Err(PipelineError::NotStarted);
        };
        pipeline.retarget(board, self.store.window(), target_address)?;

        if let Some(listener) = self.listener.as_mut() {
            listener.disarm(board.pio(LISTENER_PIO));
        }

        self.selected_slot = Some(slot);

        log::info!("serving slot {slot} from {target_address:#010X}");

        Ok(())
    }
}
