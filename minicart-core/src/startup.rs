use crate::config::{CartConfig, CartLayout, ConfigError, RunConfig, RunScript};
use crate::controller::Controller;
use crate::sim::{Flash, FlashError, SimBoard};
use crate::trace::{self, BusTrace, TraceError};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StartupError {
    #[error("error reading image store from {file_path}: {source}")]
    FileRead {
        file_path: String,
        #[source]
        source: io::Error,
    },
    #[error("image store file of {len:#X} bytes is larger than the configured store of {capacity:#X} bytes")]
    StoreTooLarge { len: usize, capacity: u32 },
    #[error("invalid cartridge configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },
    #[error("error loading image store into flash: {source}")]
    Flash {
        #[from]
        source: FlashError,
    },
    #[error("error loading bus trace: {source}")]
    Trace {
        #[from]
        source: TraceError,
    },
}

pub struct SimulationState {
    pub controller: Controller,
    pub board: SimBoard,
}

pub fn init_simulation_state(
    config: &CartConfig,
    run_config: &RunConfig,
) -> Result<SimulationState, StartupError> {
    let store_image = match std::fs::read(&run_config.store_path) {
        Ok(store_image) => store_image,
        Err(err) => {
            return Err(StartupError::FileRead {
                file_path: run_config.store_path.clone(),
                source: err,
            })
        }
    };

    let controller = Controller::new(config.clone())?;
    let mut board = init_board(config, &store_image)?;
    board.script(build_script(config, &run_config.script)?);

    Ok(SimulationState { controller, board })
}

/// A board whose flash holds `store_image` at the image store offset and nothing else.
pub fn init_board(config: &CartConfig, store_image: &[u8]) -> Result<SimBoard, StartupError> {
    let store = config.image_store()?;
    if store_image.len() > store.len() as usize {
        return Err(StartupError::StoreTooLarge {
            len: store_image.len(),
            capacity: store.len(),
        });
    }

    let mut flash = Flash::new(config.flash_size);
    flash.load(config.image_store_offset, store_image)?;

    log::info!(
        "loaded {:#X} byte image store at flash offset {:#X}",
        store_image.len(),
        config.image_store_offset
    );

    Ok(SimBoard::new(flash))
}

pub fn build_script(config: &CartConfig, script: &RunScript) -> Result<BusTrace, StartupError> {
    let trace = match (script, config.layout) {
        (
            RunScript::Select {
                slot,
                menu_reads,
                image_reads,
            },
            CartLayout::Multi,
        ) => BusTrace::selection_session(
            config.settle_delay,
            config.selection_sentinel,
            *slot,
            *menu_reads,
            *image_reads,
        ),
        (RunScript::Select { image_reads, .. }, CartLayout::Single) => {
            BusTrace::new().reads(0, *image_reads)
        }
        (RunScript::Trace { trace_path }, _) => trace::load_trace(trace_path)?,
    };

    Ok(trace)
}
