pub mod bus;
pub mod config;
pub mod controller;
mod eventloop;
pub mod hal;
pub mod labels;
pub mod listener;
pub mod machines;
pub mod memory;
pub mod pack;
pub mod pipeline;
pub mod rom;
pub mod sim;
mod startup;
pub mod store;
pub mod trace;


use crate::trace::BusTrace;

pub use config::{CartConfig, CartLayout, ConfigError, OutOfRangePolicy, RunConfig, RunScript};
pub use controller::{BootState, Controller};
pub use eventloop::{ReadMismatch, RunError, RunSummary};
pub use pack::{pack_store, NameSource, PackError, PackOptions, PackedStore};
pub use rom::RomImage;
pub use startup::{init_board, SimulationState, StartupError};

/// Load the image store into a simulated board, boot the controller against the scripted
/// console and check everything it served.
pub fn run(config: &CartConfig, run_config: &RunConfig) -> Result<RunSummary, RunError> {
    let SimulationState {
        mut controller,
        mut board,
    } = startup::init_simulation_state(config, run_config)?;

    log::info!("running script {}", run_config.script);

    let summary = eventloop::run(&mut controller, &mut board, run_config.max_spins)?;

    if let Some(save_trace_path) = &run_config.save_trace_path {
        let trace = BusTrace::from(board.history().to_vec());
        trace::save_trace(&trace, save_trace_path)?;
    }

    Ok(summary)
}
