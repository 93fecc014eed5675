use super::{four_slot_config, single_image_config, Session, SETTLE_DELAY};

use crate::config::{CartConfig, CoreVoltage};
use crate::controller::BootState;
use crate::hal::{HalError, PioId};
use crate::pipeline::{PipelineError, PipelineMode};
use crate::trace::BusTrace;

#[test]
fn clocks_configured_before_pipeline_starts() {
    let mut session = Session::new(four_slot_config(), BusTrace::new());

    assert_eq!(BootState::Booting, session.controller.state());
    assert!(session.controller.pipeline().is_none());

    let state = session.controller.step(&mut session.board).unwrap();

    assert_eq!(
        BootState::MenuServing {
            settle_remaining: SETTLE_DELAY
        },
        state
    );
    assert_eq!(Some(CoreVoltage::V1_30), session.board.core_voltage());
    assert_eq!(Some(240_000), session.board.sys_clock_khz());
    assert_eq!(4, session.board.slept_ms());
    assert_eq!(0, session.board.spins());

    let pipeline = session.controller.pipeline().expect("pipeline should be running");
    assert_eq!(PipelineMode::MenuAddressing, pipeline.mode());
    assert_eq!(0x1010_0000, pipeline.image_address());
    assert!(session.controller.listener().is_none());
}

#[test]
fn unsupported_clock_fails_boot() {
    let config = CartConfig {
        sys_clock_khz: 500_000,
        ..four_slot_config()
    };
    let mut session = Session::new(config, BusTrace::new());

    assert_eq!(
        Err(PipelineError::Hal {
            source: HalError::UnsupportedClock { khz: 500_000 }
        }),
        session.controller.step(&mut session.board)
    );
    assert!(session.controller.pipeline().is_none());
}

#[test]
fn listener_armed_after_settle_delay() {
    let mut session = Session::new(four_slot_config(), BusTrace::new());

    session.step_until(BootState::AwaitingSelect);

    assert_eq!(u64::from(SETTLE_DELAY), session.board.spins());
    let listener = session.controller.listener().expect("listener should be armed");
    assert!(listener.is_armed());
    assert_eq!(PioId::Pio1, listener.pio());

    // Nothing written, so the controller keeps waiting
    for _ in 0..100 {
        assert_eq!(
            BootState::AwaitingSelect,
            session.controller.step(&mut session.board).unwrap()
        );
    }
    assert_eq!(None, session.controller.selected_slot());
}

#[test]
fn menu_address_override() {
    let config = CartConfig {
        menu_image_address: Some(0x1010_4000),
        ..four_slot_config()
    };
    let trace = BusTrace::new().reads(0, 16);
    let mut session = Session::new(config, trace);
    let summary = session.run();

    assert!(summary.is_clean());
    assert_eq!(Some(0x1010_4000), summary.serving_address);
    for read in session.board.served() {
        assert_eq!(session.slot_byte(0, 0x4000 + (read.address & 0x3FFF)), read.value);
    }
}

#[test]
fn run_until_direct_returns_slot_address() {
    let trace = BusTrace::selection_session(SETTLE_DELAY, 0x3FF, 3, 2, 0);
    let mut session = Session::new(four_slot_config(), trace);

    assert_eq!(
        Ok(0x1010_0000 + 3 * 0x80000),
        session.controller.run_until_direct(&mut session.board)
    );
    assert_eq!(Some(3), session.controller.selected_slot());
    assert_eq!(
        PipelineMode::DirectAddressing,
        session.controller.pipeline().unwrap().mode()
    );
}

#[test]
fn single_layout_skips_menu() {
    let mut session = Session::new(single_image_config(), BusTrace::new());

    assert_eq!(
        BootState::DirectServing,
        session.controller.step(&mut session.board).unwrap()
    );

    let pipeline = session.controller.pipeline().unwrap();
    assert_eq!(PipelineMode::DirectAddressing, pipeline.mode());
    assert_eq!(1024 * 1024, pipeline.window().size());
    assert_eq!(Some(CoreVoltage::V1_30), session.board.core_voltage());
}
