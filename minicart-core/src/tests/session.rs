use super::{
    assert_clean, four_slot_config, single_image_config, Session, MAX_SPINS, SETTLE_DELAY,
};

use crate::bus::{BusEvent, ADDRESS_MASK};
use crate::config::{CartConfig, OutOfRangePolicy, RunConfig, RunScript};
use crate::controller::BootState;
use crate::hal::PioId;
use crate::trace::{selection_address, BusTrace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SENTINEL: u32 = 0x3FF;

fn session_trace(slot: u8, menu_reads: u32, image_reads: u32) -> BusTrace {
    BusTrace::selection_session(SETTLE_DELAY, SENTINEL, slot, menu_reads, image_reads)
}

#[test]
fn select_slot_two() {
    let mut session = Session::new(four_slot_config(), session_trace(2, 8, 64));
    let summary = session.run();

    assert_clean(&summary);
    assert_eq!(BootState::DirectServing, summary.final_state);
    assert_eq!(Some(2), summary.selected_slot);
    assert_eq!(Some(0x1010_0000 + 1_048_576), summary.serving_address);
    assert_eq!(72, summary.reads_served);
    assert_eq!(0, summary.reads_unverified);
    assert_eq!(0, summary.ignored_writes);

    let slot_size = session.controller.store().slot_size();
    for read in session.board.served().iter().filter(|read| read.epoch == 1) {
        assert_eq!(
            session.slot_byte(2, read.address & (slot_size - 1)),
            read.value,
            "read of {:06X}",
            read.address
        );
    }
}

#[test]
fn menu_served_until_selection() {
    let trace = BusTrace::new().reads(0, 8).idle(SETTLE_DELAY).reads(0x123, 8);
    let mut session = Session::new(four_slot_config(), trace);
    let summary = session.run();

    assert_clean(&summary);
    assert_eq!(BootState::AwaitingSelect, summary.final_state);
    assert_eq!(None, summary.selected_slot);
    assert_eq!(Some(0x1010_0000), summary.serving_address);
    assert_eq!(16, summary.reads_served);

    let listener = session.controller.listener().expect("listener should be armed");
    assert!(listener.is_armed());

    // The menu window is 16 KiB and mirrors across the whole console address space
    for read in session.board.served() {
        assert_eq!(session.slot_byte(0, read.address & 0x3FFF), read.value);
    }
}

#[test]
fn write_to_neighboring_address_ignored() {
    let trace = BusTrace::new()
        .reads(0, 4)
        .idle(SETTLE_DELAY)
        .write(selection_address(0x3FE), 2)
        .reads(0, 4);
    let mut session = Session::new(four_slot_config(), trace);
    let summary = session.run();

    assert_clean(&summary);
    assert_eq!(BootState::AwaitingSelect, summary.final_state);
    assert_eq!(None, summary.selected_slot);
    assert_eq!(1, summary.ignored_writes);
    assert_eq!(Some(0x1010_0000), summary.serving_address);
}

#[test]
fn other_writes_do_not_select() {
    let trace = BusTrace::new()
        // Before the listener is armed
        .write(0x0_1234, 5)
        .reads(0, 4)
        .idle(SETTLE_DELAY)
        .write(0x123, 7)
        // Page lines high but A0..A9 low
        .write(0x7FF << 10, 1)
        .select(SENTINEL, 3)
        .reset()
        .reads(0, 16);
    let mut session = Session::new(four_slot_config(), trace);
    let summary = session.run();

    assert_clean(&summary);
    assert_eq!(Some(3), summary.selected_slot);
    assert_eq!(2, summary.ignored_writes);
    assert_eq!(Some(0x1010_0000 + 3 * 0x80000), summary.serving_address);
}

#[test]
fn only_first_selection_retargets() {
    let trace = session_trace(2, 4, 8)
        .select(SENTINEL, 1)
        .reset()
        .reads(0x55, 8);
    let mut session = Session::new(four_slot_config(), trace);
    let summary = session.run();

    assert_clean(&summary);
    assert_eq!(Some(2), summary.selected_slot);
    assert_eq!(Some(0x1010_0000 + 2 * 0x80000), summary.serving_address);
    // The listener is stopped after the first capture and never sees the second write
    assert_eq!(0, summary.ignored_writes);

    let listener = session.controller.listener().expect("listener was armed");
    assert!(!listener.is_armed());
    let pio1 = session.board.fabric().pio(PioId::Pio1);
    for machine in listener.machines() {
        assert_eq!(0, pio1.rx_len(machine.sm()));
    }

    let last = session.board.served().last().copied().expect("reads were served");
    assert_eq!(2, last.epoch);
    assert_eq!(session.slot_byte(2, last.address & 0x7FFFF), last.value);
}

#[test]
fn out_of_range_selection_ignored() {
    let trace = BusTrace::new()
        .reads(0, 4)
        .idle(SETTLE_DELAY)
        .select(SENTINEL, 9)
        .reads(0, 4)
        .select(SENTINEL, 1)
        .reset()
        .reads(0, 16);
    let mut session = Session::new(four_slot_config(), trace);
    let summary = session.run();

    assert_clean(&summary);
    assert_eq!(Some(1), summary.selected_slot);
    assert_eq!(1, summary.ignored_writes);
    assert_eq!(Some(0x1010_0000 + 0x80000), summary.serving_address);
}

#[test]
fn out_of_range_selection_clamped() {
    let config = CartConfig {
        out_of_range_policy: OutOfRangePolicy::ClampToMenu,
        ..four_slot_config()
    };
    let mut session = Session::new(config, session_trace(0xFF, 4, 16));
    let summary = session.run();

    assert_clean(&summary);
    assert_eq!(BootState::DirectServing, summary.final_state);
    assert_eq!(Some(0), summary.selected_slot);
    assert_eq!(Some(0x1010_0000), summary.serving_address);
    assert_eq!(0, summary.ignored_writes);
}

#[test]
fn single_image_served_directly() {
    let trace = BusTrace::new()
        .reads(0, 16)
        .select(SENTINEL, 1)
        .reads(0x200, 16);
    let mut session = Session::new(single_image_config(), trace);
    let summary = session.run();

    assert_clean(&summary);
    assert_eq!(BootState::DirectServing, summary.final_state);
    assert_eq!(None, summary.selected_slot);
    assert_eq!(Some(0x1010_0000), summary.serving_address);
    assert_eq!(32, summary.reads_served);
    assert_eq!(0, summary.ignored_writes);

    assert!(session.controller.listener().is_none());
    assert!(session.board.fabric().pio(PioId::Pio1).loaded_programs().is_empty());

    // 1 MiB window, so A20 is the only ignored line
    for read in session.board.served() {
        assert_eq!(session.slot_byte(0, read.address & 0xFFFFF), read.value);
    }
}

#[test]
fn random_reads_match_selected_image() {
    let mut session = Session::new(four_slot_config(), session_trace(1, 4, 4));
    session.run();

    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut addresses = Vec::new();
    for _ in 0..2000 {
        let address = rng.gen_range(0..=ADDRESS_MASK);
        session.board.apply(BusEvent::Read { address });
        addresses.push(address);
    }

    let served = &session.board.served()[session.board.served().len() - addresses.len()..];
    for (&address, read) in addresses.iter().zip(served) {
        assert_eq!(address, read.address);
        assert_eq!(
            session.slot_byte(1, address & 0x7FFFF),
            read.value,
            "read of {address:06X}"
        );
    }

    assert!(session.board.fabric().faults().is_empty());
}

#[test]
fn spin_limit_reported() {
    let mut session = Session::new(four_slot_config(), session_trace(2, 4, 4));

    let result = crate::eventloop::run(&mut session.controller, &mut session.board, 8);
    assert!(matches!(
        result,
        Err(crate::RunError::SpinLimit {
            max_spins: 8,
            state: BootState::MenuServing { .. }
        })
    ));
}

#[test]
fn run_from_files_and_replay_trace() {
    let config = four_slot_config();
    let store = config.image_store().unwrap();
    let store_image = super::random_store_image(&store, 7);

    let temp_dir = std::env::temp_dir();
    let pid = std::process::id();
    let store_path = temp_dir.join(format!("minicart-store-{pid}.bin"));
    let trace_path = temp_dir.join(format!("minicart-session-{pid}.bin"));
    std::fs::write(&store_path, &store_image).unwrap();

    let run_config = RunConfig {
        store_path: store_path.to_string_lossy().into_owned(),
        script: RunScript::Select {
            slot: 3,
            menu_reads: 8,
            image_reads: 32,
        },
        save_trace_path: Some(trace_path.to_string_lossy().into_owned()),
        max_spins: MAX_SPINS,
    };
    let recorded = crate::run(&config, &run_config).unwrap();

    let replay_config = RunConfig {
        script: RunScript::Trace {
            trace_path: trace_path.to_string_lossy().into_owned(),
        },
        save_trace_path: None,
        ..run_config
    };
    let replayed = crate::run(&config, &replay_config).unwrap();

    std::fs::remove_file(&store_path).unwrap();
    std::fs::remove_file(&trace_path).unwrap();

    assert_clean(&recorded);
    assert_clean(&replayed);
    assert_eq!(Some(3), recorded.selected_slot);
    assert_eq!(recorded.selected_slot, replayed.selected_slot);
    assert_eq!(recorded.reads_served, replayed.reads_served);
    assert_eq!(recorded.serving_address, replayed.serving_address);
}

#[test]
fn missing_store_file() {
    let run_config = RunConfig {
        store_path: "minicart-store-does-not-exist.bin".into(),
        script: RunScript::Select {
            slot: 1,
            menu_reads: 1,
            image_reads: 1,
        },
        save_trace_path: None,
        max_spins: MAX_SPINS,
    };

    assert!(matches!(
        crate::run(&four_slot_config(), &run_config),
        Err(crate::RunError::Startup {
            source: crate::StartupError::FileRead { .. }
        })
    ));
}
