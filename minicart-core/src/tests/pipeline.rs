use crate::bus::BusEvent;
use crate::hal::{Board, ChannelId, HalError, PioBlock, PioId, Program, StateMachineId};
use crate::memory::AddressWindow;
use crate::pipeline::{BusPipeline, PipelineError, PipelineMode};
use crate::sim::{Flash, SimBoard};

const FLASH_SIZE: u32 = 0x40_0000;
const MENU_ADDRESS: u32 = 0x1010_0000;
const SLOT_ADDRESS: u32 = 0x1020_0000;

fn menu_window() -> AddressWindow {
    AddressWindow::from_size(16 * 1024).unwrap()
}

fn slot_window() -> AddressWindow {
    AddressWindow::from_size(512 * 1024).unwrap()
}

/// Flash where every byte holds the low bits of its offset mixed with its 64 KiB bank.
fn patterned_board() -> SimBoard {
    let data: Vec<_> = (0..FLASH_SIZE)
        .map(|offset| (offset as u8) ^ ((offset >> 16) as u8).wrapping_mul(0x1D))
        .collect();

    let mut flash = Flash::new(FLASH_SIZE);
    flash.load(0, &data).unwrap();
    SimBoard::new(flash)
}

fn flash_byte(offset: u32) -> u8 {
    (offset as u8) ^ ((offset >> 16) as u8).wrapping_mul(0x1D)
}

fn read(board: &mut SimBoard, address: u32) -> u8 {
    board.apply(BusEvent::Read { address });
    board.served().last().map(|read| read.value).unwrap()
}

fn start_menu(board: &mut SimBoard) -> BusPipeline {
    BusPipeline::start(
        board,
        PioId::Pio0,
        PipelineMode::MenuAddressing,
        menu_window(),
        MENU_ADDRESS,
    )
    .expect("pipeline should fit in an empty PIO block")
}

#[test]
fn start_claims_machines_and_channels() {
    let mut board = patterned_board();
    let pipeline = start_menu(&mut board);

    let offsets: Vec<_> = pipeline.machines().iter().map(|m| m.offset()).collect();
    assert_eq!(vec![0, 3, 5, 9], offsets);

    let sms: Vec<_> = pipeline.machines().iter().map(|m| m.sm()).collect();
    assert_eq!(
        vec![
            StateMachineId(0),
            StateMachineId(1),
            StateMachineId(2),
            StateMachineId(3)
        ],
        sms
    );

    let channels = pipeline.channels();
    assert_eq!(
        (ChannelId(0), ChannelId(1), ChannelId(2)),
        (channels.page, channels.address, channels.data)
    );

    // Page and address channels wait on their latchers, data waits on the address channel
    let dma = board.fabric().dma();
    assert!(dma.is_busy(channels.page));
    assert!(dma.is_busy(channels.address));
    assert!(!dma.is_busy(channels.data));

    // Seed is queued for the low-address latcher
    assert_eq!(1, board.fabric().pio(PioId::Pio0).tx_len(StateMachineId(3)));
}

#[test]
fn menu_window_mirrors() {
    let mut board = patterned_board();
    start_menu(&mut board);

    let base = MENU_ADDRESS - 0x1000_0000;
    for address in [0x0000, 0x0001, 0x2100, 0x3FFF, 0x4000, 0x6100, 0x1F_FFFF] {
        assert_eq!(
            flash_byte(base + (address & 0x3FFF)),
            read(&mut board, address),
            "read of {address:06X}"
        );
    }

    assert!(board.fabric().faults().is_empty());
}

#[test]
fn retarget_swaps_latcher_in_place() {
    let mut board = patterned_board();
    let mut pipeline = start_menu(&mut board);
    let channels = pipeline.channels();
    let low_latch_before = *pipeline.low_latch();

    read(&mut board, 0x1234);
    pipeline
        .retarget(&mut board, slot_window(), SLOT_ADDRESS)
        .unwrap();

    let low_latch = pipeline.low_latch();
    assert_eq!(low_latch_before.sm(), low_latch.sm());
    assert_eq!(low_latch_before.offset(), low_latch.offset());
    assert_eq!(
        Program::LowAddressLatch {
            mode: PipelineMode::DirectAddressing,
            window: slot_window()
        },
        low_latch.program()
    );
    assert_eq!(channels, pipeline.channels());
    assert_eq!(PipelineMode::DirectAddressing, pipeline.mode());
    assert_eq!(SLOT_ADDRESS, pipeline.image_address());

    let loaded = board.fabric().pio(PioId::Pio0).loaded_programs();
    assert!(loaded.contains(&(low_latch.offset(), low_latch.program())));
    assert!(!loaded.contains(&(low_latch_before.offset(), low_latch_before.program())));
    assert_eq!(4, loaded.len());

    // The console re-latches the page after a reset
    board.apply(BusEvent::Reset);
    let base = SLOT_ADDRESS - 0x1000_0000;
    for address in [0x0000, 0x2100, 0x7_FFFF, 0x8_0000, 0x1F_FFFF] {
        assert_eq!(
            flash_byte(base + (address & 0x7_FFFF)),
            read(&mut board, address),
            "read of {address:06X}"
        );
    }

    assert!(board.fabric().faults().is_empty());
}

#[test]
fn retarget_only_once() {
    let mut board = patterned_board();
    let mut pipeline = start_menu(&mut board);

    pipeline
        .retarget(&mut board, slot_window(), SLOT_ADDRESS)
        .unwrap();

    assert_eq!(
        Err(PipelineError::AlreadyRetargeted),
        pipeline.retarget(&mut board, slot_window(), MENU_ADDRESS)
    );
    assert_eq!(SLOT_ADDRESS, pipeline.image_address());
}

#[test]
fn direct_start_serves_image() {
    let mut board = patterned_board();
    let window = AddressWindow::from_size(1024 * 1024).unwrap();
    BusPipeline::start(
        &mut board,
        PioId::Pio0,
        PipelineMode::DirectAddressing,
        window,
        MENU_ADDRESS,
    )
    .unwrap();

    let base = MENU_ADDRESS - 0x1000_0000;
    for address in [0x0_0000, 0x0_2100, 0xF_FFFF, 0x10_0001] {
        assert_eq!(
            flash_byte(base + (address & 0xF_FFFF)),
            read(&mut board, address)
        );
    }
}

#[test]
fn start_fails_without_free_state_machines() {
    let mut board = patterned_board();
    for _ in 0..2 {
        board.pio(PioId::Pio0).claim_unused_sm().unwrap();
    }

    assert_eq!(
        Err(HalError::NoFreeStateMachine { pio: PioId::Pio0 }),
        BusPipeline::start(
            &mut board,
            PioId::Pio0,
            PipelineMode::MenuAddressing,
            menu_window(),
            MENU_ADDRESS,
        )
        .map(|_| ())
    );
}

#[test]
fn read_without_output_enable_data_is_stale() {
    let mut board = patterned_board();
    start_menu(&mut board);

    read(&mut board, 0x10);
    assert!(board.fabric().faults().is_empty());

    // Output enable twice for one access: the second drive has nothing new staged
    assert!(board.fabric_mut().output_enable().is_some());
    assert_eq!(1, board.fabric().faults().len());
}
