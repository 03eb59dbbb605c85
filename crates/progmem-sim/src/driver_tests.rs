//! progmem-core driver behaviour against the simulated controller

use std::cell::Cell;
use std::thread;

use progmem_core::board::BoardConfig;
use progmem_core::bus::YieldStall;
use progmem_core::error::{Error, ErrorKind, Misalignment, VerifyFailure};
use progmem_core::regs::{Cr, Sr};
use progmem_core::{ControllerState, Flash, ProgMem};

use crate::{Mode, SimConfig, SimController, Violation};

const BASE: u32 = 0x0800_0000;
const PAGE: usize = 2048;

fn sim(board: &BoardConfig) -> SimController {
    SimController::new(SimConfig::from_board(board))
}

fn driver(sim: &SimController) -> Flash<&SimController, YieldStall> {
    let config = sim.config();
    Flash::with_geometry(sim, YieldStall, config.regs_base, config.geometry)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(7).wrapping_add(0x11)).collect()
}

/// Controller left idle and locked with no error flags raised
fn assert_clean(sim: &SimController) {
    assert!(sim.cr().contains(Cr::LOCK | Cr::OPTLOCK), "CR {:?}", sim.cr());
    assert!(!sim.cr().intersects(Cr::MODES), "CR {:?}", sim.cr());
    assert!(sim.sr().errors().is_empty(), "SR {:?}", sim.sr());
    assert!(!sim.sr().contains(Sr::BSY));
}

#[test]
fn test_scenario_erase_write_read() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.fill(3 * PAGE, &[0u8; 64]);
    let flash = driver(&sim);

    assert_eq!(flash.erase_page(3), Ok(2048));

    let data: Vec<u8> = (0x11..0x31).collect();
    assert_eq!(data.len(), 32);
    assert_eq!(flash.write(BASE + 3 * 2048, &data), Ok(32));

    let mut back = [0u8; 32];
    assert_eq!(flash.read(BASE + 3 * 2048, &mut back), Ok(32));
    assert_eq!(&back[..], &data[..]);

    // 32 bytes written, none of them 0xFF, 2016 still erased
    assert_eq!(flash.is_page_erased(3), Ok(32));

    assert_clean(&sim);
    assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    assert_eq!(flash.state(), ControllerState::Idle);
}

#[test]
fn test_erase_then_blank_for_every_page() {
    for board in [BoardConfig::stm32l4(128), BoardConfig::stm32l4_dual_bank(256)] {
        let sim = sim(&board);
        sim.fill(0, &pattern(board.flash_size()));
        let flash = driver(&sim);

        for page in 0..flash.page_count() {
            assert!(flash.is_page_erased(page).unwrap() > 0);
            assert_eq!(flash.erase_page(page), Ok(PAGE));
            assert_eq!(flash.is_page_erased(page), Ok(0), "page {}", page);
            // Only pages up to this one have been erased
            if page + 1 < flash.page_count() {
                assert!(flash.is_page_erased(page + 1).unwrap() > 0, "page {}", page + 1);
            }
        }
        assert_eq!(sim.data(), vec![0xFF; board.flash_size()]);
        assert!(sim.violations().is_empty());
    }
}

#[test]
fn test_second_bank_erase_leaves_first_bank_alone() {
    let board = BoardConfig::stm32l4_dual_bank(512);
    let sim = sim(&board);
    sim.fill(0, &vec![0x5A; 512 * PAGE]);
    let flash = driver(&sim);

    // Page 300 is page 44 of bank 2
    assert_eq!(flash.erase_page(300), Ok(PAGE));
    assert_eq!(sim.read_array(300 * PAGE, PAGE), vec![0xFF; PAGE]);
    assert_eq!(sim.read_array(44 * PAGE, 4), vec![0x5A; 4]);
    assert_eq!(sim.read_array(0, 4), vec![0x5A; 4]);
    assert_eq!(flash.is_page_erased(44), Ok(PAGE));

    assert!(matches!(
        flash.erase_page(512),
        Err(Error::PageOutOfRange { page: 512, count: 512 })
    ));
    assert_eq!(sim.read_array(0, 4), vec![0x5A; 4]);
    assert_clean(&sim);
}

#[test]
fn test_out_of_range_touches_no_register() {
    let sim = sim(&BoardConfig::stm32l4(256));
    let flash = driver(&sim);
    let cr = sim.cr();

    assert_eq!(
        flash.erase_page(256),
        Err(Error::PageOutOfRange {
            page: 256,
            count: 256
        })
    );
    assert_eq!(flash.is_page_erased(300).unwrap_err().kind(), ErrorKind::OutOfRange);
    assert_eq!(
        flash.write(BASE + 256 * 2048, &[0; 8]).unwrap_err().kind(),
        ErrorKind::OutOfRange
    );
    assert_eq!(
        flash.write(BASE + 255 * 2048 + 2040, &[0; 16]).unwrap_err(),
        Error::AddressOutOfRange {
            addr: BASE + 255 * 2048 + 2040,
            len: 16
        }
    );
    assert_eq!(flash.page_address(256), None);

    assert_eq!(sim.register_writes(), 0);
    assert_eq!(sim.cr(), cr);
    assert!(!sim.sr().contains(Sr::BSY));
}

#[test]
fn test_misaligned_request_leaves_lock_untouched() {
    let sim = sim(&BoardConfig::stm32l4(256));
    let flash = driver(&sim);

    for addr in [BASE + 1, BASE + 4, BASE + 2047] {
        let err = flash.write(addr, &[0; 8]).unwrap_err();
        assert_eq!(err, Error::InvalidArgument(Misalignment::Address { addr }));
        assert_eq!(err.errno(), -22);
    }
    assert_eq!(
        flash.write(BASE, &[0; 10]),
        Err(Error::InvalidArgument(Misalignment::Length { len: 10 }))
    );
    assert_eq!(
        flash.program(BASE, &[0; 8], 16),
        Err(Error::InvalidArgument(Misalignment::ShortBuffer {
            len: 16,
            available: 8
        }))
    );

    assert_eq!(sim.register_writes(), 0);
    assert_eq!(sim.cr(), Cr::LOCK | Cr::OPTLOCK);
}

#[test]
fn test_lock_twice_is_harmless() {
    let sim = sim(&BoardConfig::stm32l4(256));
    let flash = driver(&sim);

    flash.lock();
    flash.lock();
    assert_clean(&sim);

    flash.unlock();
    assert!(!sim.cr().contains(Cr::LOCK));
    flash.unlock();
    flash.lock();
    flash.lock();
    assert_clean(&sim);

    assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    assert!(!sim.is_locked_out());
    assert_eq!(flash.erase_page(0), Ok(PAGE));
}

#[test]
fn test_round_trip_leaves_rest_of_page_erased() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.fill(10 * PAGE, &[0xA5; PAGE]);
    let flash = driver(&sim);

    assert_eq!(flash.erase_page(10), Ok(PAGE));
    let data = pattern(200);
    // Linear address form
    assert_eq!(flash.write(10 * 2048 + 64, &data), Ok(200));

    let mut page = vec![0u8; PAGE];
    flash.read(flash.page_address(10).unwrap(), &mut page).unwrap();
    assert!(page[..64].iter().all(|&b| b == 0xFF));
    assert_eq!(&page[64..264], &data[..]);
    assert!(page[264..].iter().all(|&b| b == 0xFF));
}

#[test]
fn test_trailing_word_is_padded_with_erased_pattern() {
    let sim = sim(&BoardConfig::stm32l4(256));
    let flash = driver(&sim);

    let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C];
    assert_eq!(flash.write(BASE + 16, &data), Ok(12));

    assert_eq!(sim.read_array(16, 12), data.to_vec());
    assert_eq!(sim.read_array(28, 4), vec![0xFF; 4]);
    assert!(sim.sr().errors().is_empty());
    assert!(sim.violations().is_empty(), "{:?}", sim.violations());

    // The padded half belongs to a programmed double-word and cannot be
    // programmed again before an erase
    let err = flash.write(BASE + 24, &[0x11; 8]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_clean(&sim);
}

#[test]
fn test_write_protection_aborts_and_cleans_up() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.protect_page(5);
    let flash = driver(&sim);

    // Starts on page 4 and runs into page 5
    let start = BASE + 5 * 2048 - 16;
    let err = flash.write(start, &pattern(64)).unwrap_err();
    match err {
        Error::ProtectionViolation { addr, status } => {
            assert_eq!(addr, BASE + 5 * 2048);
            assert!(Sr::from_bits_truncate(status).contains(Sr::WRPERR));
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_eq!(err.errno(), -30);

    // Double-words before the protected page were written, none after
    assert_eq!(sim.read_array(5 * PAGE - 16, 16), pattern(16));
    assert_eq!(sim.read_array(5 * PAGE, 48), vec![0xFF; 48]);
    assert_clean(&sim);

    // Gate released and controller usable again
    assert_eq!(flash.state(), ControllerState::Idle);
    assert_eq!(flash.write(BASE + 6 * 2048, &[0; 8]), Ok(8));
}

#[test]
fn test_verify_mismatch_aborts_and_cleans_up() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.stick_bits(BASE + 9, 0x40);
    let flash = driver(&sim);

    let err = flash.write(BASE, &[0u8; 24]).unwrap_err();
    assert_eq!(
        err,
        Error::Io(VerifyFailure::Program {
            addr: BASE + 8,
            expected: 0,
            found: 0x4000,
            status: 0,
        })
    );
    // The first double-word made it, the third was never attempted
    assert_eq!(sim.read_array(0, 8), vec![0; 8]);
    assert_eq!(sim.read_array(16, 8), vec![0xFF; 8]);
    assert_clean(&sim);
}

#[test]
fn test_programming_dirty_cells_fails_verify() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.fill(64, &[0x0F; 8]);
    let flash = driver(&sim);

    let err = flash.write(BASE + 64, &[0xF0; 8]).unwrap_err();
    match err {
        Error::Io(VerifyFailure::Program { status, .. }) => {
            assert!(Sr::from_bits_truncate(status).contains(Sr::PROGERR))
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert_clean(&sim);
}

#[test]
fn test_erase_verify_failure() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.stick_byte(BASE + 7 * 2048 + 100, 0x00);
    let flash = driver(&sim);

    let err = flash.erase_page(7).unwrap_err();
    assert_eq!(err, Error::Io(VerifyFailure::Erase { page: 7, dirty: 1 }));
    assert_eq!(err.errno(), -5);
    assert_eq!(flash.is_page_erased(7), Ok(1));
    assert_clean(&sim);
}

#[test]
fn test_erase_of_protected_page() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.fill(2 * PAGE, &[0u8; 32]);
    sim.protect_page(2);
    let flash = driver(&sim);

    assert_eq!(
        flash.erase_page(2),
        Err(Error::Io(VerifyFailure::Erase { page: 2, dirty: 32 }))
    );
    assert_clean(&sim);

    sim.unprotect_page(2);
    assert_eq!(flash.erase_page(2), Ok(PAGE));
}

#[test]
fn test_stale_error_flags_are_cleared_before_programming() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.raise_status(Sr::PGSERR | Sr::PGAERR);
    let flash = driver(&sim);

    assert_eq!(flash.write(BASE, &[0x12; 8]), Ok(8));
    assert_eq!(sim.read_array(0, 8), vec![0x12; 8]);
    assert_clean(&sim);
}

#[test]
fn test_busy_wait_uses_stall() {
    let sim = SimController::new(
        SimConfig::from_board(&BoardConfig::stm32l4(256)).with_busy_polls(5),
    );
    let stalls = Cell::new(0usize);
    let flash = Flash::new(&sim, || stalls.set(stalls.get() + 1), &BoardConfig::stm32l4(256));

    flash.erase_page(1).unwrap();
    assert_eq!(stalls.get(), 5);
    // Four double-words, each busy for five polls
    flash.write(BASE + 2048, &[0; 32]).unwrap();
    assert_eq!(stalls.get(), 5 + 4 * 5);
    assert!(sim.violations().is_empty(), "{:?}", sim.violations());
    assert_clean(&sim);
}

#[test]
fn test_option_bytes() {
    let sim = sim(&BoardConfig::stm32l4(256));
    let flash = driver(&sim);
    let before = flash.option_bytes();
    assert_eq!(before, crate::FACTORY_OPTR);

    // BOR_LEV to level 0, nRST_STOP cleared
    let after = flash.modify_option_bytes(0x0000_1700, 0).unwrap();
    assert_eq!(after, before & !0x0000_1700);
    assert_eq!(sim.optr_writes(), vec![after]);
    assert_eq!(sim.option_bytes(), after);
    assert_clean(&sim);

    let after = flash.modify_option_bytes(0, 0x0000_1000).unwrap();
    assert_eq!(after & 0x0000_1700, 0x0000_1000);
    assert_eq!(after & 0xFF, 0xAA);
    assert!(sim.violations().is_empty(), "{:?}", sim.violations());
}

#[test]
fn test_option_bytes_failure_is_reported() {
    let sim = sim(&BoardConfig::stm32l4(256));
    sim.fail_option_program(Sr::OPTVERR);
    let flash = driver(&sim);

    let err = flash.modify_option_bytes(0x0000_1000, 0).unwrap_err();
    assert_eq!(
        err,
        Error::Io(VerifyFailure::OptionBytes {
            value: crate::FACTORY_OPTR & !0x0000_1000,
            status: Sr::OPTVERR.bits(),
        })
    );
    assert_eq!(err.errno(), -5);
    assert!(sim.optr_writes().is_empty());
    assert_eq!(sim.option_bytes(), crate::FACTORY_OPTR);
    assert_clean(&sim);
    assert_eq!(flash.state(), ControllerState::Idle);

    sim.fail_option_program(Sr::empty());
    assert!(flash.modify_option_bytes(0x0000_1000, 0).is_ok());
}

#[test]
fn test_option_bytes_refuse_rdp() {
    let sim = sim(&BoardConfig::stm32l4(256));
    let flash = driver(&sim);

    for (clear, set) in [(0xFF, 0), (0, 0xCC), (0x0000_1001, 0), (0, 0x80)] {
        let err = flash.modify_option_bytes(clear, set).unwrap_err();
        assert_eq!(err, Error::PreconditionViolation { clear, set });
        assert_eq!(err.errno(), -22);
    }
    assert!(sim.optr_writes().is_empty());
    assert_eq!(sim.register_writes(), 0);
    assert_eq!(sim.optr(), crate::FACTORY_OPTR);
}

#[test]
fn test_concurrent_erases_never_overlap() {
    let board = BoardConfig::stm32l4(64);
    let sim = SimController::new(SimConfig::from_board(&board).with_busy_polls(3));
    let flash = driver(&sim);

    thread::scope(|s| {
        for worker in 0..4usize {
            let flash = &flash;
            s.spawn(move || {
                for round in 0..8 {
                    let page = worker * 16 + round;
                    assert_eq!(flash.erase_page(page), Ok(PAGE));
                    let addr = flash.page_address(page).unwrap();
                    assert_eq!(flash.write(addr, &[worker as u8; 16]), Ok(16));
                }
            });
        }
    });

    assert!(sim.violations().is_empty(), "{:?}", sim.violations());

    // Every window is opened and closed by the same thread before any other
    // window opens
    let events = sim.mode_events();
    assert_eq!(events.len(), 4 * 8 * 2 * 2);
    for pair in events.chunks(2) {
        let (on, off) = (pair[0], pair[1]);
        assert!(on.enabled && !off.enabled, "{:?}", pair);
        assert_eq!(on.mode, off.mode);
        assert_eq!(on.thread, off.thread);
    }
    let erases = events
        .iter()
        .filter(|e| e.mode == Mode::PageErase && e.enabled)
        .count();
    assert_eq!(erases, 32);

    for worker in 0..4usize {
        for round in 0..8 {
            let offset = (worker * 16 + round) * PAGE;
            assert_eq!(sim.read_array(offset, 16), vec![worker as u8; 16]);
        }
    }
}

#[test]
fn test_wrong_key_is_never_written() {
    let sim = sim(&BoardConfig::stm32l4(256));
    let flash = driver(&sim);

    flash.erase_page(0).unwrap();
    flash.modify_option_bytes(0x0000_1000, 0).unwrap();
    flash.write(BASE, &[0; 8]).unwrap();

    assert!(!sim.violations().iter().any(|v| matches!(
        v,
        Violation::WrongKey { .. } | Violation::KeyWhileUnlocked { .. }
    )));
}

#[test]
fn test_dyn_progmem() {
    let sim = sim(&BoardConfig::stm32l4(128));
    let flash = driver(&sim);
    let dev: &dyn ProgMem = &flash;

    assert_eq!(dev.total_size(), 128 * 2048);
    let page = dev.page_index(BASE + 5000).unwrap();
    assert_eq!(page, 2);
    assert_eq!(dev.erase_page(page), Ok(PAGE));
    assert_eq!(dev.write(BASE + 4096, &[1, 2, 3, 4]), Ok(4));
    assert_eq!(dev.is_page_erased(page), Ok(4));
}
