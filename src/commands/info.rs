//! Info command implementation

use progmem_core::bus::{FlashBus, Stall};
use progmem_core::regs::OPTR_RDP_MASK;
use progmem_core::Flash;

use super::format_size;
use crate::boards::ResolvedBoard;

/// Readout protection level encoded in the RDP byte of FLASH_OPTR
pub fn rdp_level(optr: u32) -> &'static str {
    match optr & OPTR_RDP_MASK {
        0xAA => "Level 0 (no protection)",
        0xCC => "Level 2 (chip protection)",
        _ => "Level 1 (read protection)",
    }
}

/// Print board geometry, clocks and option bytes
pub fn run_info<B: FlashBus, S: Stall>(flash: &Flash<B, S>, board: &ResolvedBoard) {
    let geometry = flash.geometry();
    let config = &board.config;

    println!("Board: {} ({})", board.name, board.description);
    println!(
        "Flash: {} at 0x{:08X}, {} pages of {} bytes",
        format_size(geometry.size()),
        geometry.base(),
        geometry.page_count(),
        geometry.page_size()
    );
    if geometry.is_dual_bank() {
        println!("Banks: 2 x {} pages", geometry.bank_pages());
    }
    println!("Registers: 0x{:08X}", config.regs_base);
    println!(
        "Clocks: sysclk {} Hz, standby {} Hz",
        config.sysclk_hz, config.standby_clk_hz
    );

    let optr = flash.option_bytes();
    println!("Option bytes: 0x{:08X}", optr);
    println!("  RDP: {}", rdp_level(optr));
}
