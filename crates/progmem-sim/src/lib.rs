//! progmem-sim - Simulated STM32L4 flash controller
//!
//! This crate provides [`SimController`], an in-memory model of the STM32L4
//! FLASH register block and the flash array behind it. It implements
//! [`progmem_core::bus::FlashBus`], so the real driver can run against it
//! on a host for testing and for the `progmem` command line tool.
//!
//! The model follows the reference manual closely enough to catch
//! sequencing mistakes:
//!
//! - FLASH_CR is locked at reset and only opens for the right key pair; a
//!   wrong key locks the controller until [`SimController::reset`]
//! - page erase and double-word programming raise BSY for a configurable
//!   number of status reads
//! - WRPERR, PGAERR, PGSERR and PROGERR are raised where the hardware
//!   would raise them, and the status register is write-one-to-clear
//! - every mode window (page erase, program, option program) is logged with
//!   the thread that opened it, and protocol violations are recorded
//!
//! Faults can be injected: write-protected pages, cells stuck at one (a
//! program verify failure) and bytes stuck at a value after erase (an
//! erase verify failure).

mod controller;
mod error;
mod image;

#[cfg(test)]
mod driver_tests;

pub use controller::{Mode, ModeEvent, SimController, Violation};
pub use error::{Result, SimError};

use progmem_core::board::BoardConfig;
use progmem_core::geometry::FlashGeometry;

/// Reset value of FLASH_OPTR on a factory-fresh STM32L476 (RDP level 0)
pub const FACTORY_OPTR: u32 = 0xFFEF_F8AA;

/// Configuration for the simulated controller
#[derive(Debug, Clone, Copy)]
pub struct SimConfig {
    /// Array shape and location
    pub geometry: FlashGeometry,
    /// Address of the FLASH register block
    pub regs_base: u32,
    /// Number of FLASH_SR reads that report BSY after an operation starts
    pub busy_polls: u32,
    /// Option bytes loaded into FLASH_OPTR at reset
    pub option_bytes: u32,
}

impl SimConfig {
    /// Simulate the controller of the given board
    pub fn from_board(board: &BoardConfig) -> Self {
        Self {
            geometry: board.geometry(),
            regs_base: board.regs_base,
            busy_polls: 2,
            option_bytes: FACTORY_OPTR,
        }
    }

    /// Set the number of busy polls per operation
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::from_board(&BoardConfig::default())
    }
}
