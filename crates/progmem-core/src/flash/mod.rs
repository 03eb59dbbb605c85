//! The flash driver
//!
//! [`Flash`] owns the register interface to the FLASH controller and the
//! gate that serializes access to it. Every operation follows the same
//! shape:
//!
//! 1. validate the request without touching the hardware
//! 2. acquire the gate and unlock the controller
//! 3. enter a mode (page erase, program, option program), run it and wait
//!    for BSY to clear
//! 4. leave the mode, clear any error flags and re-lock
//! 5. verify by reading the array back, still holding the gate
//!
//! [`ProgMem`] is the page-oriented view of the same operations used by a
//! block/MTD layer.

mod device;
mod erase;
mod options;
mod program;

pub use device::ProgMem;

use crate::board::BoardConfig;
use crate::bus::{FlashBus, Stall};
use crate::error::Result;
use crate::gate::{Gate, GateGuard};
use crate::geometry::FlashGeometry;
use crate::regs::{Cr, Registers};
use crate::sequencer;
use crate::state::ControllerState;

/// STM32L4 internal flash driver
#[derive(Debug)]
pub struct Flash<B, S> {
    regs: Registers<B>,
    geometry: FlashGeometry,
    stall: S,
    gate: Gate<ControllerState>,
}

impl<B: FlashBus, S: Stall> Flash<B, S> {
    /// Create a driver for the board described by `config`
    ///
    /// Panics if `config` does not pass [`BoardConfig::validate`].
    pub fn new(bus: B, stall: S, config: &BoardConfig) -> Self {
        Self::with_geometry(bus, stall, config.regs_base, config.geometry())
    }

    /// Create a driver from an explicit register base and array geometry
    pub fn with_geometry(bus: B, stall: S, regs_base: u32, geometry: FlashGeometry) -> Self {
        log::debug!(
            "flash at 0x{:08X}: {} pages of {} bytes, registers at 0x{:08X}",
            geometry.base(),
            geometry.page_count(),
            geometry.page_size(),
            regs_base
        );
        Self {
            regs: Registers::new(bus, regs_base),
            geometry,
            stall,
            gate: Gate::new(ControllerState::Idle),
        }
    }

    /// Array geometry
    pub fn geometry(&self) -> &FlashGeometry {
        &self.geometry
    }

    /// Unlock FLASH_CR
    ///
    /// For callers that drive the controller directly. The driver's own
    /// operations unlock and re-lock on their own.
    pub fn unlock(&self) {
        let _session = self.session();
        sequencer::unlock_main(&self.regs, &self.stall);
    }

    /// Lock FLASH_CR (and the option bytes). Harmless when already locked.
    pub fn lock(&self) {
        let _session = self.session();
        sequencer::lock_main(&self.regs);
    }

    /// Current controller mode as tracked by the driver
    ///
    /// Always idle between calls; blocks while an operation is running.
    pub fn state(&self) -> ControllerState {
        *self.gate.acquire(&self.stall)
    }

    /// Acquire the gate for the duration of one operation
    fn session(&self) -> Session<'_, B> {
        Session {
            regs: &self.regs,
            state: self.gate.acquire(&self.stall),
        }
    }
}

/// Exclusive use of the controller, released on drop
struct Session<'a, B> {
    regs: &'a Registers<B>,
    state: GateGuard<'a, ControllerState>,
}

impl<B: FlashBus> Session<'_, B> {
    /// Move to `next` and set its mode bits
    ///
    /// Stale error flags from an earlier operation would make the controller
    /// refuse to start, so they are cleared first.
    fn enter(&mut self, next: ControllerState, bits: Cr) -> Result<()> {
        self.state.transition(next)?;
        let stale = self.regs.sr().errors();
        if !stale.is_empty() {
            log::debug!("clearing stale flash errors {:?}", stale);
            self.regs.clear_sr(stale);
        }
        self.regs.modify_cr(Cr::empty(), bits);
        Ok(())
    }

    /// Clear the mode bits and return to idle
    ///
    /// Must only follow a successful [`Session::enter`].
    fn leave(&mut self, bits: Cr) {
        self.regs.modify_cr(bits, Cr::empty());
        let _ = self.state.transition(ControllerState::Idle);
    }
}
