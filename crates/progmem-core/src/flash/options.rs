//! User option bytes
//!
//! FLASH_OPTR holds the user option bytes (read protection level, BOR
//! level, reset behaviour, boot configuration). A new value is written to
//! the register and committed with OPTSTRT; it takes effect at the next
//! power-on reset or option byte reload. The read protection level can
//! never be changed through this driver.

use super::Flash;
use crate::bus::{FlashBus, Stall};
use crate::error::{Error, Result, VerifyFailure};
use crate::regs::{Cr, Sr, OPTR_RDP_MASK};
use crate::sequencer::{lock_options, unlock_options, wait_while_busy};
use crate::state::ControllerState;

impl<B: FlashBus, S: Stall> Flash<B, S> {
    /// Current FLASH_OPTR value
    pub fn option_bytes(&self) -> u32 {
        let _session = self.session();
        self.regs.optr()
    }

    /// Clear the bits in `clear`, then set the bits in `set`
    ///
    /// Masks that touch the RDP field are refused before any register is
    /// accessed. Returns the value of FLASH_OPTR after programming.
    ///
    /// # Errors
    /// * `PreconditionViolation` - `clear` or `set` touches the RDP field
    /// * `Io` - the controller raised an error flag (OPTVERR, WRPERR,
    ///   PGSERR...) during programming; the flags are cleared and the
    ///   options re-locked before returning
    pub fn modify_option_bytes(&self, clear: u32, set: u32) -> Result<u32> {
        if (clear | set) & OPTR_RDP_MASK != 0 {
            let err = Error::PreconditionViolation { clear, set };
            log::error!("{}", err);
            return Err(err);
        }
        let clear = clear & !OPTR_RDP_MASK;
        let set = set & !OPTR_RDP_MASK;

        let mut session = self.session();
        unlock_options(&self.regs, &self.stall);

        let before = self.regs.optr();
        let value = (before & !clear) | set;
        log::info!("flash option bytes before: 0x{:08x}", before);

        self.regs.write_optr(value);
        let started = session.enter(ControllerState::OptionProgramming, Cr::OPTSTRT);
        let mut raised = Sr::empty();
        if started.is_ok() {
            let sr = wait_while_busy(&self.regs, &self.stall);
            session.leave(Cr::empty());

            let errors = sr.errors();
            if !errors.is_empty() {
                log::error!("option byte programming raised {:?}", errors);
                self.regs.clear_sr(errors);
                raised = errors;
            }
        }

        let after = self.regs.optr();
        lock_options(&self.regs);
        started?;
        if !raised.is_empty() {
            return Err(VerifyFailure::OptionBytes {
                value,
                status: raised.bits(),
            }
            .into());
        }

        log::info!("flash option bytes after: 0x{:08x}", after);
        Ok(after)
    }
}
