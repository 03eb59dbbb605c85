//! Unlock and lock sequences
//!
//! FLASH_CR is locked after reset. Writing KEY1 then KEY2 to FLASH_KEYR
//! unlocks it; a wrong key locks the controller until the next reset, so the
//! keys are only written when the lock bit is actually set. The option bytes
//! have a second lock (OPTLOCK) with their own key pair, which can only be
//! opened once FLASH_CR itself is unlocked.
//!
//! These functions assume the caller holds the controller gate.

use crate::bus::{FlashBus, Stall};
use crate::regs::{Cr, Registers, Sr, FLASH_KEY1, FLASH_KEY2, OPTKEY1, OPTKEY2};

/// An unlock key pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPair(pub u32, pub u32);

/// Keys for FLASH_KEYR
pub const MAIN_KEYS: KeyPair = KeyPair(FLASH_KEY1, FLASH_KEY2);
/// Keys for FLASH_OPTKEYR
pub const OPTION_KEYS: KeyPair = KeyPair(OPTKEY1, OPTKEY2);

/// Words to write to a key register given the current lock state
///
/// Returns `None` when already unlocked: writing a key to an unlocked
/// controller is a sequence error.
pub const fn key_sequence(locked: bool, keys: &KeyPair) -> Option<[u32; 2]> {
    if locked {
        Some([keys.0, keys.1])
    } else {
        None
    }
}

/// Spin until BSY clears, returning the final status
pub fn wait_while_busy<B: FlashBus, S: Stall + ?Sized>(regs: &Registers<B>, stall: &S) -> Sr {
    let mut polls = 0u32;
    loop {
        let sr = regs.sr();
        if !sr.contains(Sr::BSY) {
            if polls > 0 {
                log::trace!("busy for {} polls, SR={:?}", polls, sr);
            }
            return sr;
        }
        polls = polls.wrapping_add(1);
        stall.stall();
    }
}

/// Unlock FLASH_CR if it is locked
pub fn unlock_main<B: FlashBus, S: Stall + ?Sized>(regs: &Registers<B>, stall: &S) {
    wait_while_busy(regs, stall);

    if let Some(keys) = key_sequence(regs.cr().contains(Cr::LOCK), &MAIN_KEYS) {
        log::debug!("unlocking FLASH_CR");
        for key in keys {
            regs.write_keyr(key);
        }
    }
}

/// Lock FLASH_CR
///
/// Setting LOCK also re-locks the option bytes. Locking twice is harmless.
pub fn lock_main<B: FlashBus>(regs: &Registers<B>) {
    regs.modify_cr(Cr::empty(), Cr::LOCK);
    log::debug!("locked FLASH_CR");
}

/// Unlock FLASH_CR and then the option bytes
pub fn unlock_options<B: FlashBus, S: Stall + ?Sized>(regs: &Registers<B>, stall: &S) {
    unlock_main(regs, stall);

    if let Some(keys) = key_sequence(regs.cr().contains(Cr::OPTLOCK), &OPTION_KEYS) {
        log::debug!("unlocking option bytes");
        for key in keys {
            regs.write_optkeyr(key);
        }
    }
}

/// Lock the option bytes (and FLASH_CR with them)
pub fn lock_options<B: FlashBus>(regs: &Registers<B>) {
    lock_main(regs);
}
