//! Register-level model of the FLASH controller

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use progmem_core::bus::FlashBus;
use progmem_core::geometry::FlashGeometry;
use progmem_core::regs::{
    Cr, Sr, ERASED_BYTE, FLASH_KEY1, FLASH_KEY2, OPTKEY1, OPTKEY2, REGS_SIZE, REG_ACR, REG_CR,
    REG_KEYR, REG_OPTKEYR, REG_OPTR, REG_SR,
};

use crate::SimConfig;

/// A controller operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// PER set
    PageErase,
    /// PG set
    Program,
    /// OPTSTRT until BSY clears
    OptionProgram,
}

/// A mode being switched on or off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeEvent {
    /// Which mode
    pub mode: Mode,
    /// Switched on (true) or off (false)
    pub enabled: bool,
    /// Thread whose register write caused the change
    pub thread: ThreadId,
}

/// A protocol mistake made by whoever drives the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    /// A key register write that does not match the expected key
    WrongKey {
        /// Register offset (KEYR or OPTKEYR)
        reg: u32,
        /// Value written
        value: u32,
    },
    /// A key written while the matching lock was already open
    KeyWhileUnlocked {
        /// Register offset (KEYR or OPTKEYR)
        reg: u32,
    },
    /// FLASH_CR written while LOCK is set
    LockedWrite {
        /// Value written
        value: u32,
    },
    /// FLASH_OPTR written or OPTSTRT set while OPTLOCK is set
    OptionsLocked,
    /// A mode bit changed while BSY is set
    ModeChangeWhileBusy {
        /// Mode that changed
        mode: Mode,
    },
    /// A mode was enabled while another one was active
    OverlappingModes {
        /// Mode already active
        active: Mode,
        /// Mode being enabled
        requested: Mode,
    },
    /// Array written without PG
    WriteWithoutProgram {
        /// Address written
        addr: u32,
    },
    /// Access outside the register block and the array
    Unmapped {
        /// Address accessed
        addr: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyStage {
    First,
    Second,
}

#[derive(Debug)]
struct KeyLock {
    keys: [u32; 2],
    stage: KeyStage,
}

impl KeyLock {
    fn new(keys: [u32; 2]) -> Self {
        Self {
            keys,
            stage: KeyStage::First,
        }
    }

    /// Feed one key word; `Some(true)` when the sequence completed
    fn feed(&mut self, value: u32) -> Option<bool> {
        match self.stage {
            KeyStage::First if value == self.keys[0] => {
                self.stage = KeyStage::Second;
                Some(false)
            }
            KeyStage::Second if value == self.keys[1] => {
                self.stage = KeyStage::First;
                Some(true)
            }
            _ => {
                self.stage = KeyStage::First;
                None
            }
        }
    }
}

#[derive(Debug)]
enum Pending {
    Erase,
    Options,
    Program,
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    array: Vec<u8>,

    acr: u32,
    cr: Cr,
    sr: Sr,
    optr: u32,
    option_bytes: u32,

    main_keys: KeyLock,
    option_keys: KeyLock,
    locked_out: bool,

    busy: u32,
    pending: Option<Pending>,
    option_thread: Option<ThreadId>,
    first_word: Option<(u32, u32)>,

    protected: BTreeSet<usize>,
    stuck_ones: BTreeMap<u32, u8>,
    stuck_bytes: BTreeMap<u32, u8>,
    option_fault: Sr,

    register_writes: usize,
    optr_writes: Vec<u32>,
    events: Vec<ModeEvent>,
    violations: Vec<Violation>,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        Self {
            array: vec![ERASED_BYTE; config.geometry.size()],
            acr: 0x0000_0600,
            cr: Cr::LOCK | Cr::OPTLOCK,
            sr: Sr::empty(),
            optr: config.option_bytes,
            option_bytes: config.option_bytes,
            main_keys: KeyLock::new([FLASH_KEY1, FLASH_KEY2]),
            option_keys: KeyLock::new([OPTKEY1, OPTKEY2]),
            locked_out: false,
            busy: 0,
            pending: None,
            option_thread: None,
            first_word: None,
            protected: BTreeSet::new(),
            stuck_ones: BTreeMap::new(),
            stuck_bytes: BTreeMap::new(),
            option_fault: Sr::empty(),
            register_writes: 0,
            optr_writes: Vec::new(),
            events: Vec::new(),
            violations: Vec::new(),
            config,
        }
    }

    fn geometry(&self) -> &FlashGeometry {
        &self.config.geometry
    }

    /// Offset into the array of an absolute address
    fn array_offset(&self, addr: u32) -> Option<usize> {
        let base = self.geometry().base();
        let offset = addr.checked_sub(base)? as usize;
        (offset < self.array.len()).then_some(offset)
    }

    fn register(&self, addr: u32) -> Option<u32> {
        let base = self.config.regs_base;
        let offset = addr.checked_sub(base)?;
        (offset < REGS_SIZE).then_some(offset)
    }

    fn violation(&mut self, v: Violation) {
        log::warn!("flash protocol violation: {:?}", v);
        self.violations.push(v);
    }

    fn event(&mut self, mode: Mode, enabled: bool, thread: ThreadId) {
        log::trace!("{:?} {}", mode, if enabled { "on" } else { "off" });
        self.events.push(ModeEvent {
            mode,
            enabled,
            thread,
        });
    }

    fn active_modes(&self) -> Vec<Mode> {
        let mut modes = Vec::new();
        if self.cr.contains(Cr::PER) {
            modes.push(Mode::PageErase);
        }
        if self.cr.contains(Cr::PG) {
            modes.push(Mode::Program);
        }
        if self.option_thread.is_some() {
            modes.push(Mode::OptionProgram);
        }
        modes
    }

    fn start_busy(&mut self, op: Pending) {
        self.pending = Some(op);
        self.busy = self.config.busy_polls;
        if self.busy == 0 {
            self.finish();
        }
    }

    fn finish(&mut self) {
        match self.pending.take() {
            Some(Pending::Erase) => self.cr.remove(Cr::STRT),
            Some(Pending::Options) => {
                self.cr.remove(Cr::OPTSTRT);
                if let Some(thread) = self.option_thread.take() {
                    self.event(Mode::OptionProgram, false, thread);
                }
            }
            Some(Pending::Program) | None => {}
        }
    }

    fn read_sr(&mut self) -> u32 {
        if self.busy > 0 {
            self.busy -= 1;
            let sr = self.sr | Sr::BSY;
            if self.busy == 0 {
                self.finish();
            }
            sr.bits()
        } else {
            self.sr.bits()
        }
    }

    fn read32(&mut self, addr: u32) -> u32 {
        if let Some(offset) = self.array_offset(addr) {
            let mut word = [ERASED_BYTE; 4];
            for (i, byte) in word.iter_mut().enumerate() {
                *byte = self.array.get(offset + i).copied().unwrap_or(ERASED_BYTE);
            }
            return u32::from_le_bytes(word);
        }
        match self.register(addr) {
            Some(REG_ACR) => self.acr,
            Some(REG_SR) => self.read_sr(),
            Some(REG_CR) => self.cr.bits(),
            Some(REG_OPTR) => self.optr,
            Some(_) => 0,
            None => {
                self.violation(Violation::Unmapped { addr });
                0
            }
        }
    }

    fn read8(&mut self, addr: u32) -> u8 {
        match self.array_offset(addr) {
            Some(offset) => self.array[offset],
            None => {
                let shift = (addr & 3) * 8;
                (self.read32(addr & !3) >> shift) as u8
            }
        }
    }

    fn write32(&mut self, addr: u32, value: u32) {
        if self.array_offset(addr).is_some() {
            self.write_array(addr, value);
            return;
        }
        let Some(reg) = self.register(addr) else {
            self.violation(Violation::Unmapped { addr });
            return;
        };
        self.register_writes += 1;
        match reg {
            REG_ACR => self.acr = value,
            REG_KEYR => self.write_keyr(value),
            REG_OPTKEYR => self.write_optkeyr(value),
            REG_SR => self.sr.remove(Sr::from_bits_truncate(value) & Sr::CLEARABLE),
            REG_CR => self.write_cr(Cr::from_bits_retain(value)),
            REG_OPTR => {
                if self.cr.contains(Cr::OPTLOCK) {
                    self.violation(Violation::OptionsLocked);
                } else {
                    self.optr = value;
                }
            }
            _ => log::debug!("ignoring write to FLASH register offset 0x{:02X}", reg),
        }
    }

    fn write_keyr(&mut self, value: u32) {
        if self.locked_out {
            return;
        }
        if !self.cr.contains(Cr::LOCK) {
            self.violation(Violation::KeyWhileUnlocked { reg: REG_KEYR });
            return;
        }
        match self.main_keys.feed(value) {
            Some(true) => {
                log::debug!("FLASH_CR unlocked");
                self.cr.remove(Cr::LOCK);
            }
            Some(false) => {}
            None => {
                self.violation(Violation::WrongKey {
                    reg: REG_KEYR,
                    value,
                });
                self.locked_out = true;
            }
        }
    }

    fn write_optkeyr(&mut self, value: u32) {
        if self.locked_out || self.cr.contains(Cr::LOCK) {
            self.violation(Violation::LockedWrite { value });
            return;
        }
        if !self.cr.contains(Cr::OPTLOCK) {
            self.violation(Violation::KeyWhileUnlocked { reg: REG_OPTKEYR });
            return;
        }
        match self.option_keys.feed(value) {
            Some(true) => {
                log::debug!("option bytes unlocked");
                self.cr.remove(Cr::OPTLOCK);
            }
            Some(false) => {}
            None => {
                self.violation(Violation::WrongKey {
                    reg: REG_OPTKEYR,
                    value,
                });
                self.locked_out = true;
                self.cr.insert(Cr::LOCK | Cr::OPTLOCK);
            }
        }
    }

    fn write_cr(&mut self, new: Cr) {
        let old = self.cr;
        if old.contains(Cr::LOCK) {
            // Writing with LOCK set keeps it locked; anything else is refused
            if !new.contains(Cr::LOCK) || new.intersects(Cr::MODES | Cr::STRT | Cr::OPTSTRT) {
                self.violation(Violation::LockedWrite { value: new.bits() });
            }
            return;
        }

        let thread = thread::current().id();
        let changed = (old ^ new) & Cr::MODES;
        if !changed.is_empty() && self.busy > 0 {
            for mode in modes_of(changed) {
                self.violation(Violation::ModeChangeWhileBusy { mode });
            }
        }

        for (bit, mode) in [(Cr::PER, Mode::PageErase), (Cr::PG, Mode::Program)] {
            if !old.contains(bit) && new.contains(bit) {
                for active in self.active_modes() {
                    self.violation(Violation::OverlappingModes {
                        active,
                        requested: mode,
                    });
                }
                self.event(mode, true, thread);
            }
        }
        for (bit, mode) in [(Cr::PER, Mode::PageErase), (Cr::PG, Mode::Program)] {
            if old.contains(bit) && !new.contains(bit) {
                self.event(mode, false, thread);
            }
        }
        if old.contains(Cr::PG) && !new.contains(Cr::PG) {
            self.first_word = None;
        }

        // LOCK and OPTLOCK can only be set by software; STRT and OPTSTRT are
        // cleared by hardware
        let mut next = new - (Cr::STRT | Cr::OPTSTRT);
        next |= old & (Cr::STRT | Cr::OPTSTRT | Cr::OPTLOCK);
        if next.contains(Cr::LOCK) {
            next |= Cr::OPTLOCK;
        }
        self.cr = next;

        if new.contains(Cr::STRT) && !old.contains(Cr::STRT) {
            self.start_erase(thread);
        }
        if new.contains(Cr::OPTSTRT) && !old.contains(Cr::OPTSTRT) {
            self.start_option_program(thread);
        }
    }

    fn start_erase(&mut self, _thread: ThreadId) {
        if !self.cr.contains(Cr::PER) {
            log::debug!("STRT without PER, ignored");
            return;
        }
        self.cr.insert(Cr::STRT);
        let (bank, pnb) = (self.cr.bank(), self.cr.page_number());
        let geometry = *self.geometry();
        match geometry.page_in_bank(bank, pnb) {
            Some(page) if self.protected.contains(&page.index()) => {
                log::debug!("page {} is write protected", page);
                self.sr.insert(Sr::WRPERR);
            }
            Some(page) => {
                let start = page.index() * geometry.page_size();
                self.array[start..start + geometry.page_size()].fill(ERASED_BYTE);
                let stuck: Vec<(u32, u8)> = self
                    .stuck_bytes
                    .range(geometry.page_range(page))
                    .map(|(&addr, &value)| (addr, value))
                    .collect();
                for (addr, value) in stuck {
                    if let Some(offset) = self.array_offset(addr) {
                        self.array[offset] = value;
                    }
                }
                log::debug!("erased page {} (bank {} page {})", page, bank, pnb);
            }
            None => self.sr.insert(Sr::PGSERR),
        }
        self.start_busy(Pending::Erase);
    }

    fn start_option_program(&mut self, thread: ThreadId) {
        if self.cr.contains(Cr::OPTLOCK) {
            self.violation(Violation::OptionsLocked);
            return;
        }
        for active in self.active_modes() {
            self.violation(Violation::OverlappingModes {
                active,
                requested: Mode::OptionProgram,
            });
        }
        self.cr.insert(Cr::OPTSTRT);
        self.event(Mode::OptionProgram, true, thread);
        self.option_thread = Some(thread);
        if self.option_fault.is_empty() {
            self.option_bytes = self.optr;
            self.optr_writes.push(self.optr);
        } else {
            log::debug!("option programming fails with {:?}", self.option_fault);
            self.sr.insert(self.option_fault);
        }
        self.start_busy(Pending::Options);
    }

    fn write_array(&mut self, addr: u32, value: u32) {
        if !self.cr.contains(Cr::PG) {
            self.violation(Violation::WriteWithoutProgram { addr });
            self.sr.insert(Sr::PGSERR);
            return;
        }
        if !self.sr.errors().is_empty() {
            self.sr.insert(Sr::PGSERR);
            self.first_word = None;
            return;
        }

        let Some((first, low)) = self.first_word.take() else {
            if addr % 8 != 0 {
                self.sr.insert(Sr::PGAERR);
            } else {
                self.first_word = Some((addr, value));
            }
            return;
        };
        if addr != first + 4 {
            self.sr.insert(Sr::PGAERR);
            return;
        }
        self.program_double_word(first, u64::from(low) | (u64::from(value) << 32));
    }

    fn program_double_word(&mut self, addr: u32, data: u64) {
        let geometry = *self.geometry();
        let Some(offset) = self.array_offset(addr) else {
            return;
        };
        let page = offset / geometry.page_size();
        if self.protected.contains(&page) {
            self.sr.insert(Sr::WRPERR);
            self.start_busy(Pending::Program);
            return;
        }

        let bytes = data.to_le_bytes();
        let target = &self.array[offset..offset + 8];
        if data != 0 && target.iter().any(|&b| b != ERASED_BYTE) {
            self.sr.insert(Sr::PROGERR);
            self.start_busy(Pending::Program);
            return;
        }
        for (i, byte) in bytes.iter().enumerate() {
            let stuck = self
                .stuck_ones
                .get(&(addr + i as u32))
                .copied()
                .unwrap_or(0);
            self.array[offset + i] &= byte | stuck;
        }
        self.start_busy(Pending::Program);
    }

    fn reset(&mut self) {
        self.cr = Cr::LOCK | Cr::OPTLOCK;
        self.sr = Sr::empty();
        self.optr = self.option_bytes;
        self.main_keys = KeyLock::new([FLASH_KEY1, FLASH_KEY2]);
        self.option_keys = KeyLock::new([OPTKEY1, OPTKEY2]);
        self.locked_out = false;
        self.busy = 0;
        self.pending = None;
        self.option_thread = None;
        self.first_word = None;
    }
}

fn modes_of(bits: Cr) -> Vec<Mode> {
    let mut modes = Vec::new();
    if bits.contains(Cr::PER) {
        modes.push(Mode::PageErase);
    }
    if bits.contains(Cr::PG) {
        modes.push(Mode::Program);
    }
    modes
}

/// Simulated FLASH controller and array
///
/// All state sits behind a mutex, so one controller can be shared by
/// reference between threads exactly like the memory-mapped peripheral.
#[derive(Debug)]
pub struct SimController {
    state: Mutex<SimState>,
}

impl SimController {
    /// Create a controller with an erased array, locked as after reset
    pub fn new(config: SimConfig) -> Self {
        log::debug!(
            "simulated flash: {} pages of {} bytes at 0x{:08X}",
            config.geometry.page_count(),
            config.geometry.page_size(),
            config.geometry.base()
        );
        Self {
            state: Mutex::new(SimState::new(config)),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configuration the controller was created with
    pub fn config(&self) -> SimConfig {
        self.state().config
    }

    /// Power-on reset: lock everything, clear status, reload option bytes
    ///
    /// The array contents and injected faults survive.
    pub fn reset(&self) {
        self.state().reset();
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// FLASH_CR
    pub fn cr(&self) -> Cr {
        self.state().cr
    }

    /// FLASH_SR without consuming a busy poll
    pub fn sr(&self) -> Sr {
        let state = self.state();
        if state.busy > 0 {
            state.sr | Sr::BSY
        } else {
            state.sr
        }
    }

    /// FLASH_OPTR
    pub fn optr(&self) -> u32 {
        self.state().optr
    }

    /// Option bytes that will be loaded at the next reset
    pub fn option_bytes(&self) -> u32 {
        self.state().option_bytes
    }

    /// Every value committed with OPTSTRT, oldest first
    pub fn optr_writes(&self) -> Vec<u32> {
        self.state().optr_writes.clone()
    }

    /// Number of writes to the register block
    pub fn register_writes(&self) -> usize {
        self.state().register_writes
    }

    /// Mode windows opened and closed, in order
    pub fn mode_events(&self) -> Vec<ModeEvent> {
        self.state().events.clone()
    }

    /// Protocol violations seen so far
    pub fn violations(&self) -> Vec<Violation> {
        self.state().violations.clone()
    }

    /// Whether a wrong key has locked the controller until reset
    pub fn is_locked_out(&self) -> bool {
        self.state().locked_out
    }

    /// Forget the register write count, mode events and violations
    pub fn clear_log(&self) {
        let mut state = self.state();
        state.register_writes = 0;
        state.events.clear();
        state.violations.clear();
        state.optr_writes.clear();
    }

    /// Copy of the whole array
    pub fn data(&self) -> Vec<u8> {
        self.state().array.clone()
    }

    /// Copy of `len` bytes at an offset into the array
    pub fn read_array(&self, offset: usize, len: usize) -> Vec<u8> {
        let state = self.state();
        let end = (offset + len).min(state.array.len());
        state.array.get(offset..end).map(<[u8]>::to_vec).unwrap_or_default()
    }

    /// Overwrite array contents directly, bypassing the controller
    pub fn fill(&self, offset: usize, data: &[u8]) {
        let mut state = self.state();
        let end = (offset + data.len()).min(state.array.len());
        if offset < end {
            let len = end - offset;
            state.array[offset..end].copy_from_slice(&data[..len]);
        }
    }

    pub(crate) fn with_array<T>(&self, f: impl FnOnce(&mut Vec<u8>) -> T) -> T {
        f(&mut self.state().array)
    }

    // ---------------------------------------------------------------------
    // Fault injection
    // ---------------------------------------------------------------------

    /// Write-protect a page: erase and program raise WRPERR
    pub fn protect_page(&self, page: usize) {
        self.state().protected.insert(page);
    }

    /// Remove write protection from a page
    pub fn unprotect_page(&self, page: usize) {
        self.state().protected.remove(&page);
    }

    /// Make the bits in `mask` of the byte at `addr` unprogrammable
    pub fn stick_bits(&self, addr: u32, mask: u8) {
        *self.state().stuck_ones.entry(addr).or_insert(0) |= mask;
    }

    /// Make the byte at `addr` read `value` after every erase
    pub fn stick_byte(&self, addr: u32, value: u8) {
        self.state().stuck_bytes.insert(addr, value);
    }

    /// Make every option programming raise `flags` without committing
    ///
    /// An empty set restores normal behaviour.
    pub fn fail_option_program(&self, flags: Sr) {
        self.state().option_fault = flags & Sr::CLEARABLE;
    }

    /// Raise status flags as if an earlier operation had failed
    pub fn raise_status(&self, flags: Sr) {
        self.state().sr.insert(flags & Sr::CLEARABLE);
    }
}

impl FlashBus for SimController {
    fn read32(&self, addr: u32) -> u32 {
        self.state().read32(addr)
    }

    fn write32(&self, addr: u32, value: u32) {
        self.state().write32(addr, value)
    }

    fn read8(&self, addr: u32) -> u8 {
        self.state().read8(addr)
    }
}
