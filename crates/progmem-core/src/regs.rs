//! STM32L4 FLASH controller register definitions
//!
//! Register offsets and bit definitions for the embedded flash interface,
//! as described in RM0351 (STM32L4x5/x6) and RM0394 (STM32L4x1/x2/x3).
//!
//! [`Registers`] is a thin typed view over a [`FlashBus`] that the driver uses
//! for every controller access.

use crate::bus::FlashBus;
use bitflags::bitflags;

/// Reset address of the FLASH register block.
pub const FLASH_REGS_BASE: u32 = 0x4002_2000;

/// Access Control register (32 bits)
pub const REG_ACR: u32 = 0x00;
/// Key register (32 bits, write only)
pub const REG_KEYR: u32 = 0x08;
/// Option Key register (32 bits, write only)
pub const REG_OPTKEYR: u32 = 0x0C;
/// Status register (32 bits)
pub const REG_SR: u32 = 0x10;
/// Control register (32 bits)
pub const REG_CR: u32 = 0x14;
/// ECC register (32 bits)
pub const REG_ECCR: u32 = 0x18;
/// Option register (32 bits)
pub const REG_OPTR: u32 = 0x20;

/// Size of the register block in bytes
pub const REGS_SIZE: u32 = 0x400;

/// First word of the main array unlock sequence
pub const FLASH_KEY1: u32 = 0x4567_0123;
/// Second word of the main array unlock sequence
pub const FLASH_KEY2: u32 = 0xCDEF_89AB;
/// First word of the option byte unlock sequence
pub const OPTKEY1: u32 = 0x0819_2A3B;
/// Second word of the option byte unlock sequence
pub const OPTKEY2: u32 = 0x4C5D_6E7F;

/// Read protection level field of FLASH_OPTR.
///
/// 0xAA is level 0, 0xCC is level 2 (permanent), anything else is level 1.
pub const OPTR_RDP_MASK: u32 = 0x0000_00FF;

/// Value of an erased byte.
pub const ERASED_BYTE: u8 = 0xFF;
/// Value of an erased word.
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;

/// Programming unit in bytes
pub const DOUBLE_WORD: usize = 8;
/// Width of a single bus write to the array
pub const WORD: usize = 4;

bitflags! {
    /// FLASH_CR bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cr: u32 {
        /// Programming
        const PG         = 1 << 0;
        /// Page erase
        const PER        = 1 << 1;
        /// Bank 1 mass erase
        const MER1       = 1 << 2;
        /// Page number selection within a bank
        const PNB        = 0xFF << 3;
        /// Bank selection for page erase on dual-bank parts
        const BKER       = 1 << 11;
        /// Bank 2 mass erase
        const MER2       = 1 << 15;
        /// Start an erase operation
        const STRT       = 1 << 16;
        /// Start option modification
        const OPTSTRT    = 1 << 17;
        /// Fast programming
        const FSTPG      = 1 << 18;
        /// End of operation interrupt enable
        const EOPIE      = 1 << 24;
        /// Error interrupt enable
        const ERRIE      = 1 << 25;
        /// PCROP read error interrupt enable
        const RDERRIE    = 1 << 26;
        /// Force the option byte loading
        const OBL_LAUNCH = 1 << 27;
        /// Options lock
        const OPTLOCK    = 1 << 30;
        /// FLASH_CR lock
        const LOCK       = 1 << 31;

        /// Bits that select an operating mode of the controller
        const MODES = Self::PG.bits() | Self::PER.bits() | Self::MER1.bits()
            | Self::MER2.bits() | Self::FSTPG.bits();
    }
}

impl Cr {
    /// Bit offset of the PNB field
    pub const PNB_SHIFT: u32 = 3;

    /// Encode a page index within its bank into the PNB field
    ///
    /// The index must fit the 8-bit field.
    pub const fn pnb(page: usize) -> Self {
        debug_assert!(page <= 0xFF);
        Self::from_bits_retain(((page as u32) << Self::PNB_SHIFT) & Self::PNB.bits())
    }

    /// Select page `pnb` of `bank` (0 or 1) for erase
    pub const fn page_select(bank: usize, pnb: usize) -> Self {
        let bker = if bank != 0 { Self::BKER.bits() } else { 0 };
        Self::from_bits_retain(Self::pnb(pnb).bits() | bker)
    }

    /// Decode the PNB field
    pub const fn page_number(self) -> usize {
        ((self.bits() & Self::PNB.bits()) >> Self::PNB_SHIFT) as usize
    }

    /// Bank selected by BKER
    pub const fn bank(self) -> usize {
        if self.bits() & Self::BKER.bits() != 0 {
            1
        } else {
            0
        }
    }
}

bitflags! {
    /// FLASH_SR bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sr: u32 {
        /// End of operation
        const EOP     = 1 << 0;
        /// Operation error
        const OPERR   = 1 << 1;
        /// Programming error
        const PROGERR = 1 << 3;
        /// Write protection error
        const WRPERR  = 1 << 4;
        /// Programming alignment error
        const PGAERR  = 1 << 5;
        /// Size error
        const SIZERR  = 1 << 6;
        /// Programming sequence error
        const PGSERR  = 1 << 7;
        /// Fast programming data miss error
        const MISERR  = 1 << 8;
        /// Fast programming error
        const FASTERR = 1 << 9;
        /// PCROP read error
        const RDERR   = 1 << 14;
        /// Option validity error
        const OPTVERR = 1 << 15;
        /// Busy
        const BSY     = 1 << 16;

        /// All errors standard programming can raise
        const PROGRAM_ERRORS = Self::PGSERR.bits() | Self::SIZERR.bits()
            | Self::PGAERR.bits() | Self::WRPERR.bits() | Self::PROGERR.bits();
        /// Every write-one-to-clear flag
        const CLEARABLE = Self::EOP.bits() | Self::OPERR.bits() | Self::PROGERR.bits()
            | Self::WRPERR.bits() | Self::PGAERR.bits() | Self::SIZERR.bits()
            | Self::PGSERR.bits() | Self::MISERR.bits() | Self::FASTERR.bits()
            | Self::RDERR.bits() | Self::OPTVERR.bits();
    }
}

impl Sr {
    /// Error flags currently raised
    pub fn errors(self) -> Self {
        self & (Self::CLEARABLE - Self::EOP)
    }
}

/// Typed access to the FLASH register block
#[derive(Debug)]
pub struct Registers<B> {
    bus: B,
    base: u32,
}

impl<B: FlashBus> Registers<B> {
    /// Create a register view rooted at `base`
    pub const fn new(bus: B, base: u32) -> Self {
        Self { bus, base }
    }

    /// The underlying bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Base address of the register block
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Read FLASH_SR
    #[inline]
    pub fn sr(&self) -> Sr {
        Sr::from_bits_retain(self.bus.read32(self.base + REG_SR))
    }

    /// Clear status flags (write-one-to-clear)
    #[inline]
    pub fn clear_sr(&self, flags: Sr) {
        self.bus
            .write32(self.base + REG_SR, (flags & Sr::CLEARABLE).bits());
    }

    /// Read FLASH_CR
    #[inline]
    pub fn cr(&self) -> Cr {
        Cr::from_bits_retain(self.bus.read32(self.base + REG_CR))
    }

    /// Read-modify-write FLASH_CR: clear `clear`, then set `set`
    #[inline]
    pub fn modify_cr(&self, clear: Cr, set: Cr) {
        let cr = (self.cr() - clear) | set;
        self.bus.write32(self.base + REG_CR, cr.bits());
    }

    /// Write one word to FLASH_KEYR
    #[inline]
    pub fn write_keyr(&self, key: u32) {
        self.bus.write32(self.base + REG_KEYR, key);
    }

    /// Write one word to FLASH_OPTKEYR
    #[inline]
    pub fn write_optkeyr(&self, key: u32) {
        self.bus.write32(self.base + REG_OPTKEYR, key);
    }

    /// Read FLASH_OPTR
    #[inline]
    pub fn optr(&self) -> u32 {
        self.bus.read32(self.base + REG_OPTR)
    }

    /// Write FLASH_OPTR
    #[inline]
    pub fn write_optr(&self, value: u32) {
        self.bus.write32(self.base + REG_OPTR, value);
    }
}
