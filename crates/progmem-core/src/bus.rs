//! Access to the flash controller and the memory-mapped array
//!
//! The driver never dereferences raw addresses itself. Every register access
//! and every array access goes through a [`FlashBus`], and every spin goes
//! through a [`Stall`]. On the target these are [`Mmio`] and [`SpinStall`];
//! on a host they are a simulated controller and [`YieldStall`].

use core::ptr;

/// 32-bit register and array access at absolute addresses
///
/// Implementations must be safe to call from several threads at once; the
/// driver serializes controller sequences itself but may read the array
/// while another thread holds no lock.
pub trait FlashBus {
    /// Read a 32-bit word
    fn read32(&self, addr: u32) -> u32;

    /// Write a 32-bit word
    fn write32(&self, addr: u32, value: u32);

    /// Read a single byte of the array
    fn read8(&self, addr: u32) -> u8;
}

impl<B: FlashBus + ?Sized> FlashBus for &B {
    fn read32(&self, addr: u32) -> u32 {
        (**self).read32(addr)
    }

    fn write32(&self, addr: u32, value: u32) {
        (**self).write32(addr, value)
    }

    fn read8(&self, addr: u32) -> u8 {
        (**self).read8(addr)
    }
}

/// Yield or waste one polling cycle
pub trait Stall {
    /// Called once per iteration of every spin loop in the driver
    fn stall(&self);
}

impl<F: Fn()> Stall for F {
    fn stall(&self) {
        self()
    }
}

/// Busy spin with a CPU relax hint
#[derive(Debug, Clone, Copy, Default)]
pub struct SpinStall;

impl Stall for SpinStall {
    #[inline]
    fn stall(&self) {
        core::hint::spin_loop();
    }
}

/// Give the rest of the time slice to another thread
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct YieldStall;

#[cfg(feature = "std")]
impl Stall for YieldStall {
    #[inline]
    fn stall(&self) {
        std::thread::yield_now();
    }
}

/// Volatile access to physical addresses
///
/// Only meaningful when running on the microcontroller itself, where the
/// FLASH registers and the array are identity mapped.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// Create a volatile accessor
    ///
    /// # Safety
    ///
    /// Every address the driver is configured with (register base and array
    /// range) must be valid, identity-mapped device memory for the lifetime
    /// of the returned value, and no other code may drive the FLASH
    /// controller concurrently.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl FlashBus for Mmio {
    #[inline]
    fn read32(&self, addr: u32) -> u32 {
        // SAFETY: guaranteed by the contract of Mmio::new
        unsafe { ptr::read_volatile(addr as usize as *const u32) }
    }

    #[inline]
    fn write32(&self, addr: u32, value: u32) {
        // SAFETY: guaranteed by the contract of Mmio::new
        unsafe { ptr::write_volatile(addr as usize as *mut u32, value) }
    }

    #[inline]
    fn read8(&self, addr: u32) -> u8 {
        // SAFETY: guaranteed by the contract of Mmio::new
        unsafe { ptr::read_volatile(addr as usize as *const u8) }
    }
}
