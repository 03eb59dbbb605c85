//! Exclusive access to the flash controller
//!
//! A [`Gate`] is a binary spin lock that owns the value it protects. The
//! driver keeps the controller session state inside it, so the only way to
//! observe or change that state is while holding the gate. Waiting callers
//! spin on the injected [`Stall`], which on a host yields the thread and on
//! the target relaxes the core.

use core::cell::UnsafeCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::bus::Stall;

/// Binary lock around a value
pub struct Gate<T> {
    held: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is only handed out through a GateGuard, and at
// most one guard exists at a time.
unsafe impl<T: Send> Sync for Gate<T> {}
unsafe impl<T: Send> Send for Gate<T> {}

impl<T> Gate<T> {
    /// Create an unlocked gate
    pub const fn new(value: T) -> Self {
        Self {
            held: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Block until the gate is ours
    ///
    /// A failed attempt, whether lost to another caller or spurious, only
    /// retries. Calling this while already holding the gate on the same
    /// thread never returns.
    pub fn acquire<S: Stall + ?Sized>(&self, stall: &S) -> GateGuard<'_, T> {
        loop {
            if self
                .held
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return GateGuard { gate: self };
            }
            while self.held.load(Ordering::Relaxed) {
                stall.stall();
            }
        }
    }

    /// Take the gate if it is free
    ///
    /// Never fails on a free gate.
    pub fn try_acquire(&self) -> Option<GateGuard<'_, T>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GateGuard { gate: self })
    }

    /// Whether some caller currently holds the gate
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

impl<T: fmt::Debug> fmt::Debug for Gate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("held", &self.is_held())
            .finish_non_exhaustive()
    }
}

/// Proof of holding a [`Gate`]; releases it on drop
pub struct GateGuard<'a, T> {
    gate: &'a Gate<T>,
}

impl<T> Deref for GateGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the guard is the unique holder of the gate
        unsafe { &*self.gate.value.get() }
    }
}

impl<T> DerefMut for GateGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard is the unique holder of the gate
        unsafe { &mut *self.gate.value.get() }
    }
}

impl<T> Drop for GateGuard<'_, T> {
    fn drop(&mut self) {
        self.gate.held.store(false, Ordering::Release);
    }
}

impl<T: fmt::Debug> fmt::Debug for GateGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
