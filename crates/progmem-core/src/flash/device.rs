//! Page-oriented program memory trait
//!
//! This is the contract a block/MTD layer uses to drive on-chip program
//! memory: geometry queries by page, page erase, blank check and
//! double-word programming. [`Flash`] implements it by delegating to its
//! inherent methods.

use super::Flash;
use crate::bus::{FlashBus, Stall};
use crate::error::Result;

/// Program memory with uniform, individually erasable pages
///
/// Addresses may be absolute bus addresses or linear offsets from the start
/// of the array.
///
/// # Example
///
/// ```ignore
/// use progmem_core::ProgMem;
///
/// fn replace_page<D: ProgMem + ?Sized>(dev: &D, page: usize, data: &[u8]) -> Result<()> {
///     dev.erase_page(page)?;
///     let addr = dev.page_address(page).ok_or(...)?;
///     dev.write(addr, data)?;
///     Ok(())
/// }
/// ```
pub trait ProgMem {
    /// Size in bytes of a page
    fn page_size(&self, page: usize) -> usize;

    /// Number of pages
    fn page_count(&self) -> usize;

    /// Whether all pages have the same size
    fn is_uniform(&self) -> bool {
        true
    }

    /// Index of the page holding `addr`
    ///
    /// # Errors
    /// * `AddressOutOfRange` - `addr` is not inside the array
    fn page_index(&self, addr: u32) -> Result<usize>;

    /// Absolute address of the start of `page`, `None` if there is no such page
    fn page_address(&self, page: usize) -> Option<u32>;

    /// Erase a page, returning the number of bytes erased
    ///
    /// # Errors
    /// * `PageOutOfRange` - `page` is not below [`ProgMem::page_count`]
    /// * `Io` - the page does not read back as erased
    fn erase_page(&self, page: usize) -> Result<usize>;

    /// Number of bytes of `page` that are not erased
    fn is_page_erased(&self, page: usize) -> Result<usize>;

    /// Program `data` at `addr`, returning the number of bytes written
    ///
    /// # Errors
    /// * `InvalidArgument` - `addr` not 8-byte aligned or length not a
    ///   multiple of 4
    /// * `AddressOutOfRange` - the range is not inside the array
    /// * `ProtectionViolation` - the target is write protected
    /// * `Io` - the data does not read back as written
    fn write(&self, addr: u32, data: &[u8]) -> Result<usize>;

    /// Read into `buf`, returning the number of bytes read
    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<usize>;

    /// Total size in bytes
    fn total_size(&self) -> usize {
        (0..self.page_count()).map(|p| self.page_size(p)).sum()
    }
}

impl<B: FlashBus, S: Stall> ProgMem for Flash<B, S> {
    fn page_size(&self, _page: usize) -> usize {
        self.geometry.page_size()
    }

    fn page_count(&self) -> usize {
        self.geometry.page_count()
    }

    fn page_index(&self, addr: u32) -> Result<usize> {
        self.geometry.page_of(addr).map(|p| p.index())
    }

    fn page_address(&self, page: usize) -> Option<u32> {
        self.geometry
            .page(page)
            .ok()
            .map(|p| self.geometry.page_address(p))
    }

    fn erase_page(&self, page: usize) -> Result<usize> {
        Flash::erase_page(self, page)
    }

    fn is_page_erased(&self, page: usize) -> Result<usize> {
        Flash::is_page_erased(self, page)
    }

    fn write(&self, addr: u32, data: &[u8]) -> Result<usize> {
        Flash::write(self, addr, data)
    }

    fn read(&self, addr: u32, buf: &mut [u8]) -> Result<usize> {
        Flash::read(self, addr, buf)
    }

    fn total_size(&self) -> usize {
        self.geometry.size()
    }
}
