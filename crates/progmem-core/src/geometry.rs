//! Flash array geometry and address translation
//!
//! The array is a contiguous memory-mapped range of equally sized pages.
//! Callers may address it either with absolute bus addresses (at or above
//! the base) or with linear offsets from the base; [`FlashGeometry`] folds
//! both forms into offsets and checks them against the array size.
//!
//! Dual-bank parts split the array into two equal halves. A page is
//! selected for erase by its bank and its index within that bank, and
//! neither can exceed what FLASH_CR encodes.

use core::ops::Range;

use crate::error::{Error, Result};

/// Index of a page known to be inside the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Page(u16);

impl Page {
    /// Page index as an integer
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for Page {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Most pages one bank can hold (width of the PNB field)
pub const MAX_BANK_PAGES: u16 = 256;

/// Shape and location of the flash array
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    base: u32,
    page_size: u32,
    page_count: u16,
    bank_pages: u16,
}

impl FlashGeometry {
    /// Describe a single-bank array of `page_count` pages of `page_size`
    /// bytes at `base`
    ///
    /// `page_size` must be a non-zero multiple of the double-word, the
    /// array must fit in the 32-bit address space and `page_count` must not
    /// exceed [`MAX_BANK_PAGES`].
    pub const fn new(base: u32, page_size: u32, page_count: u16) -> Self {
        assert!(page_count <= MAX_BANK_PAGES);
        Self::with_banks(base, page_size, page_count, page_count)
    }

    /// Describe a dual-bank array; the second bank starts at page
    /// `page_count / 2`
    ///
    /// `page_count` must be even and each bank must not exceed
    /// [`MAX_BANK_PAGES`].
    pub const fn dual_bank(base: u32, page_size: u32, page_count: u16) -> Self {
        assert!(page_count % 2 == 0 && page_count / 2 <= MAX_BANK_PAGES);
        Self::with_banks(base, page_size, page_count, page_count / 2)
    }

    const fn with_banks(base: u32, page_size: u32, page_count: u16, bank_pages: u16) -> Self {
        assert!(page_size != 0 && page_size % 8 == 0);
        assert!(base as u64 + page_size as u64 * page_count as u64 <= 1 << 32);
        Self {
            base,
            page_size,
            page_count,
            bank_pages,
        }
    }

    /// Absolute address of the first byte
    pub const fn base(&self) -> u32 {
        self.base
    }

    /// Bytes per page
    pub const fn page_size(&self) -> usize {
        self.page_size as usize
    }

    /// Number of pages
    pub const fn page_count(&self) -> usize {
        self.page_count as usize
    }

    /// Pages per bank
    pub const fn bank_pages(&self) -> usize {
        self.bank_pages as usize
    }

    /// Whether the array is split in two banks
    pub const fn is_dual_bank(&self) -> bool {
        self.bank_pages != self.page_count
    }

    /// Bank and index within the bank of a page
    pub const fn bank_select(&self, page: Page) -> (usize, usize) {
        if self.bank_pages == 0 {
            return (0, 0);
        }
        (
            page.index() / self.bank_pages(),
            page.index() % self.bank_pages(),
        )
    }

    /// Page addressed by a bank and an index within it, if there is one
    pub fn page_in_bank(&self, bank: usize, index: usize) -> Option<Page> {
        if index >= self.bank_pages() {
            return None;
        }
        self.page(bank * self.bank_pages() + index).ok()
    }

    /// Total size in bytes
    pub const fn size(&self) -> usize {
        self.page_size() * self.page_count()
    }

    /// Fold an absolute or linear address into an offset from the base
    ///
    /// Addresses at or above the base are treated as absolute, anything
    /// below as already linear. No range check is done here.
    pub const fn to_offset(&self, addr: u32) -> u32 {
        if addr >= self.base {
            addr - self.base
        } else {
            addr
        }
    }

    /// Absolute address of an offset
    pub const fn to_absolute(&self, offset: u32) -> u32 {
        self.base + offset
    }

    /// Whether `len` bytes starting at `offset` lie inside the array
    pub const fn contains(&self, offset: u32, len: usize) -> bool {
        offset as u64 + len as u64 <= self.size() as u64
    }

    /// Validate a page index
    pub fn page(&self, index: usize) -> Result<Page> {
        if index < self.page_count() {
            Ok(Page(index as u16))
        } else {
            Err(Error::PageOutOfRange {
                page: index,
                count: self.page_count(),
            })
        }
    }

    /// Page holding an absolute or linear address
    pub fn page_of(&self, addr: u32) -> Result<Page> {
        let offset = self.to_offset(addr);
        if !self.contains(offset, 1) {
            return Err(Error::AddressOutOfRange { addr, len: 1 });
        }
        Ok(Page((offset / self.page_size) as u16))
    }

    /// Absolute address of the first byte of a page
    pub fn page_address(&self, page: Page) -> u32 {
        self.base + page.0 as u32 * self.page_size
    }

    /// Absolute address range covered by a page
    pub fn page_range(&self, page: Page) -> Range<u32> {
        let start = self.page_address(page);
        // The last page may end exactly at 4 GiB, so build the end in u64
        let end = start as u64 + self.page_size as u64;
        start..end.min(u32::MAX as u64) as u32
    }

    /// Validate a range and return its absolute start address
    pub fn resolve(&self, addr: u32, len: usize) -> Result<u32> {
        let offset = self.to_offset(addr);
        if self.contains(offset, len) {
            Ok(self.to_absolute(offset))
        } else {
            Err(Error::AddressOutOfRange { addr, len })
        }
    }
}
