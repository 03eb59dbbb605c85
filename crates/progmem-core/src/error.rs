//! Error types for progmem-core
//!
//! This module provides a no_std compatible error type that is returned by
//! every driver operation. Errors are `Copy` and carry the addresses and
//! status flags needed to diagnose a failure without access to the hardware.

use core::fmt;

use crate::regs::Sr;
use crate::state::ControllerState;

/// Which argument of a request was misaligned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misalignment {
    /// Destination is not double-word (8 byte) aligned
    Address {
        /// Requested destination
        addr: u32,
    },
    /// Length is not a whole number of 32-bit words
    Length {
        /// Requested length in bytes
        len: usize,
    },
    /// The buffer holds fewer bytes than requested
    ShortBuffer {
        /// Requested length in bytes
        len: usize,
        /// Bytes actually available
        available: usize,
    },
}

/// Details about a read-back verify failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyFailure {
    /// Bytes of an erased page are not all 0xFF
    Erase {
        /// Page index that was erased
        page: usize,
        /// Number of bytes not at the erased value
        dirty: usize,
    },
    /// A programmed double-word reads back differently
    Program {
        /// Address of the double-word
        addr: u32,
        /// Value that was written (low word in the low half)
        expected: u64,
        /// Value read back
        found: u64,
        /// FLASH_SR after the write
        status: u32,
    },
    /// Option byte programming raised error flags and was not committed
    OptionBytes {
        /// Value written to FLASH_OPTR
        value: u32,
        /// Error flags raised
        status: u32,
    },
}

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Page or address beyond the array
    OutOfRange,
    /// Misaligned or inconsistent request
    InvalidArgument,
    /// Write protection prevented the operation
    ProtectionViolation,
    /// The hardware did not do what was asked
    Io,
    /// The request is forbidden by the driver's contract
    PreconditionViolation,
}

/// Core error type - no_std compatible, Copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Page index is not below the page count
    PageOutOfRange {
        /// Requested page
        page: usize,
        /// Number of pages in the array
        count: usize,
    },
    /// Address range is not inside the array
    AddressOutOfRange {
        /// Requested address (absolute or linear, as passed in)
        addr: u32,
        /// Requested length
        len: usize,
    },
    /// Misaligned or short request
    InvalidArgument(Misalignment),
    /// WRPERR was raised while programming
    ProtectionViolation {
        /// Absolute address of the rejected double-word
        addr: u32,
        /// FLASH_SR when the error was seen
        status: u32,
    },
    /// Read-back verification failed
    Io(VerifyFailure),
    /// Option byte masks touch the read protection level
    PreconditionViolation {
        /// Requested clear mask
        clear: u32,
        /// Requested set mask
        set: u32,
    },
    /// The driver attempted a mode change the controller does not allow
    ///
    /// This indicates a bug in the driver rather than a caller error.
    InvalidTransition {
        /// State before the attempted change
        from: ControllerState,
        /// Requested state
        to: ControllerState,
    },
}

impl Error {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PageOutOfRange { .. } | Self::AddressOutOfRange { .. } => ErrorKind::OutOfRange,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ProtectionViolation { .. } => ErrorKind::ProtectionViolation,
            Self::Io(_) => ErrorKind::Io,
            Self::PreconditionViolation { .. } | Self::InvalidTransition { .. } => {
                ErrorKind::PreconditionViolation
            }
        }
    }

    /// Negated errno value for an MTD style caller
    pub fn errno(&self) -> i32 {
        const EIO: i32 = 5;
        const EFAULT: i32 = 14;
        const EINVAL: i32 = 22;
        const EROFS: i32 = 30;

        let errno = match self.kind() {
            ErrorKind::OutOfRange => EFAULT,
            ErrorKind::InvalidArgument | ErrorKind::PreconditionViolation => EINVAL,
            ErrorKind::ProtectionViolation => EROFS,
            ErrorKind::Io => EIO,
        };
        -errno
    }
}

impl From<Misalignment> for Error {
    fn from(m: Misalignment) -> Self {
        Self::InvalidArgument(m)
    }
}

impl From<VerifyFailure> for Error {
    fn from(v: VerifyFailure) -> Self {
        Self::Io(v)
    }
}

impl fmt::Display for Misalignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address { addr } => {
                write!(f, "address 0x{:08X} is not double-word aligned", addr)
            }
            Self::Length { len } => write!(f, "length {} is not a multiple of 4", len),
            Self::ShortBuffer { len, available } => {
                write!(f, "buffer holds {} bytes, {} requested", available, len)
            }
        }
    }
}

impl fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Erase { page, dirty } => {
                write!(f, "erase verify failed on page {}: {} bytes not erased", page, dirty)
            }
            Self::Program {
                addr,
                expected,
                found,
                status,
            } => write!(
                f,
                "program verify failed at 0x{:08X}: expected 0x{:016X}, found 0x{:016X} (SR 0x{:08X})",
                addr, expected, found, status
            ),
            Self::OptionBytes { value, status } => write!(
                f,
                "option byte programming of 0x{:08X} failed (SR 0x{:08X}: {:?})",
                value,
                status,
                Sr::from_bits_truncate(*status)
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PageOutOfRange { page, count } => {
                write!(f, "page {} out of range (flash has {} pages)", page, count)
            }
            Self::AddressOutOfRange { addr, len } => {
                write!(f, "range 0x{:08X}+{} is outside the flash array", addr, len)
            }
            Self::InvalidArgument(m) => write!(f, "invalid argument: {}", m),
            Self::ProtectionViolation { addr, status } => write!(
                f,
                "write protection error at 0x{:08X} (SR 0x{:08X}: {:?})",
                addr,
                status,
                Sr::from_bits_truncate(*status).errors()
            ),
            Self::Io(failure) => write!(f, "{}", failure),
            Self::PreconditionViolation { clear, set } => write!(
                f,
                "option byte masks clear=0x{:08X} set=0x{:08X} touch the RDP level",
                clear, set
            ),
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid controller transition {:?} -> {:?}", from, to)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
