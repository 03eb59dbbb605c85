//! Errors reported by the command line front end

use thiserror::Error;

/// Command-level errors
#[derive(Debug, Error)]
pub enum CommandError {
    /// Board name not among the presets
    #[error("Unknown board '{0}' (use list-boards to see the presets)")]
    UnknownBoard(String),

    /// The data does not fit between the start address and the end of flash
    #[error("{len} bytes do not fit at 0x{addr:08X} ({available} bytes available)")]
    TooLarge {
        addr: u32,
        len: usize,
        available: usize,
    },

    /// Page range past the end of flash
    #[error("Pages {first}..{end} are outside the flash ({count} pages)")]
    PageRange {
        first: usize,
        end: usize,
        count: usize,
    },

    /// Flash contents differ from the expected data
    #[error(
        "Verification failed: {count} bytes differ, first at 0x{addr:08X} \
         (expected 0x{expected:02X}, found 0x{found:02X})"
    )]
    Mismatch {
        count: usize,
        addr: u32,
        expected: u8,
        found: u8,
    },

    /// A page expected to be erased is not
    #[error("Page {page} is not blank: {dirty} bytes differ from 0xFF")]
    NotBlank { page: usize, dirty: usize },
}
