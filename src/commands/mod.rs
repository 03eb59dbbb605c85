//! CLI command implementations
//!
//! Data commands (erase, write, read, verify, blank-check) work with any
//! [`ProgMem`](progmem_core::ProgMem) implementation. Commands that need
//! registers outside the array (info, option-bytes) take the driver
//! directly.

mod blank_check;
mod erase;
mod info;
mod list;
mod option_bytes;
mod read;
mod verify;
mod write;

pub use blank_check::run_blank_check;
pub use erase::{run_erase, run_erase_all};
pub use info::run_info;
pub use list::list_boards;
pub use option_bytes::run_option_bytes;
pub use read::run_read;
pub use verify::run_verify;
pub use write::run_write;

use std::fs;
use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};
use progmem_core::ProgMem;

use crate::error::CommandError;

/// Read file contents into a Vec
fn read_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let data = fs::read(path)?;
    println!("Read {} bytes from {:?}", data.len(), path);
    Ok(data)
}

/// Progress bar counting bytes, labelled with the current phase
fn byte_progress(total: u64, phase: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(&format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{bytes}}/{{total_bytes}} ({{bytes_per_sec}}, {{eta}}) {}",
        phase
    )) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Progress bar counting pages
fn page_progress(total: u64, phase: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar().template(&format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} pages {}",
        phase
    )) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Offset of `addr` from the start of flash, accepting absolute or linear addresses
fn flash_offset<D: ProgMem + ?Sized>(flash: &D, addr: u32) -> u32 {
    let base = flash.page_address(0).unwrap_or(0);
    if addr >= base {
        addr - base
    } else {
        addr
    }
}

/// Fail with `TooLarge` unless `len` bytes at `addr` fit in the flash
fn check_fits<D: ProgMem + ?Sized>(flash: &D, addr: u32, len: usize) -> Result<(), CommandError> {
    let offset = flash_offset(flash, addr) as usize;
    let available = flash.total_size().saturating_sub(offset);
    if len > available {
        return Err(CommandError::TooLarge {
            addr,
            len,
            available,
        });
    }
    Ok(())
}

/// Format a byte count the way the board list shows it
fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 && bytes % (1024 * 1024) == 0 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}
