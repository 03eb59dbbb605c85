//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "progmem")]
#[command(author, version, about = "STM32L4 internal flash programmer", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Which board to simulate and where its flash contents live
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// Built-in board preset (see list-boards) [default: stm32l476re]
    #[arg(short, long, global = true, conflicts_with = "board_file")]
    pub board: Option<String>,

    /// Board description file (TOML format)
    #[arg(long, global = true)]
    pub board_file: Option<PathBuf>,

    /// Flash image file, created erased if missing
    #[arg(short, long, global = true, default_value = "progmem.bin")]
    pub image: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show board geometry, clocks and option bytes
    Info,

    /// Erase flash pages
    Erase {
        /// First page to erase
        #[arg(short, long, required_unless_present = "all")]
        page: Option<usize>,

        /// Number of pages to erase
        #[arg(short, long, default_value_t = 1)]
        count: usize,

        /// Erase every page
        #[arg(long, conflicts_with = "page")]
        all: bool,
    },

    /// Program a file into flash
    Write {
        /// Destination address, absolute or offset from the flash base (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        addr: u32,

        /// Input file path
        #[arg(short = 'f', long)]
        input: PathBuf,

        /// Erase the covered pages first
        #[arg(long)]
        erase: bool,
    },

    /// Read flash contents to a file
    Read {
        /// Start address, absolute or offset from the flash base (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        addr: u32,

        /// Number of bytes to read (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        length: u32,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Verify flash contents against a file
    Verify {
        /// Start address, absolute or offset from the flash base (hex or decimal)
        #[arg(short, long, value_parser = parse_hex_u32)]
        addr: u32,

        /// Input file path
        #[arg(short = 'f', long)]
        input: PathBuf,
    },

    /// Count the bytes of a page that are not erased
    BlankCheck {
        /// Page to check
        #[arg(short, long)]
        page: usize,
    },

    /// Show or modify the user option bytes (FLASH_OPTR)
    OptionBytes {
        /// Bits to clear (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        clear: u32,

        /// Bits to set (hex or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
        set: u32,
    },

    /// List built-in board presets
    ListBoards,
}
