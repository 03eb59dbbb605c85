//! Board configuration
//!
//! The driver is parameterized by a handful of numbers that come from the
//! board: where the array and the register block live, the page size, the
//! number of pages and the clock frequencies. Built-in presets cover the
//! common STM32L4 parts; with the `std` feature a board can also be
//! described in a TOML file:
//!
//! ```toml
//! [board]
//! name = "custom-l476"
//!
//! [flash]
//! base = 0x08000000
//! page_size = "2 KiB"
//! page_count = 256
//! dual_bank = true
//! sysclk_hz = 80000000
//! ```

use crate::geometry::{FlashGeometry, MAX_BANK_PAGES};
use crate::regs::FLASH_REGS_BASE;

/// Largest page count PNB and BKER can address together
pub const MAX_PAGES: u16 = 2 * MAX_BANK_PAGES;

/// Board constants consumed by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    /// Absolute address of the first byte of the array
    pub flash_base: u32,
    /// Absolute address of the FLASH register block
    pub regs_base: u32,
    /// Bytes per page
    pub page_size: u32,
    /// Number of pages
    pub page_count: u16,
    /// Array split in two banks of `page_count / 2` pages
    pub dual_bank: bool,
    /// CPU clock in Hz
    pub sysclk_hz: u32,
    /// Standby (LSE) clock in Hz
    pub standby_clk_hz: u32,
}

impl BoardConfig {
    /// Single-bank STM32L4 part with 2 KiB pages and the given number of pages
    pub const fn stm32l4(page_count: u16) -> Self {
        Self {
            flash_base: 0x0800_0000,
            regs_base: FLASH_REGS_BASE,
            page_size: 2048,
            page_count,
            dual_bank: false,
            sysclk_hz: 80_000_000,
            standby_clk_hz: 32_768,
        }
    }

    /// Dual-bank STM32L4 part with 2 KiB pages, `page_count / 2` per bank
    pub const fn stm32l4_dual_bank(page_count: u16) -> Self {
        let mut config = Self::stm32l4(page_count);
        config.dual_bank = true;
        config
    }

    /// Array geometry described by this board
    ///
    /// Panics on a board that does not pass [`BoardConfig::validate`].
    pub const fn geometry(&self) -> FlashGeometry {
        if self.dual_bank {
            FlashGeometry::dual_bank(self.flash_base, self.page_size, self.page_count)
        } else {
            FlashGeometry::new(self.flash_base, self.page_size, self.page_count)
        }
    }

    /// Total flash size in bytes
    pub const fn flash_size(&self) -> usize {
        self.page_size as usize * self.page_count as usize
    }

    /// Check that the numbers describe an array the driver can handle
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.page_size == 0 || self.page_size % 8 != 0 {
            return Err("page size must be a non-zero multiple of 8");
        }
        if self.dual_bank {
            if self.page_count == 0 || self.page_count > MAX_PAGES || self.page_count % 2 != 0 {
                return Err("dual-bank page count must be even and between 2 and 512");
            }
        } else if self.page_count == 0 || self.page_count > MAX_BANK_PAGES {
            return Err("single-bank page count must be between 1 and 256");
        }
        if self.flash_base % 8 != 0 {
            return Err("flash base must be double-word aligned");
        }
        if self.flash_base as u64 + self.flash_size() as u64 > 1 << 32 {
            return Err("flash array does not fit in the address space");
        }
        Ok(())
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        DEFAULT_BOARD.config
    }
}

/// A named board preset
#[derive(Debug, Clone, Copy)]
pub struct Board {
    /// Short name used on the command line
    pub name: &'static str,
    /// Human readable description
    pub description: &'static str,
    /// Constants for the driver
    pub config: BoardConfig,
}

/// Built-in board presets
pub const BOARDS: &[Board] = &[
    Board {
        name: "stm32l433rc",
        description: "STM32L433RC, 256 KiB single bank",
        config: BoardConfig::stm32l4(128),
    },
    DEFAULT_BOARD,
    Board {
        name: "stm32l476rg",
        description: "STM32L476RG, 1 MiB dual bank",
        config: BoardConfig::stm32l4_dual_bank(512),
    },
    Board {
        name: "stm32l475vg",
        description: "STM32L475VG (B-L475E-IOT01A), 1 MiB dual bank",
        config: BoardConfig::stm32l4_dual_bank(512),
    },
];

/// Board used when none is named
pub const DEFAULT_BOARD: Board = Board {
    name: "stm32l476re",
    description: "STM32L476RE, 512 KiB dual bank",
    config: BoardConfig::stm32l4_dual_bank(256),
};

/// Look up a preset by name (case insensitive)
pub fn find(name: &str) -> Option<&'static Board> {
    BOARDS.iter().find(|b| b.name.eq_ignore_ascii_case(name))
}

#[cfg(feature = "std")]
mod file {
    use std::fmt;
    use std::fs;
    use std::path::Path;
    use std::string::String;

    use super::BoardConfig;
    use crate::regs::FLASH_REGS_BASE;

    /// Failure to load a board file
    #[derive(Debug)]
    pub enum BoardFileError {
        /// The file could not be read
        Io(std::io::Error),
        /// The file is not valid board TOML
        Parse(toml::de::Error),
        /// The values do not describe a usable array
        Invalid(&'static str),
    }

    impl fmt::Display for BoardFileError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Io(e) => write!(f, "failed to read board file: {}", e),
                Self::Parse(e) => write!(f, "failed to parse board file: {}", e),
                Self::Invalid(msg) => write!(f, "invalid board: {}", msg),
            }
        }
    }

    impl std::error::Error for BoardFileError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match self {
                Self::Io(e) => Some(e),
                Self::Parse(e) => Some(e),
                Self::Invalid(_) => None,
            }
        }
    }

    #[derive(Debug, serde::Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TomlBoardFile {
        #[serde(default)]
        board: TomlBoardMeta,
        flash: TomlFlash,
    }

    #[derive(Debug, Default, serde::Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TomlBoardMeta {
        name: Option<String>,
    }

    #[derive(Debug, serde::Deserialize)]
    #[serde(deny_unknown_fields)]
    struct TomlFlash {
        #[serde(deserialize_with = "deserialize_hex_u32")]
        base: u32,
        #[serde(default = "default_regs", deserialize_with = "deserialize_hex_u32")]
        regs: u32,
        #[serde(deserialize_with = "deserialize_size")]
        page_size: u32,
        page_count: u16,
        #[serde(default)]
        dual_bank: bool,
        #[serde(default = "default_sysclk")]
        sysclk_hz: u32,
        #[serde(default = "default_standby_clk")]
        standby_clk_hz: u32,
    }

    fn default_regs() -> u32 {
        FLASH_REGS_BASE
    }

    fn default_sysclk() -> u32 {
        80_000_000
    }

    fn default_standby_clk() -> u32 {
        32_768
    }

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    /// Deserialize a u32 that can be hex (0x...) or decimal
    fn deserialize_hex_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::Deserialize;

        match HexOrInt::deserialize(deserializer)? {
            HexOrInt::Int(n) => Ok(n),
            HexOrInt::Str(s) => parse_number(&s).map_err(serde::de::Error::custom),
        }
    }

    /// Deserialize a size that can be a number or a string like "2 KiB"
    fn deserialize_size<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::Deserialize;

        match HexOrInt::deserialize(deserializer)? {
            HexOrInt::Int(n) => Ok(n),
            HexOrInt::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
        }
    }

    /// Parse a number that can be hex (0x...) or decimal
    pub(crate) fn parse_number(s: &str) -> Result<u32, String> {
        let s = s.trim();
        if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
        } else {
            s.parse().map_err(|e| format!("invalid number: {}", e))
        }
    }

    /// Parse a size string like "2 KiB" or "2048"
    pub(crate) fn parse_size(s: &str) -> Result<u32, String> {
        let s = s.trim();
        if let Ok(n) = parse_number(s) {
            return Ok(n);
        }

        let lower = s.to_lowercase();
        let (num, multiplier) = if let Some(n) = lower.strip_suffix("kib") {
            (n.trim(), 1024)
        } else if let Some(n) = lower.strip_suffix("kb") {
            (n.trim(), 1024)
        } else if let Some(n) = lower.strip_suffix('b') {
            (n.trim(), 1)
        } else {
            return Err(format!("invalid size: {}", s));
        };

        let num: u32 = num.parse().map_err(|_| format!("invalid size: {}", s))?;
        num.checked_mul(multiplier)
            .ok_or_else(|| format!("size too large: {}", s))
    }

    /// A board loaded from a TOML file
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct BoardFile {
        /// Name from the `[board]` table, if given
        pub name: Option<String>,
        /// Validated constants for the driver
        pub config: BoardConfig,
    }

    impl BoardFile {
        /// Load a board description from a TOML file
        pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, BoardFileError> {
            let content = fs::read_to_string(path).map_err(BoardFileError::Io)?;
            Self::from_toml_str(&content)
        }

        /// Parse a board description from a TOML string
        pub fn from_toml_str(content: &str) -> Result<Self, BoardFileError> {
            let file: TomlBoardFile = toml::from_str(content).map_err(BoardFileError::Parse)?;
            let flash = file.flash;
            let config = BoardConfig {
                flash_base: flash.base,
                regs_base: flash.regs,
                page_size: flash.page_size,
                page_count: flash.page_count,
                dual_bank: flash.dual_bank,
                sysclk_hz: flash.sysclk_hz,
                standby_clk_hz: flash.standby_clk_hz,
            };
            config.validate().map_err(BoardFileError::Invalid)?;
            Ok(Self {
                name: file.board.name,
                config,
            })
        }
    }
}

#[cfg(feature = "std")]
pub use file::{BoardFile, BoardFileError};
