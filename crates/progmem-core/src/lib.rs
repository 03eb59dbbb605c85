//! progmem-core - STM32L4 internal flash programming driver
//!
//! This crate drives the STM32L4 FLASH controller to erase pages, program
//! double-words and modify the user option bytes of the on-chip flash array.
//! It is designed to be `no_std` compatible so the same code runs on the
//! target and on a host against a simulated controller.
//!
//! # Overview
//!
//! The controller is a single shared resource with a strict sequencing
//! protocol:
//!
//! - The control register is locked after reset and must be unlocked with a
//!   two-word key sequence (a second sequence for the option bytes).
//! - Mode bits (page erase, program) may only change while the controller is
//!   not busy, and only one mode may be active at a time.
//! - Programming happens one double-word (8 bytes) at a time, each write is
//!   followed by a busy-wait and a read-back verify.
//!
//! [`Flash`] owns the register interface and serializes every operation
//! through an internal gate, so it can be shared between threads.
//!
//! # Features
//!
//! - `std` - Enable standard library support (`std::error::Error`, TOML board
//!   files, [`bus::YieldStall`])
//!
//! # Example
//!
//! ```ignore
//! use progmem_core::{board, bus::{Mmio, SpinStall}, Flash, ProgMem};
//!
//! let board = board::find("stm32l476re").unwrap();
//! // Safety: running on an STM32L4 with the FLASH controller at its reset address
//! let flash = Flash::new(unsafe { Mmio::new() }, SpinStall, &board.config);
//!
//! let page = flash.page_index(0x0807_F800)?;
//! flash.erase_page(page)?;
//! flash.write(0x0807_F800, &[0x11, 0x22, 0x33, 0x44])?;
//! ```

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod board;
pub mod bus;
pub mod error;
pub mod flash;
pub mod gate;
pub mod geometry;
pub mod regs;
pub mod sequencer;
pub mod state;

pub use board::{Board, BoardConfig};
pub use error::{Error, ErrorKind, Misalignment, Result, VerifyFailure};
pub use flash::{Flash, ProgMem};
pub use geometry::{FlashGeometry, Page};
pub use state::ControllerState;
