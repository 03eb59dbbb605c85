//! progmem - STM32L4 internal flash programmer
//!
//! Erases, programs, reads and verifies the on-chip flash of STM32L4 parts
//! through the `progmem-core` driver.
//!
//! # Architecture
//!
//! The driver talks to the FLASH register block through the `FlashBus`
//! trait. On a host there is no memory-mapped controller, so the command
//! line tool binds the driver to `progmem-sim`, a model of the controller
//! whose array is backed by an image file. Every command goes through the
//! same unlock, mode, busy-wait and verify sequence it would on the part.
//!
//! The data commands (erase, write, read, verify, blank-check) only use the
//! `ProgMem` trait and work with any implementation of it.

mod boards;
mod cli;
mod commands;
mod error;

use boards::FlashHandle;
use clap::Parser;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    run(&cli)
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    match &cli.command {
        Commands::ListBoards => {
            commands::list_boards();
            Ok(())
        }
        Commands::Info => {
            let handle = FlashHandle::open(&cli.target)?;
            commands::run_info(&handle.flash(), handle.board());
            Ok(())
        }
        Commands::Erase { page, count, all } => {
            let handle = FlashHandle::open(&cli.target)?;
            let flash = handle.flash();
            let erased = if *all {
                commands::run_erase_all(&flash)
            } else {
                commands::run_erase(&flash, page.unwrap_or(0), *count)
            };
            // Pages erased before a failure are kept
            handle.save()?;
            erased.map(|_| ())
        }
        Commands::Write { addr, input, erase } => {
            let handle = FlashHandle::open(&cli.target)?;
            let written = commands::run_write(&handle.flash(), *addr, input, *erase);
            handle.save()?;
            written.map(|_| ())
        }
        Commands::Read {
            addr,
            length,
            output,
        } => {
            let handle = FlashHandle::open(&cli.target)?;
            commands::run_read(&handle.flash(), *addr, *length as usize, output)
        }
        Commands::Verify { addr, input } => {
            let handle = FlashHandle::open(&cli.target)?;
            commands::run_verify(&handle.flash(), *addr, input)
        }
        Commands::BlankCheck { page } => {
            let handle = FlashHandle::open(&cli.target)?;
            commands::run_blank_check(&handle.flash(), *page)
        }
        Commands::OptionBytes { clear, set } => {
            let handle = FlashHandle::open(&cli.target)?;
            commands::run_option_bytes(&handle.flash(), *clear, *set)?;
            log::debug!("option bytes are not stored in {}", handle.image().display());
            Ok(())
        }
    }
}
