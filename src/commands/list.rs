//! List command implementation

use progmem_core::board::{BOARDS, DEFAULT_BOARD};

use super::format_size;

/// List the built-in board presets
pub fn list_boards() {
    println!("Supported boards:");
    println!();
    println!(
        "{:<14} {:>10} {:>6}  {}",
        "Name", "Flash", "Pages", "Description"
    );
    println!("{}", "-".repeat(72));

    for board in BOARDS {
        let marker = if board.name == DEFAULT_BOARD.name {
            " (default)"
        } else {
            ""
        };
        println!(
            "{:<14} {:>10} {:>6}  {}{}",
            board.name,
            format_size(board.config.flash_size()),
            board.config.page_count,
            board.description,
            marker
        );
    }
}
