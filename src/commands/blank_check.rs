//! Blank check command implementation

use progmem_core::ProgMem;

use crate::error::CommandError;

/// Check that a page reads back as erased
pub fn run_blank_check<D: ProgMem + ?Sized>(
    flash: &D,
    page: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let dirty = flash.is_page_erased(page)?;
    if dirty != 0 {
        return Err(CommandError::NotBlank { page, dirty }.into());
    }
    println!("Page {} is blank", page);
    Ok(())
}
