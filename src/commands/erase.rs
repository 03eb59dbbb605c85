//! Erase command implementation

use progmem_core::ProgMem;

use super::page_progress;
use crate::error::CommandError;

/// Erase `count` pages starting at `first`
///
/// Returns the number of bytes erased.
pub fn run_erase<D: ProgMem + ?Sized>(
    flash: &D,
    first: usize,
    count: usize,
) -> Result<usize, Box<dyn std::error::Error>> {
    let end = first.saturating_add(count);
    if count == 0 || end > flash.page_count() {
        return Err(CommandError::PageRange {
            first,
            end,
            count: flash.page_count(),
        }
        .into());
    }

    println!("Erasing pages {}..{}", first, end);
    let pb = page_progress(count as u64, "Erasing");
    let mut erased = 0;
    for page in first..end {
        erased += flash.erase_page(page).inspect_err(|_| pb.abandon())?;
        pb.inc(1);
    }
    pb.finish_with_message("Erase complete");

    println!("Erased {} bytes", erased);
    Ok(erased)
}

/// Erase every page
pub fn run_erase_all<D: ProgMem + ?Sized>(flash: &D) -> Result<usize, Box<dyn std::error::Error>> {
    run_erase(flash, 0, flash.page_count())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_erase_range() {
        let sim = sim();
        sim.fill(0, &[0u8; 4 * 2048]);
        let flash = driver(&sim);

        assert_eq!(run_erase(&flash, 1, 2).unwrap(), 2 * 2048);
        assert_eq!(sim.read_array(0, 1), vec![0]);
        assert!(sim.read_array(2048, 2 * 2048).iter().all(|&b| b == 0xFF));
        assert_eq!(sim.read_array(3 * 2048, 1), vec![0]);
    }

    #[test]
    fn test_erase_all() {
        let sim = sim();
        sim.fill(5 * 2048, &[0x12; 64]);
        let flash = driver(&sim);

        assert_eq!(run_erase_all(&flash).unwrap(), 8 * 2048);
        assert!(sim.data().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_erase_past_end() {
        let sim = sim();
        let flash = driver(&sim);

        let err = run_erase(&flash, 7, 2).unwrap_err();
        assert!(err.to_string().contains("Pages 7..9"));
        assert!(run_erase(&flash, 0, 0).is_err());
        assert_eq!(sim.register_writes(), 0);
    }
}
