//! Write command implementation

use std::path::Path;

use progmem_core::ProgMem;

use super::{byte_progress, check_fits, read_file, run_erase};

/// Pad to a whole number of 32-bit words with erased bytes
fn pad_to_word(data: &mut Vec<u8>) {
    let padded = data.len().next_multiple_of(4);
    data.resize(padded, 0xFF);
}

/// Program `data` at `addr` one page-sized chunk at a time
///
/// `addr` must be double-word aligned; every chunk but the last is a whole
/// number of double-words, so each chunk start stays aligned.
pub fn write_data<D: ProgMem + ?Sized>(
    flash: &D,
    addr: u32,
    data: &[u8],
) -> Result<usize, Box<dyn std::error::Error>> {
    let chunk_size = flash.page_size(0).max(8);
    let pb = byte_progress(data.len() as u64, "Writing");

    let mut written = 0;
    for chunk in data.chunks(chunk_size) {
        let chunk_addr = addr + written as u32;
        written += flash
            .write(chunk_addr, chunk)
            .inspect_err(|_| pb.abandon())?;
        pb.set_position(written as u64);
    }
    pb.finish_with_message("Write complete");
    Ok(written)
}

/// Program a file at `addr`, optionally erasing the covered pages first
pub fn run_write<D: ProgMem + ?Sized>(
    flash: &D,
    addr: u32,
    input: &Path,
    erase: bool,
) -> Result<usize, Box<dyn std::error::Error>> {
    let mut data = read_file(input)?;
    if data.is_empty() {
        println!("Nothing to write");
        return Ok(0);
    }
    pad_to_word(&mut data);
    check_fits(flash, addr, data.len())?;

    if erase {
        let first = flash.page_index(addr)?;
        let last = flash.page_index(addr + data.len() as u32 - 1)?;
        run_erase(flash, first, last - first + 1)?;
    }

    let written = write_data(flash, addr, &data)?;
    println!("Wrote {} bytes at 0x{:08X}", written, addr);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::CommandError;
    use std::fs;

    #[test]
    fn test_pad_to_word() {
        let mut data = vec![1, 2, 3, 4, 5];
        pad_to_word(&mut data);
        assert_eq!(data, vec![1, 2, 3, 4, 5, 0xFF, 0xFF, 0xFF]);

        let mut aligned = vec![0; 8];
        pad_to_word(&mut aligned);
        assert_eq!(aligned.len(), 8);
    }

    #[test]
    fn test_write_across_pages() {
        let sim = sim();
        let flash = driver(&sim);
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();

        assert_eq!(write_data(&flash, BASE + 2048, &data).unwrap(), 3000);
        assert_eq!(sim.read_array(2048, 3000), data);
        assert!(sim.violations().is_empty());
    }

    #[test]
    fn test_write_file_with_erase() {
        let sim = sim();
        sim.fill(2048, &[0u8; 2048]);
        let flash = driver(&sim);

        let input = temp_path("write-erase");
        fs::write(&input, [0xA5; 6]).unwrap();
        assert_eq!(run_write(&flash, 0x800, &input, true).unwrap(), 8);
        fs::remove_file(&input).unwrap();

        assert_eq!(
            sim.read_array(2048, 10),
            vec![0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xA5, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_write_too_large() {
        let sim = sim();
        let flash = driver(&sim);

        let input = temp_path("write-large");
        fs::write(&input, vec![0u8; 4096]).unwrap();
        let err = run_write(&flash, BASE + 7 * 2048, &input, false).unwrap_err();
        fs::remove_file(&input).unwrap();

        assert!(matches!(
            err.downcast_ref::<CommandError>(),
            Some(CommandError::TooLarge { len: 4096, .. })
        ));
        assert_eq!(sim.register_writes(), 0);
    }
}
