//! Read command implementation

use std::fs;
use std::path::Path;

use progmem_core::ProgMem;

use super::{byte_progress, check_fits};

/// Default chunk size for reading (4 KiB)
const READ_CHUNK_SIZE: usize = 4096;

/// Read `len` bytes starting at `addr`
pub fn read_range<D: ProgMem + ?Sized>(
    flash: &D,
    addr: u32,
    len: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    check_fits(flash, addr, len)?;

    let mut data = vec![0u8; len];
    let pb = byte_progress(len as u64, "Reading");
    let mut done = 0;
    for chunk in data.chunks_mut(READ_CHUNK_SIZE) {
        done += flash
            .read(addr + done as u32, chunk)
            .inspect_err(|_| pb.abandon())?;
        pb.set_position(done as u64);
    }
    pb.finish_with_message("Read complete");
    Ok(data)
}

/// Read flash contents into a file
pub fn run_read<D: ProgMem + ?Sized>(
    flash: &D,
    addr: u32,
    len: usize,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = read_range(flash, addr, len)?;
    fs::write(output, &data)?;
    println!("Wrote {} bytes to {:?}", data.len(), output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_read_to_file() {
        let sim = sim();
        let pattern: Vec<u8> = (0..6000u32).map(|i| (i * 7) as u8).collect();
        sim.fill(1000, &pattern);
        let flash = driver(&sim);

        let output = temp_path("read");
        run_read(&flash, BASE + 1000, pattern.len(), &output).unwrap();
        assert_eq!(fs::read(&output).unwrap(), pattern);
        fs::remove_file(&output).unwrap();
    }

    #[test]
    fn test_read_past_end() {
        let sim = sim();
        let flash = driver(&sim);
        assert!(read_range(&flash, BASE + 8 * 2048 - 4, 8).is_err());
        assert_eq!(read_range(&flash, BASE + 8 * 2048 - 4, 4).unwrap(), vec![0xFF; 4]);
    }
}
