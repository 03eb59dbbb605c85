//! Verify command implementation

use std::path::Path;

use progmem_core::ProgMem;

use super::read::read_range;
use super::read_file;
use crate::error::CommandError;

/// Compare flash contents at `addr` with `expected`
pub fn verify_data<D: ProgMem + ?Sized>(
    flash: &D,
    addr: u32,
    expected: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let actual = read_range(flash, addr, expected.len())?;

    let mut mismatches = expected
        .iter()
        .zip(&actual)
        .enumerate()
        .filter(|(_, (e, a))| e != a);
    let Some((first, (&want, &got))) = mismatches.next() else {
        return Ok(());
    };
    let count = 1 + mismatches.count();

    log::debug!("first mismatch at offset {}", first);
    Err(CommandError::Mismatch {
        count,
        addr: addr + first as u32,
        expected: want,
        found: got,
    }
    .into())
}

/// Verify flash contents against a file
pub fn run_verify<D: ProgMem + ?Sized>(
    flash: &D,
    addr: u32,
    input: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let expected = read_file(input)?;
    verify_data(flash, addr, &expected)?;
    println!("Verification passed: {} bytes match", expected.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_verify_match() {
        let sim = sim();
        sim.fill(64, b"progmem");
        let flash = driver(&sim);
        verify_data(&flash, BASE + 64, b"progmem").unwrap();
    }

    #[test]
    fn test_verify_reports_first_mismatch() {
        let sim = sim();
        sim.fill(64, b"progmem");
        let flash = driver(&sim);

        let err = verify_data(&flash, BASE + 64, b"prOgmEm").unwrap_err();
        match err.downcast_ref::<CommandError>() {
            Some(CommandError::Mismatch {
                count,
                addr,
                expected,
                found,
            }) => {
                assert_eq!(*count, 2);
                assert_eq!(*addr, BASE + 66);
                assert_eq!(*expected, b'O');
                assert_eq!(*found, b'o');
            }
            other => panic!("unexpected result {:?}", other),
        }
    }
}
