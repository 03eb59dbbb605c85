//! Option bytes command implementation

use progmem_core::bus::{FlashBus, Stall};
use progmem_core::Flash;

use super::info::rdp_level;

/// Show FLASH_OPTR, or clear then set bits in it
///
/// Returns the register value after the command.
pub fn run_option_bytes<B: FlashBus, S: Stall>(
    flash: &Flash<B, S>,
    clear: u32,
    set: u32,
) -> Result<u32, Box<dyn std::error::Error>> {
    let before = flash.option_bytes();
    if clear == 0 && set == 0 {
        println!("Option bytes: 0x{:08X} (RDP {})", before, rdp_level(before));
        return Ok(before);
    }

    let after = flash.modify_option_bytes(clear, set)?;
    println!("Option bytes: 0x{:08X} -> 0x{:08X}", before, after);
    println!("New values take effect after the next option byte reload");
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use progmem_core::{Error, ErrorKind};

    #[test]
    fn test_show_only() {
        let sim = sim();
        let flash = driver(&sim);
        assert_eq!(
            run_option_bytes(&flash, 0, 0).unwrap(),
            progmem_sim::FACTORY_OPTR
        );
        assert!(sim.optr_writes().is_empty());
    }

    #[test]
    fn test_modify() {
        let sim = sim();
        let flash = driver(&sim);
        let after = run_option_bytes(&flash, 0x0000_0700, 0).unwrap();
        assert_eq!(after, progmem_sim::FACTORY_OPTR & !0x0000_0700);
        assert_eq!(sim.optr_writes(), vec![after]);
    }

    #[test]
    fn test_rdp_refused() {
        let sim = sim();
        let flash = driver(&sim);
        let err = run_option_bytes(&flash, 0xFF, 0xBB).unwrap_err();
        let err = err.downcast_ref::<Error>().map(Error::kind);
        assert_eq!(err, Some(ErrorKind::PreconditionViolation));
        assert_eq!(sim.optr(), progmem_sim::FACTORY_OPTR);
    }
}
