//! Double-word programming and read back

use super::Flash;
use crate::bus::{FlashBus, Stall};
use crate::error::{Error, Misalignment, Result, VerifyFailure};
use crate::regs::{Cr, Sr, DOUBLE_WORD, ERASED_WORD, WORD};
use crate::sequencer::{lock_main, unlock_main, wait_while_busy};
use crate::state::ControllerState;

/// Little-endian word at `offset` of `bytes`
fn word_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// The two words programmed for one chunk of at most 8 bytes
///
/// A chunk holding a single word is completed with the erased pattern so the
/// controller still sees a full double-word.
fn double_word(chunk: &[u8]) -> (u32, u32) {
    let low = word_at(chunk, 0);
    let high = if chunk.len() > WORD {
        word_at(chunk, WORD)
    } else {
        ERASED_WORD
    };
    (low, high)
}

fn join(low: u32, high: u32) -> u64 {
    ((high as u64) << 32) | low as u64
}

impl<B: FlashBus, S: Stall> Flash<B, S> {
    /// Program `buf` at `addr` (absolute or linear)
    ///
    /// `addr` must be double-word aligned and the length a multiple of 4;
    /// a trailing single word is padded with 0xFFFF_FFFF. The target must
    /// have been erased. Returns the number of bytes written.
    pub fn write(&self, addr: u32, buf: &[u8]) -> Result<usize> {
        self.program(addr, buf, buf.len())
    }

    /// Program the first `len` bytes of `buf` at `addr`
    pub fn program(&self, addr: u32, buf: &[u8], len: usize) -> Result<usize> {
        let data = buf.get(..len).ok_or(Misalignment::ShortBuffer {
            len,
            available: buf.len(),
        })?;
        if addr as usize % DOUBLE_WORD != 0 {
            return Err(Misalignment::Address { addr }.into());
        }
        if len % WORD != 0 {
            return Err(Misalignment::Length { len }.into());
        }
        let start = self.geometry.resolve(addr, len)?;
        if len == 0 {
            return Ok(0);
        }

        let mut session = self.session();
        unlock_main(&self.regs, &self.stall);

        let result = session
            .enter(
                ControllerState::Programming {
                    start,
                    end: start.saturating_add(len as u32),
                },
                Cr::PG,
            )
            .and_then(|()| {
                let result = self.program_double_words(start, data);
                session.leave(Cr::PG);
                result
            });

        if let Err(err) = &result {
            log::error!("flash write at 0x{:08X} failed: {}", start, err);
            self.regs.clear_sr(Sr::PROGRAM_ERRORS);
        }
        lock_main(&self.regs);
        drop(session);

        result.map(|()| {
            log::debug!("programmed {} bytes at 0x{:08X}", len, start);
            len
        })
    }

    fn program_double_words(&self, start: u32, data: &[u8]) -> Result<()> {
        let bus = self.regs.bus();

        for (i, chunk) in data.chunks(DOUBLE_WORD).enumerate() {
            let addr = start + (i * DOUBLE_WORD) as u32;
            let (low, high) = double_word(chunk);

            bus.write32(addr, low);
            bus.write32(addr + WORD as u32, high);

            let sr = wait_while_busy(&self.regs, &self.stall);
            if sr.contains(Sr::WRPERR) {
                return Err(Error::ProtectionViolation {
                    addr,
                    status: sr.bits(),
                });
            }

            let found = join(bus.read32(addr), bus.read32(addr + WORD as u32));
            let expected = join(low, high);
            if found != expected {
                return Err(VerifyFailure::Program {
                    addr,
                    expected,
                    found,
                    status: sr.bits(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Copy `buf.len()` bytes starting at `addr` (absolute or linear)
    pub fn read(&self, addr: u32, buf: &mut [u8]) -> Result<usize> {
        let start = self.geometry.resolve(addr, buf.len())?;
        let bus = self.regs.bus();

        let _session = self.session();
        for (byte, addr) in buf.iter_mut().zip(start..) {
            *byte = bus.read8(addr);
        }
        Ok(buf.len())
    }
}
