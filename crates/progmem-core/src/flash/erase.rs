//! Page erase and blank check

use super::Flash;
use crate::bus::{FlashBus, Stall};
use crate::error::{Result, VerifyFailure};
use crate::geometry::Page;
use crate::regs::{Cr, ERASED_BYTE};
use crate::sequencer::{lock_main, unlock_main, wait_while_busy};
use crate::state::ControllerState;

impl<B: FlashBus, S: Stall> Flash<B, S> {
    /// Erase one page and verify it reads back as all 0xFF
    ///
    /// Returns the page size on success.
    pub fn erase_page(&self, page: usize) -> Result<usize> {
        let page = self.geometry.page(page)?;

        let mut session = self.session();
        unlock_main(&self.regs, &self.stall);

        let started = session.enter(ControllerState::Erasing(page), Cr::PER);
        if started.is_ok() {
            let (bank, pnb) = self.geometry.bank_select(page);
            self.regs.modify_cr(Cr::PNB | Cr::BKER, Cr::page_select(bank, pnb));
            self.regs.modify_cr(Cr::empty(), Cr::STRT);

            let sr = wait_while_busy(&self.regs, &self.stall);
            session.leave(Cr::PER);

            // WRPERR on a protected page leaves the page untouched; the
            // verify below reports it
            let errors = sr.errors();
            if !errors.is_empty() {
                log::warn!("erase of page {} raised {:?}", page, errors);
                self.regs.clear_sr(errors);
            }
        }
        lock_main(&self.regs);
        started?;

        let dirty = self.count_dirty(page);
        drop(session);

        if dirty != 0 {
            log::error!("page {} not erased: {} bytes differ from 0xFF", page, dirty);
            return Err(VerifyFailure::Erase {
                page: page.index(),
                dirty,
            }
            .into());
        }
        log::debug!("erased page {}", page);
        Ok(self.geometry.page_size())
    }

    /// Count the bytes of a page that are not erased
    pub fn is_page_erased(&self, page: usize) -> Result<usize> {
        let page = self.geometry.page(page)?;
        let _session = self.session();
        Ok(self.count_dirty(page))
    }

    fn count_dirty(&self, page: Page) -> usize {
        let bus = self.regs.bus();
        self.geometry
            .page_range(page)
            .filter(|&addr| bus.read8(addr) != ERASED_BYTE)
            .count()
    }
}
