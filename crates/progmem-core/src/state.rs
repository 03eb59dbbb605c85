//! Controller operating mode
//!
//! The FLASH controller runs at most one of page erase, programming and
//! option byte programming at a time, and a mode may only be entered from
//! and left back to idle. The driver tracks the mode it has put the
//! controller in and checks every change against this table before touching
//! a mode bit.

use crate::error::{Error, Result};
use crate::geometry::Page;

/// Mode the driver has put the controller in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    /// No mode bit set
    #[default]
    Idle,
    /// PER set with PNB selecting this page
    Erasing(Page),
    /// PG set for a write covering `start..end` (absolute addresses)
    Programming {
        /// First byte of the write
        start: u32,
        /// One past the last byte of the write
        end: u32,
    },
    /// OPTSTRT issued, waiting for the option bytes to be written
    OptionProgramming,
}

impl ControllerState {
    /// Whether the controller is idle
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition(&self, next: &Self) -> bool {
        self.is_idle() != next.is_idle()
    }

    /// Move to `next`, refusing any change that does not pass through idle
    pub fn transition(&mut self, next: Self) -> Result<()> {
        if !self.can_transition(&next) {
            let err = Error::InvalidTransition {
                from: *self,
                to: next,
            };
            log::error!("{}", err);
            debug_assert!(false, "{}", err);
            return Err(err);
        }
        log::trace!("controller {:?} -> {:?}", self, next);
        *self = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::FlashGeometry;

    fn page(n: usize) -> Page {
        FlashGeometry::new(0x0800_0000, 2048, 256).page(n).unwrap()
    }

    #[test]
    fn test_modes_pass_through_idle() {
        let mut state = ControllerState::default();
        state.transition(ControllerState::Erasing(page(3))).unwrap();
        state.transition(ControllerState::Idle).unwrap();
        state
            .transition(ControllerState::Programming {
                start: 0x0800_1800,
                end: 0x0800_1820,
            })
            .unwrap();
        state.transition(ControllerState::Idle).unwrap();
        state.transition(ControllerState::OptionProgramming).unwrap();
        state.transition(ControllerState::Idle).unwrap();
        assert!(state.is_idle());
    }

    #[test]
    fn test_direct_mode_switch_is_refused() {
        let erasing = ControllerState::Erasing(page(1));
        let programming = ControllerState::Programming { start: 0, end: 8 };
        assert!(!erasing.can_transition(&programming));
        assert!(!erasing.can_transition(&ControllerState::Erasing(page(2))));
        assert!(!ControllerState::Idle.can_transition(&ControllerState::Idle));
        assert!(ControllerState::OptionProgramming.can_transition(&ControllerState::Idle));
    }

    // debug_assert fires in test builds, so only check the refusal in release
    #[cfg(not(debug_assertions))]
    #[test]
    fn test_refused_transition_keeps_state() {
        let mut state = ControllerState::Erasing(page(1));
        let err = state.transition(ControllerState::OptionProgramming);
        assert!(matches!(err, Err(Error::InvalidTransition { .. })));
        assert_eq!(state, ControllerState::Erasing(page(1)));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "invalid controller transition")]
    fn test_refused_transition_asserts_in_debug() {
        let mut state = ControllerState::Erasing(page(1));
        let _ = state.transition(ControllerState::OptionProgramming);
    }
}
