//! Errors and helpers common to the flash drivers.

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};
use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum FlashError {
    #[error("address or length not aligned to the flash write/erase granularity")]
    NotAligned,
    #[error("access beyond the end of the flash device")]
    OutOfBounds,
    #[error("flash stayed busy after {0} status polls")]
    HardwareFault(u32),
    #[error("bus transfer to the flash device failed")]
    Bus,
}

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            FlashError::NotAligned => NorFlashErrorKind::NotAligned,
            FlashError::OutOfBounds => NorFlashErrorKind::OutOfBounds,
            FlashError::HardwareFault(_) | FlashError::Bus => NorFlashErrorKind::Other,
        }
    }
}

impl From<NorFlashErrorKind> for FlashError {
    fn from(kind: NorFlashErrorKind) -> Self {
        match kind {
            NorFlashErrorKind::NotAligned => FlashError::NotAligned,
            NorFlashErrorKind::OutOfBounds => FlashError::OutOfBounds,
            _ => FlashError::Bus,
        }
    }
}

/// Poll `busy` until it reports false, at most `budget` times.
///
/// Returns [`FlashError::HardwareFault`] if the device is still busy once the budget is spent; any
/// error from `busy` itself is passed through.
pub fn wait_while_busy<F>(budget: u32, mut busy: F) -> Result<(), FlashError>
where
    F: FnMut() -> Result<bool, FlashError>,
{
    for _ in 0..budget {
        if !busy()? {
            return Ok(());
        }
    }
    Err(FlashError::HardwareFault(budget))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_gives_up_after_budget() {
        let mut polls = 0;
        let r = wait_while_busy(5, || {
            polls += 1;
            Ok(true)
        });
        assert_eq!(r, Err(FlashError::HardwareFault(5)));
        assert_eq!(polls, 5);
    }

    #[test]
    fn wait_returns_when_idle() {
        let mut polls = 0;
        let r = wait_while_busy(5, || {
            polls += 1;
            Ok(polls < 3)
        });
        assert_eq!(r, Ok(()));
        assert_eq!(polls, 3);
    }

    #[test]
    fn kinds_round_trip() {
        assert_eq!(FlashError::from(NorFlashErrorKind::NotAligned), FlashError::NotAligned);
        assert_eq!(FlashError::HardwareFault(1).kind(), NorFlashErrorKind::Other);
    }
}
