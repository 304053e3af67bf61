//! Page-erasable flash embedded in the MCU.
//!
//! The register interface differs between parts, so it sits behind [`FlashController`];
//! [`InternalFlash`] layers the sequencing (busy waits, unlock/lock) and the
//! [`embedded_storage`] traits on top.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, ReadNorFlash, check_erase, check_read, check_write,
};

use super::flash::{FlashError, wait_while_busy};

/// Erase and program granularity of the embedded flash.
pub const PAGE_SIZE: usize = 256;

/// Raw operations on an embedded flash controller. Offsets are relative to the start of the
/// flash array.
pub trait FlashController {
    /// Copy bytes out of the memory-mapped flash array.
    fn read(&self, offset: u32, bytes: &mut [u8]);
    /// BSY flag.
    fn busy(&self) -> bool;
    fn unlock(&mut self);
    fn lock(&mut self);
    /// Kick off erasure of the page at `offset`; completion is signalled through [`busy`](FlashController::busy).
    fn start_page_erase(&mut self, offset: u32);
    /// Kick off programming of one whole page.
    fn start_page_program(&mut self, offset: u32, page: &[u8; PAGE_SIZE]);
}

pub struct InternalFlash<C> {
    controller: C,
    capacity: u32,
    poll_budget: u32,
}

impl<C: FlashController> InternalFlash<C> {
    pub fn new(controller: C, capacity: u32, poll_budget: u32) -> Self {
        Self {
            controller,
            capacity,
            poll_budget,
        }
    }

    pub fn controller(&self) -> &C {
        &self.controller
    }

    /// Run one controller operation with the controller unlocked; it is locked again even if the
    /// operation never completes.
    fn unlocked<F>(&mut self, start: F) -> Result<(), FlashError>
    where
        F: FnOnce(&mut C),
    {
        let budget = self.poll_budget;
        wait_while_busy(budget, || Ok(self.controller.busy()))?;
        self.controller.unlock();
        start(&mut self.controller);
        let done = wait_while_busy(budget, || Ok(self.controller.busy()));
        self.controller.lock();
        done
    }
}

impl<C> ErrorType for InternalFlash<C> {
    type Error = FlashError;
}

impl<C: FlashController> ReadNorFlash for InternalFlash<C> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        check_read(self, offset, bytes.len())?;
        self.controller.read(offset, bytes);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.capacity as usize
    }
}

impl<C: FlashController> NorFlash for InternalFlash<C> {
    const WRITE_SIZE: usize = PAGE_SIZE;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        check_erase(self, from, to)?;
        for offset in (from..to).step_by(PAGE_SIZE) {
            self.unlocked(|c| c.start_page_erase(offset))?;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        check_write(self, offset, bytes.len())?;
        for (i, chunk) in bytes.chunks_exact(PAGE_SIZE).enumerate() {
            let page: &[u8; PAGE_SIZE] = chunk.try_into().map_err(|_| FlashError::NotAligned)?;
            let page_offset = offset + (i * PAGE_SIZE) as u32;
            self.unlocked(|c| c.start_page_program(page_offset, page))?;
        }
        Ok(())
    }
}
