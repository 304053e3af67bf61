//! Page programmers for the two flash targets.

use embedded_storage::nor_flash::NorFlash;
use moto_common::memory::{ERASED_BYTE, FlashTarget, PAGE_SIZE};
use quartz::device::flash::FlashError;

use crate::cache::SectorCache;

pub const PAGE: usize = PAGE_SIZE as usize;
pub type Page = [u8; PAGE];

/// Raw flash access in UF2 target-address space.
pub trait FlashAccess {
    fn read(&mut self, target: FlashTarget, address: u32, bytes: &mut [u8])
    -> Result<(), FlashError>;

    /// Program one whole page at page-aligned `address`. Programming a page with the content it
    /// already holds must succeed.
    fn program_page(
        &mut self,
        target: FlashTarget,
        address: u32,
        page: &Page,
    ) -> Result<(), FlashError>;
}

/// Programs the MCU's own flash, where erase granularity equals the page size.
pub struct DirectProgrammer<F> {
    flash: F,
}

impl<F> DirectProgrammer<F>
where
    F: NorFlash,
    F::Error: Into<FlashError>,
{
    const GEOMETRY: () = assert!(F::ERASE_SIZE == PAGE && PAGE % F::WRITE_SIZE == 0);

    pub fn new(flash: F) -> Self {
        let () = Self::GEOMETRY;
        Self { flash }
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn into_inner(self) -> F {
        self.flash
    }

    pub fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        self.flash.read(offset, bytes).map_err(Into::into)
    }

    /// Skips pages that already hold `page`, and erases only pages that are not blank.
    pub fn program_page(&mut self, offset: u32, page: &Page) -> Result<(), FlashError> {
        let mut current = [0; PAGE];
        self.read(offset, &mut current)?;
        if current == *page {
            return Ok(());
        }
        if current.iter().any(|&b| b != ERASED_BYTE) {
            self.flash
                .erase(offset, offset + PAGE as u32)
                .map_err(Into::into)?;
        }
        self.flash.write(offset, page).map_err(Into::into)
    }
}

/// The programmer responsible for one target.
pub enum PageProgrammer<'a, I, E> {
    Direct(&'a mut DirectProgrammer<I>),
    Cached(&'a mut SectorCache<E>),
}

impl<I, E> PageProgrammer<'_, I, E>
where
    I: NorFlash,
    I::Error: Into<FlashError>,
    E: NorFlash,
    E::Error: Into<FlashError>,
{
    pub fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        match self {
            PageProgrammer::Direct(p) => p.read(offset, bytes),
            PageProgrammer::Cached(c) => c.read(offset, bytes).map_err(Into::into),
        }
    }

    pub fn program_page(&mut self, offset: u32, page: &Page) -> Result<(), FlashError> {
        match self {
            PageProgrammer::Direct(p) => p.program_page(offset, page),
            PageProgrammer::Cached(c) => c.program_page(offset, page).map_err(Into::into),
        }
    }
}

/// Both flash devices, addressed by target.
pub struct FlashTargets<I, E> {
    internal: DirectProgrammer<I>,
    external: SectorCache<E>,
}

impl<I, E> FlashTargets<I, E>
where
    I: NorFlash,
    I::Error: Into<FlashError>,
    E: NorFlash,
    E::Error: Into<FlashError>,
{
    pub fn new(internal: I, external: E) -> Self {
        Self {
            internal: DirectProgrammer::new(internal),
            external: SectorCache::new(external),
        }
    }

    pub fn internal(&self) -> &I {
        self.internal.flash()
    }

    pub fn external(&self) -> &E {
        self.external.device()
    }

    pub fn into_inner(self) -> (I, E) {
        (self.internal.into_inner(), self.external.into_inner())
    }

    pub fn programmer(&mut self, target: FlashTarget) -> PageProgrammer<'_, I, E> {
        match target {
            FlashTarget::Firmware => PageProgrammer::Direct(&mut self.internal),
            FlashTarget::Data => PageProgrammer::Cached(&mut self.external),
        }
    }
}

impl<I, E> FlashAccess for FlashTargets<I, E>
where
    I: NorFlash,
    I::Error: Into<FlashError>,
    E: NorFlash,
    E::Error: Into<FlashError>,
{
    fn read(
        &mut self,
        target: FlashTarget,
        address: u32,
        bytes: &mut [u8],
    ) -> Result<(), FlashError> {
        let offset = target.region().device_offset(address);
        self.programmer(target).read(offset, bytes)
    }

    fn program_page(
        &mut self,
        target: FlashTarget,
        address: u32,
        page: &Page,
    ) -> Result<(), FlashError> {
        let offset = target.region().device_offset(address);
        self.programmer(target).program_page(offset, page)
    }
}
