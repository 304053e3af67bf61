//! Single-sector write cache in front of the external NOR.
//!
//! Pages arrive one at a time but the chip only erases whole sectors. The cache keeps a copy of the
//! most recently touched sector so that a page which is unchanged, or lands on erased flash, costs
//! no erase; otherwise the sector is erased and rebuilt from the copy so neighbouring pages survive.

use embedded_storage::nor_flash::NorFlash;
use moto_common::memory::{ERASED_BYTE, PAGE_SIZE};

const PAGE: usize = PAGE_SIZE as usize;

pub struct SectorCache<F, const SECTOR: usize = 4096> {
    device: F,
    /// Device offset of the sector held in `buffer`, if `buffer` matches the device.
    tag: Option<u32>,
    buffer: [u8; SECTOR],
}

impl<F: NorFlash, const SECTOR: usize> SectorCache<F, SECTOR> {
    const GEOMETRY: () = assert!(
        SECTOR == F::ERASE_SIZE && SECTOR % PAGE == 0 && PAGE % F::WRITE_SIZE == 0,
        "cache sector must be the device's erase size and a whole number of pages"
    );

    pub fn new(device: F) -> Self {
        let () = Self::GEOMETRY;
        Self {
            device,
            tag: None,
            buffer: [ERASED_BYTE; SECTOR],
        }
    }

    pub fn device(&self) -> &F {
        &self.device
    }

    pub fn into_inner(self) -> F {
        self.device
    }

    /// Device offset of the cached sector.
    pub fn cached_sector(&self) -> Option<u32> {
        self.tag
    }

    /// Reads go straight to the device; the cache is write-through so it never holds newer data.
    pub fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), F::Error> {
        self.device.read(offset, bytes)
    }

    /// Program one page at page-aligned device offset `offset`.
    pub fn program_page(&mut self, offset: u32, page: &[u8; PAGE]) -> Result<(), F::Error> {
        let base = offset - offset % SECTOR as u32;
        let at = (offset - base) as usize;

        if self.tag != Some(base) {
            self.tag = None;
            self.device.read(base, &mut self.buffer)?;
            self.tag = Some(base);
        }

        let cached = &self.buffer[at..at + PAGE];
        if cached == page {
            return Ok(());
        }
        let in_place = cached.iter().all(|&b| b == ERASED_BYTE);
        self.buffer[at..at + PAGE].copy_from_slice(page);

        let result = if in_place {
            self.device.write(offset, page)
        } else {
            self.rewrite(base)
        };
        if result.is_err() {
            // device contents unknown
            self.tag = None;
        }
        result
    }

    /// Erase the sector at `base` and program it back from the buffer. Pages that are entirely
    /// erased need no programming.
    fn rewrite(&mut self, base: u32) -> Result<(), F::Error> {
        self.device.erase(base, base + SECTOR as u32)?;
        for (i, page) in self.buffer.chunks_exact(PAGE).enumerate() {
            if page.iter().all(|&b| b == ERASED_BYTE) {
                continue;
            }
            self.device.write(base + (i * PAGE) as u32, page)?;
        }
        Ok(())
    }
}
