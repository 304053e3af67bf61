#![allow(dead_code)]

use std::cell::Cell;
use std::time::Duration;

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, ReadNorFlash, check_erase, check_read, check_write,
};
use moto::Bootloader;
use moto_common::memory::{EXTERNAL_FLASH_SIZE, FLASH_SIZE};
use moto_common::uf2::{Uf2Block, Uf2Flags};
use quartz::device::flash::FlashError;
use quartz::device::timing::FloatingTimer;

/// RAM-backed NOR flash: erase sets bytes to 0xff, writes can only clear bits, and every erase or
/// write call is counted.
pub struct RamFlash<const ERASE: usize> {
    pub memory: Vec<u8>,
    pub erases: Cell<usize>,
    pub writes: Cell<usize>,
    pub fail_writes: Cell<bool>,
}

impl<const ERASE: usize> RamFlash<ERASE> {
    pub fn new(size: usize) -> Self {
        Self {
            memory: vec![0xff; size],
            erases: Cell::new(0),
            writes: Cell::new(0),
            fail_writes: Cell::new(false),
        }
    }

    pub fn with_bytes(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.memory[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn reset_counters(&self) {
        self.erases.set(0);
        self.writes.set(0);
    }

    pub fn page(&self, offset: usize) -> &[u8] {
        &self.memory[offset..offset + 256]
    }
}

impl<const ERASE: usize> ErrorType for RamFlash<ERASE> {
    type Error = FlashError;
}

impl<const ERASE: usize> ReadNorFlash for RamFlash<ERASE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        check_read(self, offset, bytes.len())?;
        let offset = offset as usize;
        bytes.copy_from_slice(&self.memory[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.memory.len()
    }
}

impl<const ERASE: usize> NorFlash for RamFlash<ERASE> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = ERASE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        check_erase(self, from, to)?;
        self.memory[from as usize..to as usize].fill(0xff);
        self.erases
            .set(self.erases.get() + (to - from) as usize / ERASE);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        check_write(self, offset, bytes.len())?;
        if self.fail_writes.get() {
            return Err(FlashError::HardwareFault(1));
        }
        let offset = offset as usize;
        for (i, (cell, &byte)) in self.memory[offset..].iter_mut().zip(bytes).enumerate() {
            assert_eq!(
                *cell & byte,
                byte,
                "programming would set bits at {:#x}",
                offset + i
            );
            *cell = byte;
        }
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }
}

pub type InternalFlash = RamFlash<256>;
pub type ExternalFlash = RamFlash<4096>;

pub fn internal_flash() -> InternalFlash {
    RamFlash::new(FLASH_SIZE as usize)
}

pub fn external_flash() -> ExternalFlash {
    RamFlash::new(EXTERNAL_FLASH_SIZE as usize)
}

/// Timer that only moves when told to.
pub struct ManualTimer(Cell<u64>);

impl ManualTimer {
    pub fn new() -> Self {
        Self(Cell::new(1_000))
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by.as_micros() as u64);
    }
}

impl FloatingTimer for ManualTimer {
    fn floating_time(&self) -> u64 {
        self.0.get()
    }
}

pub type TestLoader<'t> = Bootloader<InternalFlash, ExternalFlash, &'t ManualTimer>;

pub fn loader(timer: &ManualTimer) -> TestLoader<'_> {
    Bootloader::new(internal_flash(), external_flash(), timer)
}

/// Sector buffer with the alignment the transport guarantees.
#[repr(C, align(4))]
#[derive(Clone)]
pub struct Sector(pub [u8; 512]);

impl Sector {
    pub fn zeroed() -> Self {
        Self([0; 512])
    }

    pub fn filled(byte: u8) -> Self {
        Self([byte; 512])
    }

    pub fn block(&self) -> &Uf2Block {
        Uf2Block::from_sector(&self.0).unwrap()
    }

    pub fn block_mut(&mut self) -> &mut Uf2Block {
        Uf2Block::from_sector_mut(&mut self.0).unwrap()
    }
}

pub fn uf2(address: u32, block_no: u32, block_count: u32, payload: &[u8]) -> Sector {
    let block = Uf2Block::new(Uf2Flags::EMPTY, address, block_no, block_count, None, payload).unwrap();
    let mut sector = Sector::zeroed();
    sector.0.copy_from_slice(block.as_bytes());
    sector
}

/// A page whose bytes depend on `seed` and position.
pub fn pattern(seed: u8) -> [u8; 256] {
    let mut page = [0; 256];
    for (i, b) in page.iter_mut().enumerate() {
        *b = seed.wrapping_mul(31).wrapping_add(i as u8);
    }
    page
}
