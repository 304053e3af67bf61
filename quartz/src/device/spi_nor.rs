//! Driver for 25-series SPI NOR flash (PY25Q16 and friends) behind an [`SpiDevice`].
//!
//! Every operation is a complete chip-select framed transaction. Erase and program wait for the
//! WIP bit to clear before returning, with a bounded number of status polls.

use embedded_hal::delay::DelayNs;
use embedded_hal::spi::{Operation, SpiDevice};
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, ReadNorFlash, check_erase, check_read, check_write,
};

use super::flash::{FlashError, wait_while_busy};

pub mod command {
    pub const PAGE_PROGRAM: u8 = 0x02;
    pub const READ_DATA: u8 = 0x03;
    pub const READ_STATUS: u8 = 0x05;
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const SECTOR_ERASE: u8 = 0x20;
}

/// Program granularity; a page program must not cross one of these boundaries.
pub const PAGE_SIZE: usize = 256;
pub const SECTOR_SIZE: usize = 4096;

proc_bitfield::bitfield! {
    /// Status register 1.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Status(pub u8): Debug, FromStorage, IntoStorage, DerefStorage {
        pub write_in_progress: bool @ 0,
        pub write_enable_latch: bool @ 1,
    }
}

#[derive(Debug, Copy, Clone)]
pub struct Config {
    /// Device size in bytes.
    pub capacity: u32,
    /// Status reads allowed per erase or program before giving up.
    pub poll_budget: u32,
    /// Pause between status reads while the device is busy.
    pub poll_interval_us: u32,
}
impl Config {
    /// 2 MiB PY25Q16. Sector erase is specified at 300 ms worst case, so 10 us polls with a
    /// 100k budget leave ample margin.
    pub const fn py25q16() -> Self {
        Self {
            capacity: 2 * 1024 * 1024,
            poll_budget: 100_000,
            poll_interval_us: 10,
        }
    }
}

pub struct SpiNor<SPI, D> {
    spi: SPI,
    delay: D,
    config: Config,
}

impl<SPI: SpiDevice, D: DelayNs> SpiNor<SPI, D> {
    pub fn new(spi: SPI, delay: D, config: Config) -> Self {
        Self { spi, delay, config }
    }

    pub fn release(self) -> (SPI, D) {
        (self.spi, self.delay)
    }

    pub fn read_status(&mut self) -> Result<Status, FlashError> {
        let mut status = [0];
        self.spi
            .transaction(&mut [
                Operation::Write(&[command::READ_STATUS]),
                Operation::Read(&mut status),
            ])
            .map_err(|_| FlashError::Bus)?;
        Ok(Status(status[0]))
    }

    fn wait_idle(&mut self) -> Result<(), FlashError> {
        let budget = self.config.poll_budget;
        let interval = self.config.poll_interval_us;
        wait_while_busy(budget, || {
            let busy = self.read_status()?.write_in_progress();
            if busy {
                self.delay.delay_us(interval);
            }
            Ok(busy)
        })
    }

    fn write_enable(&mut self) -> Result<(), FlashError> {
        self.spi
            .write(&[command::WRITE_ENABLE])
            .map_err(|_| FlashError::Bus)
    }

    fn erase_sector(&mut self, address: u32) -> Result<(), FlashError> {
        self.write_enable()?;
        self.spi
            .write(&with_address(command::SECTOR_ERASE, address))
            .map_err(|_| FlashError::Bus)?;
        self.wait_idle()
    }

    fn program_page(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError> {
        self.write_enable()?;
        self.spi
            .transaction(&mut [
                Operation::Write(&with_address(command::PAGE_PROGRAM, address)),
                Operation::Write(data),
            ])
            .map_err(|_| FlashError::Bus)?;
        self.wait_idle()
    }
}

/// Opcode followed by a 24-bit big-endian address.
fn with_address(opcode: u8, address: u32) -> [u8; 4] {
    let [_, a2, a1, a0] = address.to_be_bytes();
    [opcode, a2, a1, a0]
}

impl<SPI, D> ErrorType for SpiNor<SPI, D> {
    type Error = FlashError;
}

impl<SPI: SpiDevice, D: DelayNs> ReadNorFlash for SpiNor<SPI, D> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), FlashError> {
        check_read(self, offset, bytes.len())?;
        if bytes.is_empty() {
            return Ok(());
        }
        self.spi
            .transaction(&mut [
                Operation::Write(&with_address(command::READ_DATA, offset)),
                Operation::Read(bytes),
            ])
            .map_err(|_| FlashError::Bus)
    }

    fn capacity(&self) -> usize {
        self.config.capacity as usize
    }
}

impl<SPI: SpiDevice, D: DelayNs> NorFlash for SpiNor<SPI, D> {
    const WRITE_SIZE: usize = 1;
    const ERASE_SIZE: usize = SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), FlashError> {
        check_erase(self, from, to)?;
        for address in (from..to).step_by(SECTOR_SIZE) {
            self.erase_sector(address)?;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), FlashError> {
        check_write(self, offset, bytes.len())?;
        let mut address = offset;
        let mut rest = bytes;
        while !rest.is_empty() {
            let room = PAGE_SIZE - (address as usize % PAGE_SIZE);
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            self.program_page(address, chunk)?;
            address += chunk.len() as u32;
            rest = tail;
        }
        Ok(())
    }
}
