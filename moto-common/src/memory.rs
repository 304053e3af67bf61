//! Flash memory map shared by the bootloader and the host packer.
//!
//! Two programmable regions exist: the MCU's own flash above the bootloader, and the external
//! SPI NOR chip. Regions are matched in the order of [`REGIONS`], so the internal firmware region
//! wins any overlap.

use core::fmt;

/// Flash page size; the unit of one UF2 payload on both targets.
pub const PAGE_SIZE: u32 = 256;
/// Value of every byte of erased NOR flash.
pub const ERASED_BYTE: u8 = 0xff;

pub const FLASH_BASE: u32 = 0x0800_0000;
pub const FLASH_SIZE: u32 = 128 * 1024;
/// Linked size of the bootloader image; firmware begins immediately after it.
pub const BOOTLOADER_SIZE: u32 = 0x2800;
pub const FIRMWARE_ADDRESS: u32 = FLASH_BASE + BOOTLOADER_SIZE;
pub const FIRMWARE_PAGE_COUNT: u32 = 472;

pub const EXTERNAL_FLASH_BASE: u32 = 0;
pub const EXTERNAL_FLASH_SIZE: u32 = 2 * 1024 * 1024;
pub const EXTERNAL_SECTOR_SIZE: u32 = 4 * 1024;
pub const EXTERNAL_PAGE_COUNT: u32 = EXTERNAL_FLASH_SIZE / PAGE_SIZE;

const _: () = {
    assert!(FIRMWARE_ADDRESS % PAGE_SIZE == 0);
    assert!(BOOTLOADER_SIZE + FIRMWARE_PAGE_COUNT * PAGE_SIZE <= FLASH_SIZE);
    assert!(EXTERNAL_SECTOR_SIZE % PAGE_SIZE == 0);
    assert!(EXTERNAL_PAGE_COUNT == 8192);
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FlashTarget {
    /// Executable flash inside the MCU.
    Firmware,
    /// External SPI NOR.
    Data,
}
impl fmt::Display for FlashTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            FlashTarget::Firmware => "firmware",
            FlashTarget::Data => "data",
        })
    }
}

/// A contiguous, page-aligned run of programmable flash, in UF2 target-address space.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FlashRegion {
    pub target: FlashTarget,
    pub base_address: u32,
    pub page_count: u32,
    /// Target address that corresponds to offset 0 of the underlying device.
    pub origin: u32,
}
impl FlashRegion {
    pub const fn size(&self) -> u32 {
        self.page_count * PAGE_SIZE
    }

    /// One past the last address of the region.
    pub const fn end(&self) -> u32 {
        self.base_address + self.size()
    }

    pub const fn contains(&self, address: u32) -> bool {
        address >= self.base_address && address < self.end()
    }

    /// Index of the page holding `address`, or `None` if it is outside the region.
    pub const fn page_index(&self, address: u32) -> Option<u32> {
        if self.contains(address) {
            Some((address - self.base_address) / PAGE_SIZE)
        } else {
            None
        }
    }

    pub const fn page_address(&self, index: u32) -> u32 {
        self.base_address + index * PAGE_SIZE
    }

    /// Translate a target address into an offset for the backing device.
    pub const fn device_offset(&self, address: u32) -> u32 {
        address - self.origin
    }
}

pub const FIRMWARE_REGION: FlashRegion = FlashRegion {
    target: FlashTarget::Firmware,
    base_address: FIRMWARE_ADDRESS,
    page_count: FIRMWARE_PAGE_COUNT,
    origin: FLASH_BASE,
};

pub const DATA_REGION: FlashRegion = FlashRegion {
    target: FlashTarget::Data,
    base_address: EXTERNAL_FLASH_BASE,
    page_count: EXTERNAL_PAGE_COUNT,
    origin: EXTERNAL_FLASH_BASE,
};

/// Known regions, highest priority first.
pub const REGIONS: [FlashRegion; 2] = [FIRMWARE_REGION, DATA_REGION];

/// Largest block count any region can accept.
pub const MAX_REGION_PAGES: u32 = {
    let mut max = 0;
    let mut i = 0;
    while i < REGIONS.len() {
        if REGIONS[i].page_count > max {
            max = REGIONS[i].page_count;
        }
        i += 1;
    }
    max
};

impl FlashTarget {
    pub const fn region(self) -> FlashRegion {
        match self {
            FlashTarget::Firmware => FIRMWARE_REGION,
            FlashTarget::Data => DATA_REGION,
        }
    }
}

/// First region, in priority order, that holds `address`.
pub fn region_for(address: u32) -> Option<FlashRegion> {
    REGIONS.iter().copied().find(|region| region.contains(address))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn firmware_sits_above_bootloader() {
        assert_eq!(FIRMWARE_REGION.base_address, 0x0800_2800);
        assert_eq!(FIRMWARE_REGION.end(), 0x0800_2800 + 472 * 256);
        assert_eq!(FIRMWARE_REGION.device_offset(FIRMWARE_ADDRESS), BOOTLOADER_SIZE);
        assert!(!FIRMWARE_REGION.contains(FLASH_BASE));
    }

    #[test]
    fn region_lookup() {
        assert_eq!(region_for(FIRMWARE_ADDRESS).map(|r| r.target), Some(FlashTarget::Firmware));
        assert_eq!(region_for(0x1000).map(|r| r.target), Some(FlashTarget::Data));
        assert_eq!(region_for(EXTERNAL_FLASH_SIZE), None);
        assert_eq!(region_for(FLASH_BASE), None);
        assert_eq!(MAX_REGION_PAGES, EXTERNAL_PAGE_COUNT);
    }

    #[test]
    fn page_indices() {
        assert_eq!(DATA_REGION.page_index(0x1ff), Some(1));
        assert_eq!(DATA_REGION.page_address(3), 0x300);
        assert_eq!(FIRMWARE_REGION.page_index(FIRMWARE_REGION.end()), None);
    }
}
