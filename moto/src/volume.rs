//! Layout of the emulated FAT16 volume and the fixed set of files on it.
//!
//! One sector per cluster, so data sector `n` (counted from the start of the data region) is
//! cluster `n + 2`, and each file's allocation chain is just consecutive clusters.

use moto_common::fat::{
    self, ATTR_READ_ONLY, DirEntry, FAT16_END_OF_CHAIN, FAT16_FREE, FIRST_DATA_CLUSTER,
    short_name,
};
use moto_common::memory::{DATA_REGION, FIRMWARE_REGION, FlashRegion};

use crate::config::{text, volume as cfg};

pub const SECTOR_SIZE: usize = cfg::SECTOR_SIZE;
pub const SECTOR_COUNT: u32 = cfg::SECTOR_COUNT;

pub const DIR_ENTRIES_PER_SECTOR: u32 = (SECTOR_SIZE / fat::DIR_ENTRY_SIZE) as u32;
pub const FAT_ENTRIES_PER_SECTOR: u32 = (SECTOR_SIZE / fat::FAT16_ENTRY_SIZE) as u32;

pub const BOOT_SECTOR: u32 = 0;
pub const FAT_SECTOR: u32 = cfg::RESERVED_SECTORS;
pub const FAT_SECTOR_COUNT: u32 =
    fat_sector_count(SECTOR_COUNT, cfg::RESERVED_SECTORS, cfg::ROOT_SECTORS);
pub const ROOT_SECTOR: u32 = FAT_SECTOR + FAT_SECTOR_COUNT;
pub const ROOT_SECTOR_COUNT: u32 = cfg::ROOT_SECTORS;
pub const ROOT_ENTRIES: u32 = ROOT_SECTOR_COUNT * DIR_ENTRIES_PER_SECTOR;
pub const DATA_SECTOR: u32 = ROOT_SECTOR + ROOT_SECTOR_COUNT;
pub const CLUSTER_COUNT: u32 = SECTOR_COUNT - DATA_SECTOR;

/// Sectors needed for one FAT covering every sector that could be a cluster, plus the two reserved
/// entries.
pub const fn fat_sector_count(total: u32, reserved: u32, root: u32) -> u32 {
    let entries = total - reserved - root + FIRST_DATA_CLUSTER;
    (entries * fat::FAT16_ENTRY_SIZE as u32).div_ceil(SECTOR_SIZE as u32)
}

/// What a file's data sectors hold.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Content {
    /// Literal bytes, one sector at most.
    Text(&'static str),
    /// UF2 view of a flash region, one block per page.
    Image(FlashRegion),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SyntheticFile {
    pub name: [u8; 11],
    /// First sector, relative to [`DATA_SECTOR`].
    pub first_sector: u32,
    pub sector_count: u32,
    pub content: Content,
}

impl SyntheticFile {
    const fn text(name: [u8; 11], body: &'static str, first_sector: u32) -> Self {
        Self {
            name,
            first_sector,
            sector_count: 1,
            content: Content::Text(body),
        }
    }

    const fn image(name: [u8; 11], region: FlashRegion, first_sector: u32) -> Self {
        Self {
            name,
            first_sector,
            sector_count: region.page_count,
            content: Content::Image(region),
        }
    }

    /// Size in bytes as declared in the directory.
    pub const fn size(&self) -> u32 {
        match self.content {
            Content::Text(body) => body.len() as u32,
            Content::Image(region) => region.page_count * SECTOR_SIZE as u32,
        }
    }

    /// One past the last data sector.
    pub const fn end_sector(&self) -> u32 {
        self.first_sector + self.sector_count
    }

    pub const fn first_cluster(&self) -> u32 {
        self.first_sector + FIRST_DATA_CLUSTER
    }

    pub const fn last_cluster(&self) -> u32 {
        self.first_cluster() + self.sector_count - 1
    }

    pub const fn dir_entry(&self) -> DirEntry {
        DirEntry::file(
            self.name,
            ATTR_READ_ONLY,
            self.first_cluster() as u16,
            self.size(),
            cfg::CREATED,
        )
    }

    /// FAT entry for `cluster` if it belongs to this file's chain.
    pub const fn chain_entry(&self, cluster: u32) -> Option<u16> {
        if cluster < self.first_cluster() || cluster > self.last_cluster() {
            None
        } else if cluster == self.last_cluster() {
            Some(FAT16_END_OF_CHAIN)
        } else {
            Some((cluster + 1) as u16)
        }
    }
}

pub const MOTO_TXT: SyntheticFile = SyntheticFile::text(short_name(b"MOTO", b"TXT"), text::MOTO_TXT, 0);
pub const INFO_UF2_TXT: SyntheticFile =
    SyntheticFile::text(short_name(b"INFO_UF2", b"TXT"), text::INFO_UF2_TXT, MOTO_TXT.end_sector());
pub const INDEX_HTM: SyntheticFile =
    SyntheticFile::text(short_name(b"INDEX", b"HTM"), text::INDEX_HTM, INFO_UF2_TXT.end_sector());
pub const CURRENT_UF2: SyntheticFile =
    SyntheticFile::image(short_name(b"CURRENT", b"UF2"), FIRMWARE_REGION, INDEX_HTM.end_sector());
pub const DATA_UF2: SyntheticFile =
    SyntheticFile::image(short_name(b"DATA", b"UF2"), DATA_REGION, CURRENT_UF2.end_sector());

/// Root directory order; slot 0 holds the volume label, so file `i` sits in slot `i + 1`.
pub const FILES: [SyntheticFile; 5] = [MOTO_TXT, INFO_UF2_TXT, INDEX_HTM, CURRENT_UF2, DATA_UF2];

const _: () = {
    assert!(FAT_SECTOR_COUNT == 125);
    assert!(DATA_SECTOR == 158);
    assert!(CLUSTER_COUNT >= fat::FAT16_MIN_CLUSTERS && CLUSTER_COUNT <= fat::FAT16_MAX_CLUSTERS);
    assert!((FILES.len() as u32) < DIR_ENTRIES_PER_SECTOR);
    assert!(DATA_UF2.end_sector() <= CLUSTER_COUNT);
    assert!(SECTOR_COUNT <= u16::MAX as u32);
    let mut i = 0;
    while i < FILES.len() {
        if let Content::Text(body) = FILES[i].content {
            assert!(body.len() <= SECTOR_SIZE);
        }
        if i > 0 {
            assert!(FILES[i].first_sector == FILES[i - 1].end_sector());
        }
        i += 1;
    }
};

/// Where a sector index lands in the volume.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Region {
    Boot,
    /// Index relative to the start of the FAT.
    Fat(u32),
    /// Index relative to the start of the root directory.
    Root(u32),
    /// Index relative to the start of the data region.
    Data(u32),
    /// Reserved sectors after the boot sector, or past the end of the volume.
    Unused,
}

pub const fn classify(sector: u32) -> Region {
    if sector == BOOT_SECTOR {
        Region::Boot
    } else if sector < FAT_SECTOR {
        Region::Unused
    } else if sector < ROOT_SECTOR {
        Region::Fat(sector - FAT_SECTOR)
    } else if sector < DATA_SECTOR {
        Region::Root(sector - ROOT_SECTOR)
    } else if sector < SECTOR_COUNT {
        Region::Data(sector - DATA_SECTOR)
    } else {
        Region::Unused
    }
}

/// The file owning data sector `data_sector`, and the sector's index within it.
pub fn file_at(data_sector: u32) -> Option<(&'static SyntheticFile, u32)> {
    FILES
        .iter()
        .find(|f| data_sector >= f.first_sector && data_sector < f.end_sector())
        .map(|f| (f, data_sector - f.first_sector))
}

/// Value of FAT entry `cluster`.
pub fn fat_entry(cluster: u32) -> u16 {
    match cluster {
        0 => u16::from_le_bytes([cfg::MEDIA, 0xff]),
        1 => 0xffff,
        _ => FILES
            .iter()
            .find_map(|f| f.chain_entry(cluster))
            .unwrap_or(FAT16_FREE),
    }
}
