//! FAT16 on-disk records.

pub const SECTOR_SIZE: usize = 512;
/// Word stored in the last two bytes of the boot sector.
pub const SIGNATURE_WORD: u16 = 0xaa55;
pub const EXTENDED_BOOT_SIGNATURE: u8 = 0x29;

pub const FAT16_ENTRY_SIZE: usize = 2;
pub const FAT16_FREE: u16 = 0x0000;
pub const FAT16_END_OF_CHAIN: u16 = 0xffff;
/// Cluster numbers 0 and 1 are reserved; data starts at cluster 2.
pub const FIRST_DATA_CLUSTER: u32 = 2;
/// FAT16 volumes must have at least this many clusters, or hosts will mount them as FAT12.
pub const FAT16_MIN_CLUSTERS: u32 = 4085;
pub const FAT16_MAX_CLUSTERS: u32 = 65524;

pub const DIR_ENTRY_SIZE: usize = 32;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_VOLUME_ID: u8 = 0x08;

/// Pack a calendar date into the FAT date format (years since 1980, month, day).
pub const fn fat_date(year: u16, month: u16, day: u16) -> u16 {
    ((0x7f & (year - 1980)) << 9) | ((0xf & month) << 5) | (0x1f & day)
}

/// Pack a wall-clock time into the FAT time format; seconds have 2s resolution.
pub const fn fat_time(hour: u16, minute: u16, second: u16) -> u16 {
    ((0x1f & hour) << 11) | ((0x3f & minute) << 5) | (0x1f & (second / 2))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub date: u16,
    pub time: u16,
}
impl Timestamp {
    pub const fn new(year: u16, month: u16, day: u16, hour: u16, minute: u16, second: u16) -> Self {
        Self {
            date: fat_date(year, month, day),
            time: fat_time(hour, minute, second),
        }
    }

    /// Volume serial number conventionally derived from the creation stamp.
    pub const fn volume_id(&self) -> u32 {
        ((self.date as u32) << 16) | self.time as u32
    }
}

/// Build a space-padded 8.3 name; longer parts are truncated.
pub const fn short_name(base: &[u8], extension: &[u8]) -> [u8; 11] {
    let mut name = [b' '; 11];
    let mut i = 0;
    while i < base.len() && i < 8 {
        name[i] = base[i];
        i += 1;
    }
    let mut j = 0;
    while j < extension.len() && j < 3 {
        name[8 + j] = extension[j];
        j += 1;
    }
    name
}

/// Boot sector / BIOS parameter block, up to and including the filesystem type tag.
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct BootSector {
    pub jump_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub sector_size: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub root_entries: u16,
    pub total_sectors16: u16,
    pub media: u8,
    pub fat_sectors16: u16,
    pub sectors_per_track: u16,
    pub head_count: u16,
    pub hidden_sectors: u32,
    pub total_sectors32: u32,
    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],
}
const _: () = assert!(size_of::<BootSector>() == 62);

impl BootSector {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct DirEntry {
    pub name: [u8; 11],
    pub attributes: u8,
    pub nt_reserved: u8,
    pub create_time_tenth: u8,
    pub create_time: u16,
    pub create_date: u16,
    pub last_access_date: u16,
    pub first_cluster_hi: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster_lo: u16,
    pub file_size: u32,
}
const _: () = assert!(size_of::<DirEntry>() == DIR_ENTRY_SIZE);

impl DirEntry {
    pub const fn file(
        name: [u8; 11],
        attributes: u8,
        first_cluster: u16,
        file_size: u32,
        stamp: Timestamp,
    ) -> Self {
        Self {
            name,
            attributes,
            nt_reserved: 0,
            create_time_tenth: 0,
            create_time: stamp.time,
            create_date: stamp.date,
            last_access_date: stamp.date,
            first_cluster_hi: 0,
            write_time: stamp.time,
            write_date: stamp.date,
            first_cluster_lo: first_cluster,
            file_size,
        }
    }

    pub const fn volume_label(label: [u8; 11], stamp: Timestamp) -> Self {
        Self::file(label, ATTR_VOLUME_ID, 0, 0, stamp)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
