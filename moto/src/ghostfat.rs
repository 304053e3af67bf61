//! Sector-by-sector rendering of the emulated FAT16 volume.
//!
//! Nothing is stored: every read is computed from the layout in [`crate::volume`], and the image
//! files are rendered from the current flash contents.

use moto_common::fat::{BootSector, DirEntry, EXTENDED_BOOT_SIGNATURE, SIGNATURE_WORD};
use moto_common::memory::{FlashRegion, PAGE_SIZE};
use moto_common::uf2::Uf2Block;

use crate::config::volume as cfg;
use crate::error::Error;
use crate::target::FlashAccess;
use crate::volume::{self, Content, FILES, Region, SECTOR_SIZE};

const BOOT_RECORD: BootSector = BootSector {
    jump_boot: [0xeb, 0x00, 0x00],
    oem_name: cfg::OEM_NAME,
    sector_size: SECTOR_SIZE as u16,
    sectors_per_cluster: 1,
    reserved_sectors: cfg::RESERVED_SECTORS as u16,
    fat_count: 1,
    root_entries: volume::ROOT_ENTRIES as u16,
    total_sectors16: volume::SECTOR_COUNT as u16,
    media: cfg::MEDIA,
    fat_sectors16: volume::FAT_SECTOR_COUNT as u16,
    sectors_per_track: volume::SECTOR_COUNT as u16,
    head_count: 1,
    hidden_sectors: 0,
    total_sectors32: 0,
    drive_number: 0,
    reserved1: 0,
    boot_signature: EXTENDED_BOOT_SIGNATURE,
    volume_id: cfg::CREATED.volume_id(),
    volume_label: cfg::LABEL,
    fs_type: *b"FAT16   ",
};

/// Check that `buf` can hold one sector for the transport's DMA.
pub fn check_buffer(buf: &[u8]) -> Result<(), Error> {
    if buf.len() != SECTOR_SIZE || !buf.as_ptr().cast::<u32>().is_aligned() {
        return Err(Error::BadBuffer);
    }
    Ok(())
}

/// Fill `buf` with the contents of `sector`. Sectors that belong to nothing read as zeros.
pub fn read_sector<F: FlashAccess>(flash: &mut F, sector: u32, buf: &mut [u8]) -> Result<(), Error> {
    check_buffer(buf)?;
    buf.fill(0);

    match volume::classify(sector) {
        Region::Boot => {
            let record = BOOT_RECORD;
            buf[..size_of::<BootSector>()].copy_from_slice(record.as_bytes());
            buf[SECTOR_SIZE - 2..].copy_from_slice(&SIGNATURE_WORD.to_le_bytes());
        }
        Region::Fat(index) => {
            let first = index * volume::FAT_ENTRIES_PER_SECTOR;
            for (cluster, entry) in (first..).zip(buf.chunks_exact_mut(2)) {
                entry.copy_from_slice(&volume::fat_entry(cluster).to_le_bytes());
            }
        }
        Region::Root(0) => {
            let label = DirEntry::volume_label(cfg::LABEL, cfg::CREATED);
            let entries = core::iter::once(label).chain(FILES.iter().map(|f| f.dir_entry()));
            for (slot, entry) in buf.chunks_exact_mut(size_of::<DirEntry>()).zip(entries) {
                slot.copy_from_slice(entry.as_bytes());
            }
        }
        Region::Data(data_sector) => {
            if let Some((file, index)) = volume::file_at(data_sector) {
                match file.content {
                    Content::Text(body) => buf[..body.len()].copy_from_slice(body.as_bytes()),
                    Content::Image(region) => image_block(flash, &region, index, buf)?,
                }
            }
        }
        Region::Root(_) | Region::Unused => {}
    }
    Ok(())
}

/// Wrap page `index` of `region` in a UF2 block numbered within that region's file.
fn image_block<F: FlashAccess>(
    flash: &mut F,
    region: &FlashRegion,
    index: u32,
    buf: &mut [u8],
) -> Result<(), Error> {
    let block = Uf2Block::from_sector_mut(buf).map_err(|_| Error::BadBuffer)?;
    *block = Uf2Block::blank();
    let address = region.page_address(index);
    block.target_address = address;
    block.payload_size = PAGE_SIZE;
    block.block_no = index;
    block.block_count = region.page_count;
    flash.read(region.target, address, &mut block.data[..PAGE_SIZE as usize])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_record_fields() {
        let record = BOOT_RECORD;
        let bytes = record.as_bytes();
        assert_eq!(bytes.len(), 62);
        assert_eq!(&bytes[3..11], b"MOTO    ");
        assert_eq!(&bytes[11..13], &512u16.to_le_bytes());
        assert_eq!(&bytes[17..19], &512u16.to_le_bytes());
        assert_eq!(&bytes[19..21], &32000u16.to_le_bytes());
        assert_eq!(bytes[21], 0xf0);
        assert_eq!(&bytes[22..24], &125u16.to_le_bytes());
        assert_eq!(bytes[38], 0x29);
        assert_eq!(&bytes[43..54], b"MOTO       ");
        assert_eq!(&bytes[54..62], b"FAT16   ");
    }
}
