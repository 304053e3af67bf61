//! Conversions between flat images and UF2 files.

use std::collections::{BTreeMap, BTreeSet};

use elf::ElfBytes;
use elf::endian::AnyEndian;
use eyre::{Result, WrapErr, bail, ensure};
use moto_common::memory::{self, ERASED_BYTE, PAGE_SIZE};
use moto_common::uf2::{UF2_BLOCK_SIZE, Uf2Block, Uf2Flags};
use moto_common::{FlashRegion, FlashTarget};

const PAGE: usize = PAGE_SIZE as usize;

/// Bytes destined for one contiguous address range.
pub struct Segment {
    pub address: u32,
    pub data: Vec<u8>,
}

/// Loadable segments of an ELF, placed at their load (physical) addresses. BSS and other
/// zero-length segments are skipped.
pub fn elf_segments(file: &[u8]) -> Result<Vec<Segment>> {
    let elf = ElfBytes::<AnyEndian>::minimal_parse(file).wrap_err("parsing ELF")?;
    let Some(segment_table) = elf.segments() else {
        bail!("no ELF segment table");
    };

    let mut segments = vec![];
    for phdr in segment_table.iter() {
        if phdr.p_type != elf::abi::PT_LOAD || phdr.p_filesz == 0 {
            continue;
        }
        let address = u32::try_from(phdr.p_paddr).wrap_err("segment address beyond 32 bits")?;
        let data = elf.segment_data(&phdr).wrap_err("reading segment")?;
        tracing::debug!(address, len = data.len(), "segment");
        segments.push(Segment {
            address,
            data: data.to_vec(),
        });
    }
    ensure!(!segments.is_empty(), "ELF has no loadable segments");
    Ok(segments)
}

/// Lay `segments` out in `target`'s region as whole pages (partial pages are zero-padded) and emit
/// one UF2 block per page, numbered in address order.
pub fn pack(target: FlashTarget, segments: &[Segment], family: Option<u32>) -> Result<Vec<u8>> {
    let region = target.region();
    let mut pages: BTreeMap<u32, [u8; PAGE]> = BTreeMap::new();

    for segment in segments.iter().filter(|s| !s.data.is_empty()) {
        let end = u64::from(segment.address) + segment.data.len() as u64;
        if !region.contains(segment.address) || end > u64::from(region.end()) {
            bail!(
                "{} bytes at {:#010x} do not fit the {target} region {:#010x}..{:#010x}",
                segment.data.len(),
                segment.address,
                region.base_address,
                region.end()
            );
        }
        let mut address = segment.address;
        let mut rest = segment.data.as_slice();
        while !rest.is_empty() {
            let base = address - address % PAGE_SIZE;
            let at = (address - base) as usize;
            let n = rest.len().min(PAGE - at);
            pages.entry(base).or_insert([0; PAGE])[at..at + n].copy_from_slice(&rest[..n]);
            rest = &rest[n..];
            address += n as u32;
        }
    }
    ensure!(!pages.is_empty(), "nothing to pack");

    let block_count = pages.len() as u32;
    let mut out = Vec::with_capacity(pages.len() * UF2_BLOCK_SIZE);
    for (block_no, (address, page)) in pages.iter().enumerate() {
        let block = Uf2Block::new(
            Uf2Flags::EMPTY,
            *address,
            block_no as u32,
            block_count,
            family,
            page,
        )?;
        out.extend_from_slice(block.as_bytes());
    }
    Ok(out)
}

fn blocks(uf2: &[u8]) -> Result<impl Iterator<Item = Uf2Block> + '_> {
    ensure!(
        uf2.len() % UF2_BLOCK_SIZE == 0,
        "{} bytes is not a whole number of UF2 blocks",
        uf2.len()
    );
    Ok(uf2
        .chunks_exact(UF2_BLOCK_SIZE)
        .map(bytemuck::pod_read_unaligned::<Uf2Block>))
}

fn is_flashable(block: &Uf2Block) -> bool {
    block.has_valid_magic() && !block.flags().not_main_flash() && block.payload_size > 0
}

/// Flatten the flashable blocks of `uf2` that land in one region into an image starting at the
/// region's base. Gaps read as erased flash. Without an explicit `target` the region of the first
/// flashable block is used.
pub fn unpack(uf2: &[u8], target: Option<FlashTarget>) -> Result<(FlashTarget, Vec<u8>)> {
    let flashable: Vec<Uf2Block> = blocks(uf2)?.filter(is_flashable).collect();
    let region = match target {
        Some(target) => target.region(),
        None => {
            let Some(first) = flashable.first() else {
                bail!("no flashable blocks");
            };
            memory::region_for(first.target_address).ok_or_else(|| {
                eyre::eyre!("first block at {:#010x} is in no region", first.target_address)
            })?
        }
    };

    let mut flat = vec![];
    let mut skipped = 0;
    for block in &flashable {
        let payload = block.payload();
        if !fits(&region, block.target_address, payload.len()) {
            skipped += 1;
            continue;
        }
        let at = (block.target_address - region.base_address) as usize;
        if flat.len() < at + payload.len() {
            flat.resize(at + payload.len(), ERASED_BYTE);
        }
        flat[at..at + payload.len()].copy_from_slice(payload);
    }
    if skipped > 0 {
        tracing::warn!(skipped, target = %region.target, "blocks outside the region were dropped");
    }
    ensure!(!flat.is_empty(), "no blocks for the {} region", region.target);
    Ok((region.target, flat))
}

fn fits(region: &FlashRegion, address: u32, len: usize) -> bool {
    region.contains(address) && u64::from(address) + len as u64 <= u64::from(region.end())
}

#[derive(Debug, Default)]
pub struct Summary {
    pub blocks: usize,
    pub flashable: usize,
    pub not_main_flash: usize,
    pub bad_magic: usize,
    /// Block count shared by every flashable block, if they agree.
    pub declared_count: Option<u32>,
    /// Indices below `declared_count` that no block carries.
    pub missing: Vec<u32>,
    pub families: Vec<u32>,
    /// Lowest address and one past the highest payload byte.
    pub address_range: Option<(u32, u32)>,
    pub per_target: Vec<(FlashTarget, usize)>,
    /// Flashable blocks that match no region.
    pub outside: usize,
    pub payload_bytes: usize,
    /// CRC-32 of every flashable payload, in file order.
    pub crc32: u32,
}

pub fn summarize(uf2: &[u8]) -> Result<Summary> {
    let mut summary = Summary::default();
    let mut hasher = crc32fast::Hasher::new();
    let mut counts = BTreeSet::new();
    let mut seen = BTreeSet::new();
    let mut families = BTreeSet::new();
    let mut firmware = 0;
    let mut data = 0;

    for block in blocks(uf2)? {
        summary.blocks += 1;
        if !block.has_valid_magic() {
            summary.bad_magic += 1;
            continue;
        }
        if block.flags().not_main_flash() {
            summary.not_main_flash += 1;
            continue;
        }
        if block.payload_size == 0 {
            continue;
        }
        summary.flashable += 1;
        counts.insert(block.block_count);
        seen.insert(block.block_no);
        families.extend(block.family_id());

        let payload = block.payload();
        hasher.update(payload);
        summary.payload_bytes += payload.len();
        let end = block.target_address.saturating_add(payload.len() as u32);
        summary.address_range = Some(match summary.address_range {
            Some((low, high)) => (low.min(block.target_address), high.max(end)),
            None => (block.target_address, end),
        });
        match memory::region_for(block.target_address) {
            Some(region) if region.target == FlashTarget::Firmware => firmware += 1,
            Some(_) => data += 1,
            None => summary.outside += 1,
        }
    }

    if counts.len() > 1 {
        tracing::warn!(?counts, "blocks disagree on the block count");
    }
    if let (1, Some(&count)) = (counts.len(), counts.first()) {
        summary.declared_count = Some(count);
        summary.missing = (0..count).filter(|i| !seen.contains(i)).collect();
    }
    summary.families = families.into_iter().collect();
    summary.per_target = [(FlashTarget::Firmware, firmware), (FlashTarget::Data, data)]
        .into_iter()
        .filter(|&(_, n)| n > 0)
        .collect();
    summary.crc32 = hasher.finalize();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use moto_common::memory::{DATA_REGION, FIRMWARE_ADDRESS, FIRMWARE_PAGE_COUNT};

    fn raw(target: FlashTarget, data: Vec<u8>) -> Vec<Segment> {
        vec![Segment {
            address: target.region().base_address,
            data,
        }]
    }

    fn parse(uf2: &[u8]) -> Vec<Uf2Block> {
        blocks(uf2).unwrap().collect()
    }

    #[test]
    fn pack_pads_the_last_page() {
        let data: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8 + 1).collect();
        let uf2 = pack(FlashTarget::Data, &raw(FlashTarget::Data, data.clone()), None).unwrap();

        let blocks = parse(&uf2);
        assert_eq!(blocks.len(), 3);
        for (i, block) in blocks.iter().enumerate() {
            assert!(is_flashable(block));
            assert_eq!(block.block_no, i as u32);
            assert_eq!(block.block_count, 3);
            assert_eq!(block.target_address, DATA_REGION.base_address + i as u32 * 256);
            assert_eq!(block.payload_size, 256);
            assert_eq!(block.family_id(), None);
        }
        assert_eq!(&blocks[2].payload()[..88], &data[512..]);
        assert!(blocks[2].payload()[88..].iter().all(|&b| b == 0));
    }

    #[test]
    fn pack_refuses_oversized_images() {
        let data = vec![0x5a; (FIRMWARE_PAGE_COUNT as usize + 1) * 256];
        assert!(pack(FlashTarget::Firmware, &raw(FlashTarget::Firmware, data), None).is_err());

        let below = [Segment { address: FIRMWARE_ADDRESS - 256, data: vec![1; 16] }];
        assert!(pack(FlashTarget::Firmware, &below, None).is_err());
    }

    #[test]
    fn pack_merges_unaligned_segments() {
        let segments = [
            Segment { address: FIRMWARE_ADDRESS + 0x10, data: vec![0xaa; 0x100] },
            Segment { address: FIRMWARE_ADDRESS + 0x400, data: vec![0xbb; 4] },
        ];
        let uf2 = pack(FlashTarget::Firmware, &segments, Some(0x1234_5678)).unwrap();
        let blocks = parse(&uf2);

        let addresses: Vec<u32> = blocks.iter().map(|b| b.target_address).collect();
        assert_eq!(addresses, [FIRMWARE_ADDRESS, FIRMWARE_ADDRESS + 0x100, FIRMWARE_ADDRESS + 0x400]);
        assert_eq!(blocks[0].family_id(), Some(0x1234_5678));
        assert_eq!(&blocks[0].payload()[..0x10], &[0; 0x10]);
        assert!(blocks[0].payload()[0x10..].iter().all(|&b| b == 0xaa));
        assert_eq!(&blocks[1].payload()[..0x10], &[0xaa; 0x10]);
    }

    #[test]
    fn unpack_fills_gaps_with_erased_bytes() {
        let segments = [
            Segment { address: 0, data: vec![1; 256] },
            Segment { address: 0x300, data: vec![2; 256] },
        ];
        let uf2 = pack(FlashTarget::Data, &segments, None).unwrap();
        let (target, flat) = unpack(&uf2, None).unwrap();

        assert_eq!(target, FlashTarget::Data);
        assert_eq!(flat.len(), 0x400);
        assert!(flat[..0x100].iter().all(|&b| b == 1));
        assert!(flat[0x100..0x300].iter().all(|&b| b == ERASED_BYTE));
        assert!(flat[0x300..].iter().all(|&b| b == 2));

        assert!(unpack(&uf2, Some(FlashTarget::Firmware)).is_err());
        assert!(unpack(&uf2[..100], None).is_err());
    }

    #[test]
    fn summary_counts_block_kinds() {
        let mut uf2 = pack(FlashTarget::Firmware, &raw(FlashTarget::Firmware, vec![7; 512]), None).unwrap();
        let mut note = Uf2Block::new(Uf2Flags::EMPTY.with_not_main_flash(true), 0, 0, 0, None, b"hi").unwrap();
        uf2.extend_from_slice(note.as_bytes());
        note.magic0 = 0;
        uf2.extend_from_slice(note.as_bytes());

        let summary = summarize(&uf2).unwrap();
        assert_eq!(summary.blocks, 4);
        assert_eq!(summary.flashable, 2);
        assert_eq!(summary.not_main_flash, 1);
        assert_eq!(summary.bad_magic, 1);
        assert_eq!(summary.declared_count, Some(2));
        assert!(summary.missing.is_empty());
        assert_eq!(summary.address_range, Some((FIRMWARE_ADDRESS, FIRMWARE_ADDRESS + 512)));
        assert_eq!(summary.per_target, [(FlashTarget::Firmware, 2)]);
        assert_eq!(summary.payload_bytes, 512);
        assert_eq!(summary.crc32, crc32fast::hash(&[7; 512]));
    }
}
