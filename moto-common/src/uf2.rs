//! UF2 transfer block format.
//!
//! A UF2 file is a sequence of 512-byte blocks; each block carries its own target address and
//! sequencing information, so blocks may be written to the device in any order.

use thiserror::Error;

proc_bitfield::bitfield! {
    /// Flag structure used by UF2 blocks.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Uf2Flags(pub u32): Debug, FromStorage, IntoStorage, DerefStorage {
        pub extension_tags_present: bool @ 15,
        pub md5_present: bool @ 14,
        pub family_id_present: bool @ 13,
        pub file_container: bool @ 12,
        pub not_main_flash: bool @ 0,
    }
}
// `not_main_flash` marks a comment block that must never be written to flash.
impl Uf2Flags {
    pub const EMPTY: Self = Self(0);
}

/// Size of a whole UF2 block.
pub const UF2_BLOCK_SIZE: usize = 512;

/// Maximum amount of data that can be contained in a UF2 block.
pub const UF2_BLOCK_DATA_SIZE: usize = 476;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum Uf2Error {
    #[error("UF2 block needs exactly 512 bytes, got {0}")]
    BadLength(usize),
    #[error("UF2 block buffer is not 4-byte aligned")]
    Misaligned,
    #[error("payload of {0} bytes does not fit in a UF2 block")]
    PayloadTooLong(usize),
}

/// UF2 block. Layout in memory matches the on-disk format, so a `&Uf2Block` can be cast to
/// and from a sector buffer with [`bytemuck`].
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Uf2Block {
    pub magic0: u32,
    pub magic1: u32,

    pub flags: u32,
    pub target_address: u32,
    pub payload_size: u32,
    pub block_no: u32,
    pub block_count: u32,
    pub file_size_family_id: u32,
    pub data: [u8; UF2_BLOCK_DATA_SIZE],

    pub magic2: u32,
}
const _: () = assert!(size_of::<Uf2Block>() == UF2_BLOCK_SIZE);

impl Uf2Block {
    // Magic constants used by UF2 format
    pub const MAGIC0: u32 = 0x0a32_4655; // "UF2\n"
    pub const MAGIC1: u32 = 0x9e5d_5157;
    pub const MAGIC2: u32 = 0x0ab1_6f30;

    /// A block with valid magics and every other field zeroed.
    pub const fn blank() -> Self {
        Self {
            magic0: Self::MAGIC0,
            magic1: Self::MAGIC1,
            flags: 0,
            target_address: 0,
            payload_size: 0,
            block_no: 0,
            block_count: 0,
            file_size_family_id: 0,
            data: [0; UF2_BLOCK_DATA_SIZE],
            magic2: Self::MAGIC2,
        }
    }

    /// Build a block carrying `payload` for `target_address`. A `family_id` sets the
    /// family-id-present flag on top of `flags`.
    pub fn new(
        flags: Uf2Flags,
        target_address: u32,
        block_no: u32,
        block_count: u32,
        family_id: Option<u32>,
        payload: &[u8],
    ) -> Result<Self, Uf2Error> {
        let mut this = Self::blank();
        this.flags = flags.with_family_id_present(family_id.is_some()).0;
        this.target_address = target_address;
        this.block_no = block_no;
        this.block_count = block_count;
        this.file_size_family_id = family_id.unwrap_or(0);
        this.set_payload(payload)?;
        Ok(this)
    }

    /// Reinterpret a transfer buffer as a block; the buffer must be exactly one block long and
    /// 4-byte aligned.
    pub fn from_sector(bytes: &[u8]) -> Result<&Self, Uf2Error> {
        bytemuck::try_from_bytes(bytes).map_err(|e| cast_error(e, bytes.len()))
    }

    /// Mutable version of [`Uf2Block::from_sector`].
    pub fn from_sector_mut(bytes: &mut [u8]) -> Result<&mut Self, Uf2Error> {
        let len = bytes.len();
        bytemuck::try_from_bytes_mut(bytes).map_err(|e| cast_error(e, len))
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn has_valid_magic(&self) -> bool {
        self.magic0 == Self::MAGIC0 && self.magic1 == Self::MAGIC1 && self.magic2 == Self::MAGIC2
    }

    pub fn flags(&self) -> Uf2Flags {
        Uf2Flags(self.flags)
    }

    pub fn family_id(&self) -> Option<u32> {
        self.flags()
            .family_id_present()
            .then_some(self.file_size_family_id)
    }

    /// The declared payload; `payload_size` is clamped to the data area so a corrupt header can't
    /// index past the block.
    pub fn payload(&self) -> &[u8] {
        let len = (self.payload_size as usize).min(UF2_BLOCK_DATA_SIZE);
        &self.data[..len]
    }

    /// Copy `payload` into the data area and set `payload_size`; the rest of the data area is
    /// zeroed.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), Uf2Error> {
        if payload.len() > UF2_BLOCK_DATA_SIZE {
            return Err(Uf2Error::PayloadTooLong(payload.len()));
        }
        self.data = [0; UF2_BLOCK_DATA_SIZE];
        self.data[..payload.len()].copy_from_slice(payload);
        self.payload_size = payload.len() as u32;
        Ok(())
    }
}

fn cast_error(e: bytemuck::PodCastError, len: usize) -> Uf2Error {
    match e {
        bytemuck::PodCastError::TargetAlignmentGreaterAndInputNotAligned => Uf2Error::Misaligned,
        _ => Uf2Error::BadLength(len),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(4))]
    struct Aligned([u8; UF2_BLOCK_SIZE + 4]);

    #[test]
    fn field_offsets_match_the_wire_format() {
        let block = Uf2Block::new(Uf2Flags::EMPTY, 0x0800_2800, 3, 9, None, &[0xa5; 4]).unwrap();
        let bytes = block.as_bytes();
        assert_eq!(&bytes[0..4], &Uf2Block::MAGIC0.to_le_bytes());
        assert_eq!(&bytes[4..8], &Uf2Block::MAGIC1.to_le_bytes());
        assert_eq!(&bytes[12..16], &0x0800_2800u32.to_le_bytes());
        assert_eq!(&bytes[16..20], &4u32.to_le_bytes());
        assert_eq!(&bytes[20..24], &3u32.to_le_bytes());
        assert_eq!(&bytes[24..28], &9u32.to_le_bytes());
        assert_eq!(&bytes[32..36], &[0xa5; 4]);
        assert_eq!(&bytes[508..512], &Uf2Block::MAGIC2.to_le_bytes());
    }

    #[test]
    fn family_id_sets_flag() {
        let block = Uf2Block::new(Uf2Flags::EMPTY, 0, 0, 1, Some(0xe48b_ff57), &[]).unwrap();
        assert!(block.flags().family_id_present());
        assert_eq!(block.family_id(), Some(0xe48b_ff57));
        assert_eq!(Uf2Block::blank().family_id(), None);
    }

    #[test]
    fn from_sector_checks_length_and_alignment() {
        let mut buf = Aligned([0; UF2_BLOCK_SIZE + 4]);
        assert!(Uf2Block::from_sector(&buf.0[..UF2_BLOCK_SIZE]).is_ok());
        assert_eq!(
            Uf2Block::from_sector(&buf.0[..UF2_BLOCK_SIZE - 1]).unwrap_err(),
            Uf2Error::BadLength(UF2_BLOCK_SIZE - 1)
        );
        assert_eq!(
            Uf2Block::from_sector_mut(&mut buf.0[1..UF2_BLOCK_SIZE + 1]).unwrap_err(),
            Uf2Error::Misaligned
        );
    }

    #[test]
    fn payload_is_clamped_to_data_area() {
        let mut block = Uf2Block::blank();
        block.payload_size = 0xffff;
        assert_eq!(block.payload().len(), UF2_BLOCK_DATA_SIZE);
        assert_eq!(
            block.set_payload(&[0; UF2_BLOCK_DATA_SIZE + 1]),
            Err(Uf2Error::PayloadTooLong(UF2_BLOCK_DATA_SIZE + 1))
        );
    }
}
