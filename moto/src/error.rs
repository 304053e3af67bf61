use quartz::device::flash::FlashError;
use thiserror::Error;

/// Reasons a transfer block with valid magics is refused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Reject {
    #[error("payload of {0} bytes is larger than a flash page")]
    PayloadTooLarge(u32),
    #[error("target address {0:#010x} is not page aligned")]
    Misaligned(u32),
    #[error("block count {0} is zero or larger than any region")]
    BadBlockCount(u32),
    #[error("block {block_no} is past the declared count {block_count}")]
    BlockOutOfRange { block_no: u32, block_count: u32 },
    #[error("no flash region contains {0:#010x}")]
    NoRegion(u32),
    #[error("block count {block_count} exceeds the {pages} pages of the matched region")]
    TooManyBlocks { block_count: u32, pages: u32 },
    #[error("target address {0:#010x} is outside the region of the running transfer")]
    RegionMismatch(u32),
    #[error("block count {got} differs from the running transfer's {expected}")]
    CountMismatch { expected: u32, got: u32 },
}

/// Failure reported back to the USB mass-storage transport as an I/O error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("sector buffer must be 512 bytes and 4-byte aligned")]
    BadBuffer,
    #[error("transfer block rejected: {0}")]
    Rejected(#[from] Reject),
    #[error("flash operation failed: {0}")]
    Flash(#[from] FlashError),
}
