//! Reception of UF2 transfer blocks.
//!
//! Hosts write a UF2 file's blocks in whatever order their filesystem driver chooses, may repeat
//! them, and interleave unrelated metadata writes. A transfer is opened by the first flashable
//! block, programs each block index once, and closes when every index has been seen.

use moto_common::memory::{self, ERASED_BYTE, FlashRegion, FlashTarget, MAX_REGION_PAGES, PAGE_SIZE};
use moto_common::uf2::Uf2Block;
use tracing::debug;

use crate::error::{Error, Reject};
use crate::target::{FlashAccess, PAGE, Page};

const MAP_WORDS: usize = (MAX_REGION_PAGES as usize).div_ceil(32);

/// One bit per block index.
#[derive(Clone)]
pub struct BlockMap {
    words: [u32; MAP_WORDS],
    count: u32,
}

impl BlockMap {
    pub const fn new() -> Self {
        Self {
            words: [0; MAP_WORDS],
            count: 0,
        }
    }

    pub fn contains(&self, index: u32) -> bool {
        let (word, bit) = Self::locate(index);
        self.words[word] & bit != 0
    }

    /// Returns false if `index` was already present.
    pub fn insert(&mut self, index: u32) -> bool {
        let (word, bit) = Self::locate(index);
        if self.words[word] & bit != 0 {
            return false;
        }
        self.words[word] |= bit;
        self.count += 1;
        true
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn locate(index: u32) -> (usize, u32) {
        ((index / 32) as usize, 1 << (index % 32))
    }
}

impl Default for BlockMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields of a block that passed [`validate`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub target_address: u32,
    pub block_no: u32,
    pub block_count: u32,
}

/// Sort a block into flashable (`Some`), harmless noise (`None`), or malformed (`Err`).
///
/// Blocks without the UF2 magics, flagged not-for-flash, or carrying no payload are noise: the host
/// writes plenty of those while updating its own view of the filesystem.
pub fn validate(block: &Uf2Block) -> Result<Option<Header>, Reject> {
    if !block.has_valid_magic() || block.flags().not_main_flash() || block.payload_size == 0 {
        return Ok(None);
    }
    if block.payload_size > PAGE_SIZE {
        return Err(Reject::PayloadTooLarge(block.payload_size));
    }
    if block.target_address % PAGE_SIZE != 0 {
        return Err(Reject::Misaligned(block.target_address));
    }
    if block.block_count == 0 || block.block_count > MAX_REGION_PAGES {
        return Err(Reject::BadBlockCount(block.block_count));
    }
    if block.block_no >= block.block_count {
        return Err(Reject::BlockOutOfRange {
            block_no: block.block_no,
            block_count: block.block_count,
        });
    }
    Ok(Some(Header {
        target_address: block.target_address,
        block_no: block.block_no,
        block_count: block.block_count,
    }))
}

pub struct Transfer {
    region: FlashRegion,
    block_count: u32,
    received: BlockMap,
}

impl Transfer {
    /// Pick the region for a transfer's first block, in priority order.
    fn open(header: &Header) -> Result<Self, Reject> {
        let region =
            memory::region_for(header.target_address).ok_or(Reject::NoRegion(header.target_address))?;
        if header.block_count > region.page_count {
            return Err(Reject::TooManyBlocks {
                block_count: header.block_count,
                pages: region.page_count,
            });
        }
        Ok(Self {
            region,
            block_count: header.block_count,
            received: BlockMap::new(),
        })
    }

    /// Check that a later block belongs to this transfer.
    fn admit(&self, header: &Header) -> Result<(), Reject> {
        if !self.region.contains(header.target_address) {
            return Err(Reject::RegionMismatch(header.target_address));
        }
        if header.block_count != self.block_count {
            return Err(Reject::CountMismatch {
                expected: self.block_count,
                got: header.block_count,
            });
        }
        Ok(())
    }

    /// Program one block's payload. A short payload is laid over the page's current content so the
    /// rest of the page is preserved.
    fn program<F: FlashAccess>(
        &mut self,
        flash: &mut F,
        header: &Header,
        payload: &[u8],
    ) -> Result<(), Error> {
        let target = self.region.target;
        let mut page: Page = [ERASED_BYTE; PAGE];
        if payload.len() < PAGE {
            flash.read(target, header.target_address, &mut page)?;
        }
        page[..payload.len()].copy_from_slice(payload);
        flash.program_page(target, header.target_address, &page)?;
        self.received.insert(header.block_no);
        Ok(())
    }

    pub fn region(&self) -> &FlashRegion {
        &self.region
    }

    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    pub fn received(&self) -> &BlockMap {
        &self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received.len() == self.block_count
    }
}

/// What [`UpdateSession::accept`] did with a block.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Progress {
    /// Not a flashable block; nothing happened.
    Ignored,
    /// Already programmed during this transfer.
    Duplicate,
    /// Programmed; `started` marks the block that opened the transfer.
    Programmed { target: FlashTarget, started: bool },
    /// Programmed the last outstanding block; the session is idle again.
    Completed { target: FlashTarget, started: bool },
}

/// At most one transfer at a time.
#[derive(Default)]
pub struct UpdateSession {
    transfer: Option<Transfer>,
}

impl UpdateSession {
    pub const fn new() -> Self {
        Self { transfer: None }
    }

    pub fn transfer(&self) -> Option<&Transfer> {
        self.transfer.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.transfer.is_none()
    }

    /// Feed one block. Rejections and flash failures leave any running transfer as it was, so the
    /// host can resend; a block whose programming fails stays outstanding.
    pub fn accept<F: FlashAccess>(
        &mut self,
        flash: &mut F,
        block: &Uf2Block,
    ) -> Result<Progress, Error> {
        let Some(header) = validate(block)? else {
            return Ok(Progress::Ignored);
        };

        let mut opened = None;
        let transfer = match self.transfer.as_mut() {
            Some(transfer) => {
                transfer.admit(&header)?;
                transfer
            }
            None => opened.insert(Transfer::open(&header)?),
        };
        if transfer.received.contains(header.block_no) {
            debug!(block_no = header.block_no, "duplicate block");
            return Ok(Progress::Duplicate);
        }

        transfer.program(flash, &header, block.payload())?;

        let target = transfer.region.target;
        let completed = transfer.is_complete();
        let started = opened.is_some();
        if completed {
            self.transfer = None;
            Ok(Progress::Completed { target, started })
        } else {
            if opened.is_some() {
                self.transfer = opened;
            }
            Ok(Progress::Programmed { target, started })
        }
    }
}
