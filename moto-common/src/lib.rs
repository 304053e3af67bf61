//! Formats shared between the bootloader and the host-side tooling: the UF2 transfer block, the
//! FAT16 records the bootloader synthesizes, and the flash memory map both sides target.
#![no_std]

#[cfg(target_endian = "big")]
compile_error!("UF2 and FAT records are laid out in native byte order and assume little-endian");

pub mod fat;
pub mod memory;
pub mod uf2;

pub use memory::{FlashRegion, FlashTarget};
pub use uf2::{Uf2Block, Uf2Error, Uf2Flags};
