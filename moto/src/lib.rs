//! Moto: a UF2 mass-storage bootloader.
//!
//! The device shows up as a small FAT16 drive whose sectors are computed on demand. Dropping a UF2
//! file on it streams transfer blocks through [`Bootloader::write_sector`], which programs them
//! into the MCU's flash or the external SPI NOR. `CURRENT.UF2` and `DATA.UF2` read back whatever
//! is currently stored in those two regions.
#![no_std]

pub mod bootloader;
pub mod cache;
pub mod config;
pub mod error;
pub mod ghostfat;
pub mod indicator;
pub mod logging;
pub mod session;
pub mod target;
pub mod volume;

pub use bootloader::{Action, Bootloader};
pub use error::{Error, Reject};
