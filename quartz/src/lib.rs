//! Hardware-facing building blocks shared by the bootloader: timers, a UART byte sink, a lock
//! and the external SPI NOR driver.
#![no_std]

pub mod device;
pub mod sync;
