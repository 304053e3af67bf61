pub mod flash;
pub mod internal_flash;
pub mod spi_nor;
pub mod timing;
pub mod uart;
