//! Compile-time configuration.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROJECT_URL: &str = "https://github.com/muzkr/moto";

/// Geometry and identity of the emulated drive.
pub mod volume {
    use moto_common::fat::Timestamp;

    pub const SECTOR_SIZE: usize = 512;
    pub const SECTOR_COUNT: u32 = 32000;
    /// Sectors before the FAT; just the boot sector.
    pub const RESERVED_SECTORS: u32 = 1;
    pub const ROOT_SECTORS: u32 = 32;

    /// Fixed disk.
    pub const MEDIA: u8 = 0xf0;
    pub const OEM_NAME: [u8; 8] = *b"MOTO    ";
    pub const LABEL: [u8; 11] = *b"MOTO       ";
    /// Stamp on the boot sector and every directory entry.
    pub const CREATED: Timestamp = Timestamp::new(2025, 11, 1, 9, 0, 0);
}

/// Contents of the informational files.
pub mod text {
    pub const MOTO_TXT: &str = concat!(
        "Moto Bootloader\r\n",
        "Mode: DFU\r\n",
        "Version: ",
        env!("CARGO_PKG_VERSION"),
        "\r\n",
        "Support: https://github.com/muzkr/moto\r\n",
    );

    pub const INFO_UF2_TXT: &str = concat!(
        "UF2 Bootloader Moto-",
        env!("CARGO_PKG_VERSION"),
        "\r\n",
        "Model: Moto Bootloader\r\n",
        "Board-ID: PY32F071-UVK5-V3\r\n",
    );

    pub const INDEX_HTM: &str = concat!(
        "<!doctype html>\n",
        "<html><body><script>\n",
        "location.replace(\"https://github.com/muzkr/moto\");\n",
        "</script></body></html>\n",
    );
}

pub mod timeouts {
    use core::time::Duration;

    /// Time between completing a firmware transfer and resetting into it, so the host can finish
    /// its own write sequence.
    pub const RESET_DELAY: Duration = Duration::from_millis(500);
    /// Full on/off period of the status light while a transfer is running.
    pub const TRANSFER_BLINK_PERIOD: Duration = Duration::from_millis(100);
    /// How long the ready light stays on after the host configures the device.
    pub const READY_INDICATOR: Duration = Duration::from_secs(20);
}

/// Status reads allowed per flash erase or program before it is reported as a hardware fault.
pub const FLASH_POLL_BUDGET: u32 = 1_000_000;

/// Log ring capacity in bytes.
pub const LOG_CAPACITY: usize = 2048;
