//! The block device handed to the USB mass-storage transport.

use embedded_storage::nor_flash::NorFlash;
use moto_common::memory::FlashTarget;
use moto_common::uf2::Uf2Block;
use quartz::device::flash::FlashError;
use quartz::device::timing::{FloatingTimer, Instant};
use tracing::{debug, info, warn};

use crate::config::timeouts;
use crate::error::Error;
use crate::ghostfat;
use crate::indicator::StatusLight;
use crate::session::{Progress, UpdateSession};
use crate::target::FlashTargets;
use crate::volume;

/// What the idle loop should do after [`Bootloader::poll`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    Continue,
    /// Reset the MCU now; the firmware transfer finished and the host has had its grace period.
    Reset,
}

/// Levels the board's lights should be driven to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Lights {
    /// Display backlight, used as the "drive ready" indicator.
    pub backlight: bool,
    /// Transfer activity.
    pub flashlight: bool,
}

/// Transport callbacks must not be reentrant or concurrent; `&mut self` on every entry point
/// enforces that.
pub struct Bootloader<I, E, T> {
    flash: FlashTargets<I, E>,
    session: UpdateSession,
    timer: T,
    backlight: StatusLight,
    flashlight: StatusLight,
    configured: bool,
    reset_at: Option<Instant>,
}

impl<I, E, T> Bootloader<I, E, T>
where
    I: NorFlash,
    I::Error: Into<FlashError>,
    E: NorFlash,
    E::Error: Into<FlashError>,
    T: FloatingTimer,
{
    pub fn new(internal: I, external: E, timer: T) -> Self {
        let mut flashlight = StatusLight::new();
        flashlight.on();
        info!("bootloader started");
        Self {
            flash: FlashTargets::new(internal, external),
            session: UpdateSession::new(),
            timer,
            backlight: StatusLight::new(),
            flashlight,
            configured: false,
            reset_at: None,
        }
    }

    /// `(sector_count, sector_size)` of the emulated drive.
    pub fn capacity(&self) -> (u32, u16) {
        (volume::SECTOR_COUNT, volume::SECTOR_SIZE as u16)
    }

    /// The host finished configuring the device. Only the first call has an effect.
    pub fn on_configured(&mut self) {
        if self.configured {
            return;
        }
        self.configured = true;
        debug!("usb configured");
        self.backlight.on_for(&self.timer, timeouts::READY_INDICATOR);
    }

    pub fn read_sector(&mut self, sector: u32, buf: &mut [u8]) -> Result<(), Error> {
        ghostfat::read_sector(&mut self.flash, sector, buf).inspect_err(|error| {
            warn!(sector, len = buf.len(), %error, "sector read failed");
        })
    }

    /// Interpret `buf` as a UF2 block and program it if it belongs to a transfer.
    pub fn write_sector(&mut self, sector: u32, buf: &[u8]) -> Result<(), Error> {
        ghostfat::check_buffer(buf).inspect_err(|_| {
            warn!(sector, len = buf.len(), "misaligned or short write buffer");
        })?;
        let block = Uf2Block::from_sector(buf).map_err(|_| Error::BadBuffer)?;

        let progress = self
            .session
            .accept(&mut self.flash, block)
            .inspect_err(|error| {
                warn!(
                    sector,
                    block_no = block.block_no,
                    address = block.target_address,
                    %error,
                    "block refused"
                );
            })?;

        let (target, started, completed) = match progress {
            Progress::Ignored | Progress::Duplicate => return Ok(()),
            Progress::Programmed { target, started } => (target, started, false),
            Progress::Completed { target, started } => (target, started, true),
        };
        if started {
            self.transfer_started(target, block.block_count);
        }
        debug!(block_no = block.block_no, address = block.target_address, "programmed");
        if completed {
            self.transfer_completed(target);
        }
        Ok(())
    }

    fn transfer_started(&mut self, target: FlashTarget, block_count: u32) {
        info!(%target, block_count, "transfer started");
        self.flashlight.blink(&self.timer, timeouts::TRANSFER_BLINK_PERIOD);
    }

    fn transfer_completed(&mut self, target: FlashTarget) {
        info!(%target, "transfer complete");
        self.flashlight.on();
        if target == FlashTarget::Firmware && self.reset_at.is_none() {
            info!(delay_ms = timeouts::RESET_DELAY.as_millis() as u64, "reset scheduled");
            self.reset_at = Some(Instant::now(&self.timer) + timeouts::RESET_DELAY);
        }
    }

    /// Advance the lights and report whether a scheduled reset is due. Call from the idle loop.
    pub fn poll(&mut self) -> Action {
        self.backlight.update(&self.timer);
        self.flashlight.update(&self.timer);
        match self.reset_at {
            Some(deadline) if deadline.has_passed(&self.timer) => {
                self.flashlight.off();
                info!("resetting");
                Action::Reset
            }
            _ => Action::Continue,
        }
    }

    pub fn lights(&self) -> Lights {
        Lights {
            backlight: self.backlight.is_lit(),
            flashlight: self.flashlight.is_lit(),
        }
    }

    pub fn reset_pending(&self) -> bool {
        self.reset_at.is_some()
    }

    pub fn session(&self) -> &UpdateSession {
        &self.session
    }

    pub fn flash(&self) -> &FlashTargets<I, E> {
        &self.flash
    }

    pub fn into_flash(self) -> (I, E) {
        self.flash.into_inner()
    }
}
