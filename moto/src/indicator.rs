//! Status lights driven from the idle loop.

use core::time::Duration;
use quartz::device::timing::{FloatingTimer, Instant};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Mode {
    Steady,
    Blink { half_period: Duration, toggled_at: Instant },
    Until(Instant),
}

/// One on/off output. The owner calls [`StatusLight::update`] regularly and drives the pin from the
/// returned level.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StatusLight {
    mode: Mode,
    lit: bool,
}

impl StatusLight {
    pub const fn new() -> Self {
        Self {
            mode: Mode::Steady,
            lit: false,
        }
    }

    pub fn on(&mut self) {
        self.mode = Mode::Steady;
        self.lit = true;
    }

    pub fn off(&mut self) {
        self.mode = Mode::Steady;
        self.lit = false;
    }

    /// Toggle every half `period`, starting from the current level.
    pub fn blink<FT: FloatingTimer>(&mut self, ft: &FT, period: Duration) {
        self.mode = Mode::Blink {
            half_period: period / 2,
            toggled_at: Instant::now(ft),
        };
    }

    /// Light up now and go dark once `duration` has passed.
    pub fn on_for<FT: FloatingTimer>(&mut self, ft: &FT, duration: Duration) {
        self.mode = Mode::Until(Instant::now(ft) + duration);
        self.lit = true;
    }

    /// Advance timed modes; returns whether the light is lit.
    pub fn update<FT: FloatingTimer>(&mut self, ft: &FT) -> bool {
        match self.mode {
            Mode::Steady => {}
            Mode::Blink {
                half_period,
                toggled_at,
            } => {
                if toggled_at.elapsed(ft) >= half_period {
                    self.lit = !self.lit;
                    self.mode = Mode::Blink {
                        half_period,
                        toggled_at: Instant::now(ft),
                    };
                }
            }
            Mode::Until(deadline) => {
                if deadline.has_passed(ft) {
                    self.off();
                }
            }
        }
        self.lit
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }
}

impl Default for StatusLight {
    fn default() -> Self {
        Self::new()
    }
}
