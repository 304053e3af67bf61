use core::ops::Add;
use core::time::Duration;

/// Trait that describes typical floating timers available on many systems. Expected to be a 1MHz
/// timer whose zero point is unknown.
pub trait FloatingTimer {
    /// Get the time in microseconds since some past instant.
    fn floating_time(&self) -> u64;
    /// A version of [`floating_time`](FloatingTimer::floating_time) that must be called
    /// consecutively; by default equivalent to it, but platforms that need extra synchronization
    /// when switching between peripherals may find this a useful optimization.
    ///
    /// # Safety
    /// No other peripheral may be accessed between consecutive calls.
    unsafe fn floating_time_consecutive(&self) -> u64 {
        self.floating_time()
    }
}

impl<T: FloatingTimer + ?Sized> FloatingTimer for &T {
    fn floating_time(&self) -> u64 {
        (**self).floating_time()
    }
    unsafe fn floating_time_consecutive(&self) -> u64 {
        unsafe { (**self).floating_time_consecutive() }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Instant {
    floating_micros: u64,
}
impl Instant {
    pub fn now<FT: FloatingTimer>(ft: &FT) -> Self {
        Self {
            floating_micros: ft.floating_time(),
        }
    }

    pub fn elapsed<FT: FloatingTimer>(&self, ft: &FT) -> Duration {
        let current_time = ft.floating_time();
        Duration::from_micros(current_time.wrapping_sub(self.floating_micros))
    }

    /// True once the timer has reached this instant. Comparison is wraparound-safe for instants
    /// less than 2^63 us apart.
    pub fn has_passed<FT: FloatingTimer>(&self, ft: &FT) -> bool {
        ft.floating_time().wrapping_sub(self.floating_micros) as i64 >= 0
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Instant {
            floating_micros: self.floating_micros.wrapping_add(micros),
        }
    }
}

/// Blocking wait for (at least) `milliseconds` milliseconds.
pub fn delay_millis<FT: FloatingTimer>(ft: &FT, milliseconds: u64) {
    delay_micros(ft, milliseconds.saturating_mul(1000));
}

/// Blocking wait for (at least) `microseconds` microseconds. In a no-interrupts setting this
/// should be close to exact.
pub fn delay_micros<FT: FloatingTimer>(ft: &FT, microseconds: u64) {
    let start = unsafe { ft.floating_time_consecutive() };
    while unsafe { ft.floating_time_consecutive() }.wrapping_sub(start) < microseconds {
        core::hint::spin_loop();
    }
}

/// Adapter exposing a [`FloatingTimer`] as an [`embedded_hal::delay::DelayNs`].
pub struct TimerDelay<FT>(pub FT);

impl<FT: FloatingTimer> embedded_hal::delay::DelayNs for TimerDelay<FT> {
    fn delay_ns(&mut self, ns: u32) {
        delay_micros(&self.0, u64::from(ns.div_ceil(1000)));
    }

    fn delay_us(&mut self, us: u32) {
        delay_micros(&self.0, u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        delay_millis(&self.0, u64::from(ms));
    }
}
