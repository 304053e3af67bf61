//! Locking for state shared between the main loop and interrupt handlers.

use core::sync::atomic::{AtomicBool, Ordering};

/// Raw lock whose test-and-set runs inside a critical section, so it works on cores without
/// atomic compare-and-swap (e.g. Cortex-M0+).
pub struct RawCsLock {
    locked: AtomicBool,
}

unsafe impl lock_api::RawMutex for RawCsLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = Self {
        locked: AtomicBool::new(false),
    };

    type GuardMarker = lock_api::GuardNoSend;

    fn lock(&self) {
        while !self.try_lock() {
            core::hint::spin_loop();
        }
    }

    fn try_lock(&self) -> bool {
        critical_section::with(|_| {
            if self.locked.load(Ordering::Relaxed) {
                false
            } else {
                self.locked.store(true, Ordering::Relaxed);
                true
            }
        })
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }

    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

pub type Mutex<T> = lock_api::Mutex<RawCsLock, T>;
pub type MutexGuard<'a, T> = lock_api::MutexGuard<'a, RawCsLock, T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_excludes_second_locker() {
        let m = Mutex::new(5u32);
        {
            let mut g = m.lock();
            *g += 1;
            assert!(m.try_lock().is_none());
        }
        assert_eq!(*m.lock(), 6);
    }
}
