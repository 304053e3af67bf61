//! In-memory log sink.
//!
//! Log lines are formatted into a byte ring as they happen, and the idle loop drains the ring to
//! the debug UART when there is time. When the ring is full the oldest bytes are overwritten.
//!
//! The ring is only touched inside a critical section, so events may be raised from interrupt
//! handlers while the idle loop is draining.

use core::fmt::{self, Write};

use quartz::device::uart::Uart;
use quartz::sync::Mutex;
use tracing::dispatcher::{self, Dispatch, SetGlobalDefaultError};
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Metadata, Subscriber, span};

struct Ring<const N: usize> {
    bytes: [u8; N],
    start: usize,
    len: usize,
}

impl<const N: usize> Ring<N> {
    fn push(&mut self, data: &[u8]) {
        if N == 0 {
            return;
        }
        for &byte in data {
            self.bytes[(self.start + self.len) % N] = byte;
            if self.len == N {
                self.start = (self.start + 1) % N;
            } else {
                self.len += 1;
            }
        }
    }

    /// Oldest unread bytes that are contiguous in memory.
    fn readable(&self) -> &[u8] {
        let end = (self.start + self.len).min(N);
        &self.bytes[self.start..end]
    }

    fn consume(&mut self, n: usize) {
        self.start = (self.start + n) % N.max(1);
        self.len -= n;
    }
}

impl<const N: usize> Write for Ring<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push(s.as_bytes());
        Ok(())
    }
}

pub struct LogRing<const N: usize> {
    ring: Mutex<Ring<N>>,
}

impl<const N: usize> LogRing<N> {
    pub const fn new() -> Self {
        Self {
            ring: Mutex::new(Ring {
                bytes: [0; N],
                start: 0,
                len: 0,
            }),
        }
    }

    /// Run `f` on the ring with interrupts masked.
    fn with_ring<R>(&self, f: impl FnOnce(&mut Ring<N>) -> R) -> R {
        critical_section::with(|_| f(&mut self.ring.lock()))
    }

    pub fn write(&self, bytes: &[u8]) {
        self.with_ring(|ring| ring.push(bytes));
    }

    pub fn len(&self) -> usize {
        self.with_ring(|ring| ring.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move up to `out.len()` of the oldest bytes into `out`; returns how many were moved.
    pub fn fetch(&self, out: &mut [u8]) -> usize {
        self.with_ring(|ring| {
            let mut copied = 0;
            while copied < out.len() {
                let chunk = ring.readable();
                if chunk.is_empty() {
                    break;
                }
                let n = chunk.len().min(out.len() - copied);
                out[copied..copied + n].copy_from_slice(&chunk[..n]);
                ring.consume(n);
                copied += n;
            }
            copied
        })
    }

    /// Push pending bytes into `uart` without blocking on its FIFO; returns how many were sent.
    pub fn drain_to<U: Uart>(&self, uart: &U) -> usize {
        self.with_ring(|ring| {
            let mut sent = 0;
            loop {
                let chunk = ring.readable();
                if chunk.is_empty() {
                    break;
                }
                let wanted = chunk.len();
                let n = uart.write_bytes_nonblocking(chunk);
                ring.consume(n);
                sent += n;
                if n < wanted {
                    break;
                }
            }
            sent
        })
    }
}

impl<const N: usize> Default for LogRing<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// [`tracing`] subscriber that prints events into a [`LogRing`] as
/// `LEVEL target: message key=value`. Spans are not tracked.
///
/// The dispatcher keeps its own copy of the subscriber on the heap, so the device image needs a
/// global allocator once one is installed.
#[derive(Clone, Copy)]
pub struct RingSubscriber<const N: usize> {
    ring: &'static LogRing<N>,
    max_level: LevelFilter,
}

impl<const N: usize> RingSubscriber<N> {
    pub const fn new(ring: &'static LogRing<N>, max_level: LevelFilter) -> Self {
        Self { ring, max_level }
    }

    /// Make this the process-wide subscriber.
    pub fn install(&self) -> Result<(), SetGlobalDefaultError> {
        dispatcher::set_global_default(Dispatch::new(*self))
    }
}

impl<const N: usize> Subscriber for RingSubscriber<N> {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        *metadata.level() <= self.max_level
    }

    fn max_level_hint(&self) -> Option<LevelFilter> {
        Some(self.max_level)
    }

    fn new_span(&self, _span: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(1)
    }

    fn record(&self, _span: &span::Id, _values: &span::Record<'_>) {}

    fn record_follows_from(&self, _span: &span::Id, _follows: &span::Id) {}

    fn event(&self, event: &Event<'_>) {
        let metadata = event.metadata();
        self.ring.with_ring(|ring| {
            let _ = write!(ring, "{} {}:", metadata.level(), metadata.target());
            event.record(&mut FieldWriter { out: &mut *ring });
            ring.push(b"\r\n");
        });
    }

    fn enter(&self, _span: &span::Id) {}

    fn exit(&self, _span: &span::Id) {}
}

struct FieldWriter<'a, W> {
    out: &'a mut W,
}

impl<W: Write> Visit for FieldWriter<'_, W> {
    fn record_str(&mut self, field: &Field, value: &str) {
        let _ = if field.name() == "message" {
            write!(self.out, " {value}")
        } else {
            write!(self.out, " {}={value}", field.name())
        };
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let _ = if field.name() == "message" {
            write!(self.out, " {value:?}")
        } else {
            write!(self.out, " {}={value:?}", field.name())
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};

    #[test]
    fn ring_overwrites_oldest() {
        let ring = LogRing::<4>::new();
        ring.write(b"abcdef");
        assert_eq!(ring.len(), 4);
        let mut out = [0; 8];
        assert_eq!(ring.fetch(&mut out), 4);
        assert_eq!(&out[..4], b"cdef");
        assert!(ring.is_empty());
    }

    #[test]
    fn fetch_is_partial_when_out_is_small() {
        let ring = LogRing::<8>::new();
        ring.write(b"hello");
        let mut out = [0; 2];
        assert_eq!(ring.fetch(&mut out), 2);
        assert_eq!(&out, b"he");
        assert_eq!(ring.len(), 3);
    }

    /// UART whose FIFO accepts `room` bytes before reporting full.
    struct SmallFifo {
        room: Cell<usize>,
        sent: RefCell<[u8; 16]>,
        count: Cell<usize>,
    }
    impl Uart for SmallFifo {
        fn flush_tx(&self) {}
        fn can_write(&self) -> bool {
            self.room.get() > 0
        }
        fn write_byte(&self, byte: u8) {
            self.room.set(self.room.get() - 1);
            self.sent.borrow_mut()[self.count.get()] = byte;
            self.count.set(self.count.get() + 1);
        }
        fn data_available(&self) -> bool {
            false
        }
        fn read_byte(&self) -> u8 {
            0
        }
    }

    #[test]
    fn drain_stops_when_fifo_fills_and_wraps() {
        let ring = LogRing::<6>::new();
        ring.write(b"wxyz");
        let mut skip = [0; 3];
        ring.fetch(&mut skip);
        ring.write(b"1234");

        let uart = SmallFifo {
            room: Cell::new(3),
            sent: RefCell::new([0; 16]),
            count: Cell::new(0),
        };
        assert_eq!(ring.drain_to(&uart), 3);
        assert_eq!(ring.len(), 2);
        uart.room.set(10);
        assert_eq!(ring.drain_to(&uart), 2);
        assert_eq!(&uart.sent.borrow()[..5], b"z1234");
    }
}
