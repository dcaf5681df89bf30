//! Fixed-capacity receive ring shared between the UART interrupt and the
//! poll loop.
//!
//! Single producer, single consumer: only the interrupt calls [`RingBuffer::push`]
//! and only the poll loop calls [`RingBuffer::pop_into`]. Each side owns one
//! cursor; neither ever stores to the other's. Cursors run over `0..2N` so
//! that "full" and "empty" are distinguishable without a shared count.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receive ring size used by the bridge link.
pub const DEFAULT_CAPACITY: usize = 140;

pub struct RingBuffer<const N: usize> {
    storage: UnsafeCell<[u8; N]>,
    write: AtomicUsize,
    read: AtomicUsize,
    overruns: AtomicUsize,
}

// SAFETY: the producer writes only the slot at `write % N`, and only while
// that slot is outside the readable window; the consumer reads only slots
// inside the window. The window boundaries are published with
// release/acquire, so no slot is ever accessed from both sides at once.
unsafe impl<const N: usize> Sync for RingBuffer<N> {}

impl<const N: usize> RingBuffer<N> {
    pub const fn new() -> Self {
        assert!(N > 0, "ring capacity must be non-zero");
        Self {
            storage: UnsafeCell::new([0; N]),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            overruns: AtomicUsize::new(0),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append one byte. Interrupt context only.
    ///
    /// Returns `false` and drops the byte when the ring is full. Flow control
    /// is expected to keep this from happening, so the drop is only counted.
    pub fn push(&self, byte: u8) -> bool {
        let write = self.write.load(Ordering::Relaxed);
        let read = self.read.load(Ordering::Acquire);
        if Self::distance(read, write) == N {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        // SAFETY: slot `write % N` is outside the readable window (checked
        // above), so the consumer cannot be reading it.
        unsafe {
            self.base().add(write % N).write(byte);
        }
        self.write.store((write + 1) % (2 * N), Ordering::Release);
        true
    }

    /// Copy up to `n` bytes into `dest` and consume them. Poll loop only.
    ///
    /// Never blocks: returns how many bytes were actually copied, which is
    /// less than `n` when fewer are buffered or `dest` is shorter.
    pub fn pop_into(&self, dest: &mut [u8], n: usize) -> usize {
        let read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        let count = n.min(dest.len()).min(Self::distance(read, write));
        if count == 0 {
            return 0;
        }

        let start = read % N;
        let first = count.min(N - start);
        // SAFETY: both spans lie inside the readable window published by the
        // producer, which it will not touch until `read` moves past them.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(start), dest.as_mut_ptr(), first);
            if count > first {
                std::ptr::copy_nonoverlapping(
                    self.base(),
                    dest.as_mut_ptr().add(first),
                    count - first,
                );
            }
        }
        self.read.store((read + count) % (2 * N), Ordering::Release);
        count
    }

    /// Bytes currently buffered. Side-effect free.
    pub fn occupancy(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        Self::distance(read, write)
    }

    pub fn is_empty(&self) -> bool {
        self.occupancy() == 0
    }

    pub fn is_full(&self) -> bool {
        self.occupancy() == N
    }

    /// `(read, write)` slot positions, each in `0..N`.
    pub fn cursors(&self) -> (usize, usize) {
        (
            self.read.load(Ordering::Acquire) % N,
            self.write.load(Ordering::Acquire) % N,
        )
    }

    /// Bytes dropped by [`push`](Self::push) because the ring was full.
    pub fn overruns(&self) -> usize {
        self.overruns.load(Ordering::Relaxed)
    }

    /// Return to the empty state. Requires exclusive access, so it can only
    /// run while the interrupt is not attached (bus reset, startup).
    pub fn reset(&mut self) {
        *self.write.get_mut() = 0;
        *self.read.get_mut() = 0;
        *self.overruns.get_mut() = 0;
    }

    fn base(&self) -> *mut u8 {
        self.storage.get().cast::<u8>()
    }

    fn distance(read: usize, write: usize) -> usize {
        (write + 2 * N - read) % (2 * N)
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> std::fmt::Debug for RingBuffer<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (read, write) = self.cursors();
        f.debug_struct("RingBuffer")
            .field("capacity", &N)
            .field("occupancy", &self.occupancy())
            .field("read", &read)
            .field("write", &write)
            .field("overruns", &self.overruns())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn push_then_pop() {
        let ring = RingBuffer::<8>::new();
        for b in 1..=5u8 {
            assert!(ring.push(b));
        }
        assert_eq!(ring.occupancy(), 5);

        let mut out = [0u8; 8];
        assert_eq!(ring.pop_into(&mut out, 3), 3);
        assert_eq!(&out[..3], &[1, 2, 3]);
        assert_eq!(ring.occupancy(), 2);
    }

    #[test]
    fn pop_returns_available_when_short() {
        let ring = RingBuffer::<8>::new();
        ring.push(9);
        let mut out = [0u8; 4];
        assert_eq!(ring.pop_into(&mut out, 4), 1);
        assert_eq!(out[0], 9);
        assert_eq!(ring.pop_into(&mut out, 4), 0);
    }

    #[test]
    fn pop_is_limited_by_destination() {
        let ring = RingBuffer::<8>::new();
        for b in 0..6u8 {
            ring.push(b);
        }
        let mut out = [0u8; 2];
        assert_eq!(ring.pop_into(&mut out, 6), 2);
        assert_eq!(ring.occupancy(), 4);
    }

    #[test]
    fn full_ring_drops_and_counts() {
        let ring = RingBuffer::<4>::new();
        for b in 0..4u8 {
            assert!(ring.push(b));
        }
        assert!(ring.is_full());
        assert!(!ring.push(99));
        assert_eq!(ring.overruns(), 1);
        assert_eq!(ring.occupancy(), 4);

        let mut out = [0u8; 4];
        assert_eq!(ring.pop_into(&mut out, 4), 4);
        assert_eq!(out, [0, 1, 2, 3]);
    }

    #[test]
    fn gather_copy_across_wrap() {
        let ring = RingBuffer::<5>::new();
        let mut out = [0u8; 5];
        for b in 0..4u8 {
            ring.push(b);
        }
        ring.pop_into(&mut out, 3);
        for b in 10..14u8 {
            assert!(ring.push(b));
        }
        assert_eq!(ring.cursors(), (3, 2));

        assert_eq!(ring.pop_into(&mut out, 5), 5);
        assert_eq!(out, [3, 10, 11, 12, 13]);
        assert!(ring.is_empty());
    }

    #[test]
    fn write_cursor_tracks_read_plus_count() {
        let ring = RingBuffer::<7>::new();
        let mut out = [0u8; 7];
        for round in 0..20u8 {
            ring.push(round);
            ring.push(round);
            ring.pop_into(&mut out, 1);
            let (read, write) = ring.cursors();
            assert_eq!(write, (read + ring.occupancy()) % 7);
        }
    }

    #[test]
    fn reset_empties_ring() {
        let mut ring = RingBuffer::<4>::new();
        ring.push(1);
        ring.push(2);
        ring.reset();
        assert!(ring.is_empty());
        assert_eq!(ring.cursors(), (0, 0));
    }

    #[test]
    fn producer_thread_consumer_thread_preserve_order() {
        let ring = Arc::new(RingBuffer::<DEFAULT_CAPACITY>::new());
        let total = 10_000usize;

        let producer = {
            let ring = Arc::clone(&ring);
            std::thread::spawn(move || {
                for i in 0..total {
                    while !ring.push((i % 251) as u8) {
                        std::thread::yield_now();
                    }
                }
            })
        };

        let mut received = Vec::with_capacity(total);
        let mut chunk = [0u8; 64];
        while received.len() < total {
            let n = ring.pop_into(&mut chunk, 64);
            received.extend_from_slice(&chunk[..n]);
            if n == 0 {
                std::thread::yield_now();
            }
        }
        producer.join().unwrap();

        for (i, byte) in received.iter().enumerate() {
            assert_eq!(*byte, (i % 251) as u8);
        }
    }

    proptest! {
        #[test]
        fn prop_pop_returns_pushed_bytes_at_any_offset(
            offset in 0usize..16,
            data in proptest::collection::vec(any::<u8>(), 0..=16),
        ) {
            let ring = RingBuffer::<16>::new();
            let mut scratch = [0u8; 16];
            for _ in 0..offset {
                ring.push(0);
            }
            ring.pop_into(&mut scratch, offset);
            prop_assert!(ring.is_empty());

            for &b in &data {
                prop_assert!(ring.push(b));
            }
            let mut out = [0u8; 16];
            let n = ring.pop_into(&mut out, data.len());
            prop_assert_eq!(n, data.len());
            prop_assert_eq!(&out[..n], data.as_slice());
        }
    }
}
