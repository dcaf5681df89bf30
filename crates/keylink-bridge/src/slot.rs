//! USB OUT landing slots (host to secure core).
//!
//! The USB receive interrupt fills a slot; the poll loop forwards it to the
//! UART and hands it back. While a slot is full the endpoint NAKs.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use keylink_frame::MAX_PAYLOAD;

use crate::endpoint::UsbEndpoint;

pub struct OutSlot {
    data: UnsafeCell<[u8; MAX_PAYLOAD]>,
    len: AtomicUsize,
    full: AtomicBool,
}

// SAFETY: `full` hands the buffer back and forth. The interrupt writes only
// while `full` is false and publishes with release; the poll loop reads only
// while `full` is true and clears it with release once it is done.
unsafe impl Sync for OutSlot {}

impl OutSlot {
    pub const fn new() -> Self {
        Self {
            data: UnsafeCell::new([0; MAX_PAYLOAD]),
            len: AtomicUsize::new(0),
            full: AtomicBool::new(false),
        }
    }

    pub fn is_full(&self) -> bool {
        self.full.load(Ordering::Acquire)
    }

    /// Interrupt side. Returns `false` (NAK) if the slot is still full or the
    /// packet is larger than one frame.
    pub fn fill(&self, packet: &[u8]) -> bool {
        if packet.len() > MAX_PAYLOAD || self.is_full() {
            return false;
        }
        // SAFETY: `full` is false, so the poll loop is not reading the buffer.
        let buf = unsafe { &mut *self.data.get() };
        buf[..packet.len()].copy_from_slice(packet);
        self.len.store(packet.len(), Ordering::Relaxed);
        self.full.store(true, Ordering::Release);
        true
    }

    /// Poll side. Runs `f` on the parked packet and frees the slot if `f`
    /// succeeds. Returns `Ok(None)` when the slot is empty.
    pub fn drain<R, E>(&self, f: impl FnOnce(&[u8]) -> Result<R, E>) -> Result<Option<R>, E> {
        if !self.is_full() {
            return Ok(None);
        }
        let len = self.len.load(Ordering::Relaxed);
        // SAFETY: `full` is true, so the interrupt will not write until we
        // clear it below.
        let buf = unsafe { &*self.data.get() };
        let packet = &buf[..len];
        let out = f(packet)?;
        self.full.store(false, Ordering::Release);
        Ok(Some(out))
    }
}

impl Default for OutSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OutSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutSlot")
            .field("full", &self.is_full())
            .field("len", &self.len.load(Ordering::Relaxed))
            .finish()
    }
}

/// One [`OutSlot`] per USB endpoint.
#[derive(Debug, Default)]
pub struct OutSlots {
    slots: [OutSlot; 3],
}

impl OutSlots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: UsbEndpoint) -> &OutSlot {
        &self.slots[endpoint.index()]
    }
}
