//! Bounded buffer protocol over the shared circular edge buffer.
//!
//! Three gates guard the ring:
//!   write_slots_free   starts at RING_CAPACITY, taken by a writer per slot
//!   read_slots_filled  starts at 0, taken by the reader per slot
//!   writers_mutex      starts at 1, held by one writer for a whole solution
//!
//! Fullness and emptiness come only from the two counting gates. `head` and
//! `tail` are never compared with each other.

use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::frame::StreamItem;
use crate::gate::{Gate, SyncError};
use crate::signal::WakeOnSignal;
use crate::RING_CAPACITY;

#[repr(C)]
struct Ring {
    head: AtomicU32, // next write slot, writers only
    tail: AtomicU32, // next read slot, reader only
    slots: [AtomicU64; RING_CAPACITY],
}

impl Ring {
    fn init(&self) {
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Relaxed);
        for slot in &self.slots {
            slot.store(0, Ordering::Relaxed);
        }
    }

    // Caller holds a write_slots_free permit and the writers mutex.
    fn push(&self, item: StreamItem) {
        let head = self.head.load(Ordering::Relaxed) as usize;
        self.slots[head].store(item.pack(), Ordering::Relaxed);
        self.head
            .store(((head + 1) % RING_CAPACITY) as u32, Ordering::Relaxed);
    }

    // Caller holds a read_slots_filled permit and is the only reader.
    fn pop(&self) -> StreamItem {
        let tail = self.tail.load(Ordering::Relaxed) as usize;
        let item = StreamItem::unpack(self.slots[tail].load(Ordering::Relaxed));
        self.tail
            .store(((tail + 1) % RING_CAPACITY) as u32, Ordering::Relaxed);
        item
    }
}

/// The circular buffer plus its three gates, as laid out in shared memory.
#[repr(C)]
pub struct BoundedBuffer {
    write_slots_free: Gate,
    read_slots_filled: Gate,
    writers_mutex: Gate,
    ring: Ring,
}

impl BoundedBuffer {
    pub(crate) fn init(&self) {
        self.ring.init();
        self.write_slots_free.init(RING_CAPACITY as u32);
        self.read_slots_filled.init(0);
        self.writers_mutex.init(1);
    }

    /// Enter the writers' critical section. Held for one entire solution.
    pub fn lock_writers(&self) -> Result<WritersGuard<'_>, SyncError> {
        self.writers_mutex.acquire()?;
        Ok(WritersGuard { buffer: self })
    }

    /// Append one item, blocking while the ring is full.
    pub fn write(&self, guard: &WritersGuard<'_>, item: StreamItem) -> Result<(), SyncError> {
        debug_assert!(ptr::eq(guard.buffer, self));
        self.write_slots_free.acquire()?;
        self.ring.push(item);
        self.read_slots_filled.release()
    }

    /// Take the oldest item, blocking while the ring is empty.
    ///
    /// There is exactly one reader (the supervisor), so no lock is taken.
    pub fn read(&self) -> Result<StreamItem, SyncError> {
        self.read_slots_filled.acquire()?;
        let item = self.ring.pop();
        self.write_slots_free.release()?;
        Ok(item)
    }

    /// Items written but not yet read.
    pub fn unread(&self) -> u32 {
        self.read_slots_filled.value()
    }

    /// Let SIGINT/SIGTERM break the reader out of `read` while the returned
    /// registration lives, even if the signal lands before it sleeps.
    pub fn wake_reader_on_signal(&self) -> WakeOnSignal<'_> {
        WakeOnSignal::register(&self.read_slots_filled)
    }

    /// Fail every present and future writer wait with `SyncError::Closed`.
    /// Used once at shutdown so producers stuck on a full ring can leave.
    pub(crate) fn close_writers(&self) -> Result<(), SyncError> {
        self.write_slots_free.close()?;
        self.writers_mutex.close()
    }
}

/// Proof of holding the writers mutex. Released on drop.
pub struct WritersGuard<'a> {
    buffer: &'a BoundedBuffer,
}

impl Drop for WritersGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.buffer.writers_mutex.release() {
            tracing::warn!("releasing writers mutex failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Edge;
    use crate::region::SharedRegion;

    #[test]
    fn test_fifo_order_and_wraparound() {
        let region = SharedRegion::anonymous().unwrap();
        let buf = region.buffer();

        // Three passes over the ring force head and tail to wrap.
        for pass in 0..3u16 {
            let guard = buf.lock_writers().unwrap();
            for i in 0..RING_CAPACITY as u16 - 1 {
                buf.write(&guard, StreamItem::Edge(Edge::new(pass, i + 1)))
                    .unwrap();
            }
            buf.write(&guard, StreamItem::EndOfSolution).unwrap();
            drop(guard);

            assert_eq!(buf.unread(), RING_CAPACITY as u32);
            for i in 0..RING_CAPACITY as u16 - 1 {
                assert_eq!(buf.read().unwrap(), StreamItem::Edge(Edge::new(pass, i + 1)));
            }
            assert_eq!(buf.read().unwrap(), StreamItem::EndOfSolution);
            assert_eq!(buf.unread(), 0);
        }
    }

    #[test]
    fn test_guard_drop_releases_mutex() {
        let region = SharedRegion::anonymous().unwrap();
        let buf = region.buffer();
        {
            let _g = buf.lock_writers().unwrap();
            assert_eq!(buf.writers_mutex.value(), 0);
        }
        assert_eq!(buf.writers_mutex.value(), 1);
    }

    #[test]
    fn test_close_writers_refuses_writes() {
        let region = SharedRegion::anonymous().unwrap();
        let buf = region.buffer();
        let guard = buf.lock_writers().unwrap();
        buf.close_writers().unwrap();

        assert!(matches!(
            buf.write(&guard, StreamItem::EndOfSolution),
            Err(SyncError::Closed)
        ));
        drop(guard);
        assert!(matches!(buf.lock_writers(), Err(SyncError::Closed)));
    }
}
