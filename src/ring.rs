//! Definition of a lane's ring buffer.

use crate::storage::OffHeap;
use parking_lot::Mutex;
use std::cmp::min;
use std::io;
use std::ptr::copy_nonoverlapping;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Outcome of appending bytes into a [`RingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Bytes were copied into the active sub-buffer.
    Written,

    /// Bytes were discarded, nothing was copied.
    Dropped,
}

/// Point in time counters of a [`RingBuffer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    /// Number of appends that were written.
    pub written: u64,

    /// Number of appends that were dropped.
    pub dropped: u64,

    /// Number of sub-buffers sealed since creation.
    pub produced: u64,

    /// Number of sub-buffers fully read since creation.
    pub consumed: u64,
}

/// A fixed capacity, append only byte buffer split into rotating sub-buffers.
///
/// Works a lot like a kernel relay buffer:
/// * Exactly one sub-buffer is active and receives appends.
/// * When the active sub-buffer cannot fit an append, it is sealed and the next
///   sub-buffer in cyclic order becomes active.
/// * Readers see committed bytes oldest first, including those of the active
///   sub-buffer. A sealed sub-buffer is handed back to the producer once it has
///   been fully read.
/// * When every other sub-buffer still holds unread data, the append is dropped.
///   Unread data is never overwritten.
///
/// Producer and consumer do not share a lock. The producer publishes each append
/// by storing the committed length of the active sub-buffer, and readers publish
/// progress through `consumed`. Readers never touch the writer slot, so a stalled
/// reader can only cause drops by leaving sub-buffers unread.
#[derive(Debug)]
pub struct RingBuffer {
    memory: OffHeap,
    sub_buffer_size: usize,
    sub_buffers: usize,

    // Held by whoever is appending to or sealing the active sub-buffer.
    writer: AtomicBool,

    // Sub-buffer with sequence number `produced` is the active one.
    produced: AtomicU64,
    consumed: AtomicU64,

    // Committed bytes of each sub-buffer, final once the sub-buffer is sealed.
    lengths: Box<[AtomicUsize]>,

    written: AtomicU64,
    dropped: AtomicU64,

    // Read position within the oldest sealed sub-buffer.
    cursor: Mutex<usize>,
}

/// Releases the writer slot of a [`RingBuffer`] when dropped.
struct WriterSlot<'a>(&'a AtomicBool);

impl Drop for WriterSlot<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RingBuffer {
    /// Create a new ring buffer backed by off-heap memory.
    ///
    /// Capacity is split evenly between sub-buffers, any remainder is unused.
    /// Returns an I/O error if memory could not be allocated.
    ///
    /// # Panic
    ///
    /// * Panics if number of sub-buffers is <= 1.
    /// * Panics if capacity is less than the number of sub-buffers.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Total number of bytes across all sub-buffers.
    /// * `sub_buffers` - Number of sub-buffers in the ring buffer.
    pub fn try_new(capacity: usize, sub_buffers: usize) -> io::Result<Self> {
        assert!(sub_buffers > 1, "A Ring must have at least 2 sub-buffers");
        assert!(
            capacity >= sub_buffers,
            "A Ring sub-buffer must hold at least 1 byte"
        );

        let sub_buffer_size = capacity / sub_buffers;
        let memory = OffHeap::try_alloc(sub_buffer_size * sub_buffers)?;
        let lengths = std::iter::repeat_with(|| AtomicUsize::new(0))
            .take(sub_buffers)
            .collect();

        Ok(Self {
            memory,
            sub_buffer_size,
            sub_buffers,
            writer: AtomicBool::new(false),
            produced: AtomicU64::new(0),
            consumed: AtomicU64::new(0),
            lengths,
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            cursor: Mutex::new(0),
        })
    }

    /// Total number of usable bytes across all sub-buffers.
    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Number of bytes in a single sub-buffer.
    pub fn sub_buffer_size(&self) -> usize {
        self.sub_buffer_size
    }

    /// Number of sub-buffers in this ring buffer.
    pub fn sub_buffers(&self) -> usize {
        self.sub_buffers
    }

    /// Snapshot of this ring buffer's counters.
    pub fn stats(&self) -> RingStats {
        RingStats {
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            produced: self.produced.load(Ordering::Acquire),
            consumed: self.consumed.load(Ordering::Acquire),
        }
    }

    /// Append bytes into the active sub-buffer.
    ///
    /// Never blocks. The bytes are dropped when:
    /// * They are larger than a single sub-buffer.
    /// * Another append or seal on this ring buffer is in progress.
    /// * The active sub-buffer is full and no other sub-buffer is free.
    ///
    /// # Arguments
    ///
    /// * `bytes` - Bytes to append, kept contiguous within one sub-buffer.
    pub fn append(&self, bytes: &[u8]) -> AppendOutcome {
        if bytes.len() > self.sub_buffer_size {
            return self.drop_append();
        }

        let Some(_slot) = self.claim() else {
            return self.drop_append();
        };

        // Rotate to the next sub-buffer if bytes won't fit in the active one.
        let mut active = self.index(self.produced.load(Ordering::Relaxed));
        let mut offset = self.lengths[active].load(Ordering::Relaxed);
        if offset + bytes.len() > self.sub_buffer_size {
            let Some(next) = self.rotate() else {
                return self.drop_append();
            };

            active = next;
            offset = 0;
        }

        // Safety: Readers never read past the committed length, and bytes past it
        // are only written while holding the writer slot. Range is within the
        // sub-buffer.
        unsafe {
            let dst = self.sub_buffer_ptr(active).add(offset);
            copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len());
        }

        // Commit, making the bytes visible to readers.
        self.lengths[active].store(offset + bytes.len(), Ordering::Release);
        self.written.fetch_add(1, Ordering::Relaxed);
        AppendOutcome::Written
    }

    /// Seal the active sub-buffer and make the next one active.
    ///
    /// Returns false when there was nothing to seal, an append was in progress,
    /// or no other sub-buffer is free to become active.
    pub fn flush(&self) -> bool {
        let Some(_slot) = self.claim() else {
            return false;
        };

        let active = self.index(self.produced.load(Ordering::Relaxed));
        self.lengths[active].load(Ordering::Relaxed) > 0 && self.rotate().is_some()
    }

    /// Copy committed bytes into buf, oldest first.
    ///
    /// * Drains sealed sub-buffers first, then whatever has been committed to the
    ///   active sub-buffer. Never waits for, or interferes with, the producer.
    /// * Sealed sub-buffers that are fully copied are released back to the producer.
    /// * Returns the number of bytes copied, 0 when there is nothing to read.
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffer to copy bytes into.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        let mut cursor = self.cursor.lock();
        let mut filled = 0;

        while filled < buf.len() {
            // Only readers advance consumed, and we hold the reader lock.
            let consumed = self.consumed.load(Ordering::Relaxed);
            let sealed = consumed < self.produced.load(Ordering::Acquire);

            // Producer can't reuse this sub-buffer until consumed moves past it.
            let index = self.index(consumed);
            let len = self.lengths[index].load(Ordering::Acquire);
            let count = min(len - *cursor, buf.len() - filled);

            // Safety: Bytes below the committed length are never written again
            // until the sub-buffer is released. Ranges are within the sub-buffer
            // and buf.
            unsafe {
                let src = self.sub_buffer_ptr(index).add(*cursor);
                copy_nonoverlapping(src, buf[filled..].as_mut_ptr(), count);
            }

            filled += count;
            *cursor += count;

            if sealed && *cursor == len {
                // Hand the sub-buffer back to the producer.
                *cursor = 0;
                self.consumed.store(consumed + 1, Ordering::Release);
            } else if count == 0 {
                break;
            }
        }

        filled
    }

    /// Open a read handle to this ring buffer.
    pub fn reader(self: &Arc<Self>) -> LaneReader {
        LaneReader(Arc::clone(self))
    }

    /// Try to claim the writer slot without waiting.
    fn claim(&self) -> Option<WriterSlot<'_>> {
        self.writer
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| WriterSlot(&self.writer))
    }

    /// Seal the active sub-buffer and return the index of the next active one.
    ///
    /// Must hold the writer slot.
    fn rotate(&self) -> Option<usize> {
        let produced = self.produced.load(Ordering::Relaxed);
        let consumed = self.consumed.load(Ordering::Acquire);

        // Next sub-buffer in order still holds unread bytes.
        if produced - consumed >= (self.sub_buffers - 1) as u64 {
            return None;
        }

        // Readers only look at the next sub-buffer once they see it become active.
        let next = self.index(produced + 1);
        self.lengths[next].store(0, Ordering::Relaxed);
        self.produced.store(produced + 1, Ordering::Release);
        Some(next)
    }

    fn drop_append(&self) -> AppendOutcome {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(sub_buffers = self.sub_buffers, "Dropped append");
        AppendOutcome::Dropped
    }

    #[inline]
    fn index(&self, seq_no: u64) -> usize {
        (seq_no % self.sub_buffers as u64) as usize
    }

    #[inline]
    fn sub_buffer_ptr(&self, index: usize) -> *mut u8 {
        // Safety: index < sub_buffers, so offset is within the allocation.
        unsafe { self.memory.as_ptr().add(index * self.sub_buffer_size) }
    }
}

/// A read handle to a lane's [`RingBuffer`].
///
/// Dropping the handle never releases the ring buffer itself.
#[derive(Debug, Clone)]
pub struct LaneReader(Arc<RingBuffer>);

impl io::Read for LaneReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.0.read(buf))
    }
}
