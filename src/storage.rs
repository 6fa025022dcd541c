//! Definition of the memory that backs a lane's sub-buffers.

use memmap2::{MmapMut, MmapOptions};
use std::io;
use std::ptr::NonNull;

/// Off heap memory that backs a [`RingBuffer`](crate::RingBuffer).
///
/// The mapping is only ever accessed through the raw base pointer, so that
/// the producer and the consumer can touch disjoint regions of it at the same
/// time without creating overlapping references.
#[derive(Debug)]
pub(crate) struct OffHeap {
    // Never read after construction, but owns the mapping.
    _mmap: MmapMut,
    base: NonNull<u8>,
    len: usize,
}

// Safety: The mapping is uniquely owned and only reachable through `base`.
// Callers of `as_ptr` uphold that concurrent accesses are to disjoint ranges.
unsafe impl Send for OffHeap {}
unsafe impl Sync for OffHeap {}

impl OffHeap {
    /// Allocate some number of bytes off heap.
    ///
    /// * Frees memory using RAII pattern, so no method to deallocate memory.
    /// * If successful memory is guaranteed to be page aligned.
    /// * Returns an I/O error if the memory could not be mapped.
    ///
    /// # Arguments
    ///
    /// * `len` - Number of bytes to allocate, must be > 0.
    pub(crate) fn try_alloc(len: usize) -> io::Result<Self> {
        let mut mmap = MmapOptions::new()
            .len(len)
            // Fault all pages so that appends never page fault.
            .populate()
            // Map with anonymous memory map for off-heap memory.
            .map_anon()?;

        let base = NonNull::new(mmap.as_mut_ptr())
            .ok_or_else(|| io::Error::other("anonymous mmap returned a null pointer"))?;

        Ok(Self {
            _mmap: mmap,
            base,
            len,
        })
    }

    /// Number of bytes in this allocation.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Base pointer of this allocation.
    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }
}
