//! A memory map multiple channel threads write disjoint ranges of
//! concurrently, with no locking (spec §4.3/§5: "Destination does not
//! require exclusion between channel writers because the partition
//! property guarantees disjoint regions of the mmap").

use std::cell::UnsafeCell;
use std::io;

use memmap2::MmapMut;

/// Wraps a [`MmapMut`] so it can be shared by reference across threads.
///
/// `Sync` is sound here only because every caller of
/// [`SharedMmap::slice_mut`] is required to pass non-overlapping
/// `(offset, len)` ranges — the engine enforces that by construction
/// (each channel claims disjoint byte ranges via the per-file atomic
/// `next_offset` cursor in [`crate::source::TransferSource`], and the
/// destination trusts the matching header from the peer after bounds
/// validation).
pub struct SharedMmap {
    inner: UnsafeCell<MmapMut>,
}

// SAFETY: see the struct-level safety argument above.
unsafe impl Sync for SharedMmap {}
unsafe impl Send for SharedMmap {}

impl SharedMmap {
    /// Wraps an existing mapping.
    #[must_use]
    pub fn new(mmap: MmapMut) -> Self {
        Self {
            inner: UnsafeCell::new(mmap),
        }
    }

    /// Returns a mutable view of `[offset, offset+len)`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `offset + len <= mapped length` and that no
    /// other live call to `slice_mut` overlaps this range for the
    /// lifetime of the returned slice.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn slice_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        let base = (*self.inner.get()).as_mut_ptr();
        std::slice::from_raw_parts_mut(base.add(offset), len)
    }

    /// Length of the mapping in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        unsafe { (*self.inner.get()).len() }
    }

    /// Best-effort flush of dirty pages to the backing file.
    pub fn flush(&self) -> io::Result<()> {
        unsafe { (*self.inner.get()).flush() }
    }

    /// Advises the kernel this mapping will be accessed sequentially
    /// (Linux `MADV_SEQUENTIAL`). Best-effort: failures are logged, not
    /// propagated, per spec §4.3.
    pub fn advise_sequential(&self) {
        #[cfg(target_os = "linux")]
        {
            let mmap = unsafe { &*self.inner.get() };
            if let Err(err) = mmap.advise(memmap2::Advice::Sequential) {
                tracing::warn!(%err, "MADV_SEQUENTIAL failed, continuing without it");
            }
        }
    }
}
