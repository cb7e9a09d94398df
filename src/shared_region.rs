use std::alloc::{self, Layout};
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};

use thiserror::Error;

use crate::log_reader::PublishedRecords;
use crate::record_layout::HEADER_LENGTH;

/// Fixed-capacity, zero-initialized memory shared by log writers and readers.
///
/// The region owns a single heap allocation that never moves or grows. Writer
/// threads and readers hold it through an `Arc` (or a plain borrow) and touch
/// it only through atomic field views and byte copies into ranges they own,
/// which is what makes the `Send`/`Sync` implementations below sound.
///
/// The first usable byte is placed four bytes past an 8-byte boundary. Combined
/// with the 8-byte record stride this keeps the `u32` and `i64` header fields
/// naturally aligned (see [`crate::record_layout`]).
///
/// The region also owns the tail: the offset at which the next record will be
/// reserved. Every log attached to the region reserves through this one
/// cursor, so two logs over the same region never hand out the same range.
///
/// # Examples
///
/// ```
/// # use distinct_exception_log::SharedRegion;
/// let region = SharedRegion::new(64 * 1024).unwrap();
/// assert_eq!(region.capacity(), 64 * 1024);
/// ```
pub struct SharedRegion {
    allocation: NonNull<u8>,
    layout: Layout,
    capacity: usize,
    tail: AtomicUsize,
}

/// Padding in front of byte 0 of the region.
const REGION_LEAD: usize = 4;

/// Alignment of the underlying allocation.
const ALLOCATION_ALIGNMENT: usize = 8;

/// Largest supported capacity; offsets must fit the 32-bit length field math.
pub const MAX_CAPACITY: usize = i32::MAX as usize;

/// Errors raised while creating, saving or loading a region.
#[derive(Debug, Error)]
pub enum RegionError {
    #[error("invalid region capacity {capacity}: must be between {min} and {max} bytes")]
    InvalidCapacity { capacity: usize, min: usize, max: usize },

    #[error("region image I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

// SAFETY: all shared mutation goes through atomics or through byte ranges that
// a single writer has reserved and not yet published.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Allocates a zeroed region of `capacity` bytes.
    pub fn new(capacity: usize) -> Result<Self, RegionError> {
        let invalid = || RegionError::InvalidCapacity {
            capacity,
            min: HEADER_LENGTH,
            max: MAX_CAPACITY,
        };
        if !(HEADER_LENGTH..=MAX_CAPACITY).contains(&capacity) {
            return Err(invalid());
        }

        let layout = Layout::from_size_align(REGION_LEAD + capacity, ALLOCATION_ALIGNMENT)
            .map_err(|_| invalid())?;
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let allocation = match NonNull::new(raw) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };

        Ok(Self {
            allocation,
            layout,
            capacity,
            tail: AtomicUsize::new(0),
        })
    }

    /// Allocates a region holding a copy of `bytes`, e.g. a saved image.
    ///
    /// The tail is placed after the records already published in the image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RegionError> {
        let region = Self::new(bytes.len())?;
        // SAFETY: the region is fresh and not yet shared.
        unsafe { region.put_bytes(0, bytes) };
        let tail = PublishedRecords::new(&region).end_offset();
        region.tail.store(tail, Ordering::Release);
        Ok(region)
    }

    /// Number of usable bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Offset at which the next new record will be reserved.
    #[inline]
    pub fn tail(&self) -> usize {
        self.tail.load(Ordering::Acquire)
    }

    /// The reservation cursor shared by every log writing to this region.
    #[inline]
    pub(crate) fn tail_cursor(&self) -> &AtomicUsize {
        &self.tail
    }

    /// Atomic view of the `u32` field at `offset`.
    ///
    /// Panics if the field lies outside the region.
    #[inline]
    pub(crate) fn atomic_u32(&self, offset: usize) -> &AtomicU32 {
        assert!(offset + 4 <= self.capacity, "u32 field at {offset} out of bounds");
        let ptr = self.at(offset);
        debug_assert_eq!(ptr as usize % std::mem::align_of::<AtomicU32>(), 0);
        // SAFETY: in bounds, aligned, and the allocation outlives `&self`.
        unsafe { &*(ptr as *const AtomicU32) }
    }

    /// Atomic view of the `i64` field at `offset`.
    ///
    /// Panics if the field lies outside the region.
    #[inline]
    pub(crate) fn atomic_i64(&self, offset: usize) -> &AtomicI64 {
        assert!(offset + 8 <= self.capacity, "i64 field at {offset} out of bounds");
        let ptr = self.at(offset);
        debug_assert_eq!(ptr as usize % std::mem::align_of::<AtomicI64>(), 0);
        // SAFETY: in bounds, aligned, and the allocation outlives `&self`.
        unsafe { &*(ptr as *const AtomicI64) }
    }

    /// Copies `src` into the region at `offset`.
    ///
    /// # Safety
    ///
    /// The caller must own `offset..offset + src.len()` exclusively: the range
    /// was reserved by the caller and is not yet visible to any reader.
    #[inline]
    pub(crate) unsafe fn put_bytes(&self, offset: usize, src: &[u8]) {
        assert!(offset + src.len() <= self.capacity, "byte range at {offset} out of bounds");
        std::ptr::copy_nonoverlapping(src.as_ptr(), self.at(offset), src.len());
    }

    /// Borrows `len` bytes starting at `offset`.
    ///
    /// # Safety
    ///
    /// The range must no longer be written to, i.e. it belongs to a record
    /// whose publication has been observed with acquire ordering.
    #[inline]
    pub(crate) unsafe fn bytes(&self, offset: usize, len: usize) -> &[u8] {
        assert!(offset + len <= self.capacity, "byte range at {offset} out of bounds");
        std::slice::from_raw_parts(self.at(offset), len)
    }

    #[inline]
    fn at(&self, offset: usize) -> *mut u8 {
        // SAFETY: callers bounds-check `offset` against `capacity`.
        unsafe { self.allocation.as_ptr().add(REGION_LEAD + offset) }
    }
}

impl fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedRegion")
            .field("capacity", &self.capacity)
            .field("tail", &self.tail.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        unsafe {
            alloc::dealloc(self.allocation.as_ptr(), self.layout);
        }
    }
}
