//! `ResizableBuffer`: an owned, page-aware staging buffer of plain-data elements.

use std::{marker::PhantomData, mem};

use bytemuck::Pod;
use stagebuf_common::{Result, error::Error};
use stagebuf_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};
use stagebuf_page_alloc::{
    alloc::{AllocStrategy, RawAllocation, allocate_zeroed},
    page,
};

use crate::released::ReleasedBuffer;

/// A resizable block of `T` elements backed by a single raw allocation.
///
/// The buffer is either empty (no storage, `len() == 0`) or holds exactly
/// `len()` zero-initialized elements. Resizing never preserves contents: it
/// discards the old block and allocates a fresh zero-filled one. Blocks of at
/// least one page are page-aligned, smaller ones use a plain aligned
/// allocation (see [`AllocStrategy`]).
///
/// The storage can be handed off without copying through
/// [`release`](Self::release), after which the buffer is empty again and may be
/// reused.
///
/// `T` must be [`Pod`]: elements are zero-filled and freed as raw memory, and
/// never dropped individually. Zero-sized element types are rejected at
/// compile time.
pub struct ResizableBuffer<T: Pod> {
    storage: Option<RawAllocation>,
    len: usize,
    /// Page size, cached at construction.
    page_size: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> ResizableBuffer<T> {
    /// Creates an empty buffer. Does not allocate.
    pub fn new() -> ResizableBuffer<T> {
        const {
            assert!(
                mem::size_of::<T>() != 0,
                "zero-sized element types are not supported"
            )
        };
        ResizableBuffer {
            storage: None,
            len: 0,
            page_size: page::get_page_size(),
            _marker: PhantomData,
        }
    }

    /// Creates a buffer holding `len` zeroed elements.
    pub fn with_len(len: usize) -> Result<ResizableBuffer<T>> {
        let mut buf = ResizableBuffer::new();
        buf.resize(len)?;
        Ok(buf)
    }

    /// Reallocates the buffer to hold exactly `new_len` zeroed elements.
    ///
    /// Does nothing when `new_len` equals the current length. Otherwise the
    /// current storage is freed, and for a non-zero `new_len` a fresh block is
    /// allocated and zero-filled; previous contents are not carried over.
    ///
    /// # Errors
    ///
    /// - `CapacityOverflow` if `new_len * size_of::<T>()` does not fit in a
    ///   valid allocation size.
    /// - `AllocationFailed` if the allocator cannot satisfy the request.
    ///
    /// On error the buffer is left empty.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len == self.len {
            return Ok(());
        }

        self.free_storage();
        if new_len == 0 {
            return Ok(());
        }

        let element_size = mem::size_of::<T>();
        let byte_len = new_len
            .checked_mul(element_size)
            .ok_or_else(|| Error::capacity_overflow(new_len, element_size))?;

        let alloc = allocate_zeroed(byte_len, mem::align_of::<T>(), self.page_size).map_err(
            |e| match e.kind() {
                std::io::ErrorKind::InvalidInput => Error::capacity_overflow(new_len, element_size),
                std::io::ErrorKind::OutOfMemory => Error::allocation_failed(
                    byte_len,
                    AllocStrategy::select(byte_len, self.page_size)
                        .alignment(mem::align_of::<T>(), self.page_size),
                ),
                _ => Error::io("allocate", e),
            },
        )?;

        self.storage = Some(alloc);
        self.len = new_len;
        Ok(())
    }

    /// Frees the storage and leaves the buffer empty.
    pub fn clear(&mut self) {
        self.free_storage();
    }

    /// Number of elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the buffer in bytes, always `len() * size_of::<T>()`.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.len * mem::size_of::<T>()
    }

    /// The page size this buffer uses as its page-alignment threshold.
    #[inline]
    pub fn alignment_unit(&self) -> usize {
        self.page_size
    }

    /// Allocation strategy of the current storage, `None` when empty.
    #[inline]
    pub fn strategy(&self) -> Option<AllocStrategy> {
        self.storage.as_ref().map(RawAllocation::strategy)
    }

    /// Alignment of the current storage in bytes, `None` when empty.
    #[inline]
    pub fn alignment(&self) -> Option<usize> {
        self.storage.as_ref().map(RawAllocation::alignment)
    }

    /// Returns a raw pointer to the first element, or null when empty.
    ///
    /// The pointer is valid for `len()` elements until the next `resize`,
    /// `clear` or `release`, or until the buffer is dropped.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.as_byte_ptr() as *const T
    }

    /// Returns a raw mutable pointer to the first element, or null when empty.
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.as_mut_byte_ptr() as *mut T
    }

    /// Same address as [`as_ptr`](Self::as_ptr), typed as bytes.
    #[inline]
    pub fn as_byte_ptr(&self) -> *const u8 {
        self.storage
            .as_ref()
            .map_or(std::ptr::null(), |a| a.ptr().as_ptr() as *const u8)
    }

    #[inline]
    pub fn as_mut_byte_ptr(&mut self) -> *mut u8 {
        self.storage
            .as_ref()
            .map_or(std::ptr::null_mut(), |a| a.ptr().as_ptr())
    }

    /// Returns the elements as a slice. Empty when the buffer is empty.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            // SAFETY: the block holds `len` initialized elements and is aligned
            // to at least `align_of::<T>()`.
            Some(a) => unsafe {
                std::slice::from_raw_parts(a.ptr().as_ptr() as *const T, self.len)
            },
            None => &[],
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &self.storage {
            // SAFETY: as in `as_slice`, and `&mut self` guarantees exclusivity.
            Some(a) => unsafe {
                std::slice::from_raw_parts_mut(a.ptr().as_ptr() as *mut T, self.len)
            },
            None => &mut [],
        }
    }

    /// The storage viewed as unsigned bytes. Aliases the typed view.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(self.as_mut_slice())
    }

    /// The storage viewed as signed bytes. Aliases the typed view.
    #[inline]
    pub fn as_signed_bytes(&self) -> &[i8] {
        bytemuck::cast_slice(self.as_slice())
    }

    #[inline]
    pub fn as_signed_bytes_mut(&mut self) -> &mut [i8] {
        bytemuck::cast_slice_mut(self.as_mut_slice())
    }

    /// Transfers ownership of the storage to the caller.
    ///
    /// The returned [`ReleasedBuffer`] reports the pointer, element count and
    /// byte count the buffer had at the time of the call, and is responsible
    /// for freeing the memory. The buffer itself becomes empty and can be
    /// resized again; releasing an empty buffer yields an empty bundle.
    pub fn release(&mut self) -> ReleasedBuffer<T> {
        let len = self.len;
        let storage = self.storage.take();
        self.len = 0;
        if let Some(a) = &storage {
            log::debug!(
                "release {:?}: {} elements, {} bytes, {:?}",
                a.ptr(),
                len,
                a.size(),
                a.strategy()
            );
        }
        ReleasedBuffer::new(storage, len)
    }

    fn free_storage(&mut self) {
        if let Some(alloc) = self.storage.take() {
            // SAFETY: the block was produced by `allocate_zeroed` and is
            // exclusively owned by this buffer; no borrow of it can outlive
            // the `&mut self` that led here.
            unsafe { alloc.deallocate() };
        }
        self.len = 0;
    }
}

impl<T: Pod> Default for ResizableBuffer<T> {
    fn default() -> Self {
        ResizableBuffer::new()
    }
}

impl<T: Pod> Drop for ResizableBuffer<T> {
    fn drop(&mut self) {
        self.free_storage();
    }
}

impl<T: Pod> std::ops::Deref for ResizableBuffer<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T: Pod> std::ops::DerefMut for ResizableBuffer<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T: Pod> std::fmt::Debug for ResizableBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResizableBuffer")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .field("byte_len", &self.byte_len())
            .field("strategy", &self.strategy())
            .finish()
    }
}

unsafe impl<T: Pod> MemoryOwner for ResizableBuffer<T> {
    fn memory(&self) -> MemoryAllocation {
        match &self.storage {
            Some(a) => MemoryAllocation {
                ptr: a.ptr().as_ptr(),
                len: self.byte_len(),
                capacity: a.size(),
                alignment: a.alignment(),
            },
            None => MemoryAllocation::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::is_aligned_ptr;
    use stagebuf_common::error::ErrorKind;

    #[test]
    fn test_new_is_empty() {
        let buf = ResizableBuffer::<u32>::new();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.byte_len(), 0);
        assert!(buf.is_empty());
        assert!(buf.as_ptr().is_null());
        assert!(buf.as_bytes().is_empty());
        assert_eq!(buf.strategy(), None);
        assert_eq!(buf.alignment_unit(), page::get_page_size());
    }

    #[test]
    fn test_with_len() {
        let buf = ResizableBuffer::<u32>::with_len(10).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.byte_len(), 40);
        assert!(!buf.as_ptr().is_null());
        assert!(buf.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_with_len_zero() {
        let buf = ResizableBuffer::<u64>::with_len(0).unwrap();
        assert!(buf.is_empty());
        assert!(buf.as_ptr().is_null());
    }

    #[test]
    fn test_resize_lengths() {
        let mut buf = ResizableBuffer::<u16>::new();
        for n in [0, 1, 7, 100, 4096, 3, 0, 5000, 0] {
            buf.resize(n).unwrap();
            assert_eq!(buf.len(), n);
            assert_eq!(buf.byte_len(), n * 2);
            assert_eq!(buf.as_slice().len(), n);
            assert_eq!(buf.as_bytes().len(), n * 2);
            assert_eq!(buf.as_ptr().is_null(), n == 0);
        }
    }

    #[test]
    fn test_resize_zero_fills() {
        let mut buf = ResizableBuffer::<u64>::with_len(64).unwrap();
        buf.as_bytes_mut().fill(0xFF);
        buf.resize(32).unwrap();
        assert!(buf.as_bytes().iter().all(|&b| b == 0));
        buf.as_bytes_mut().fill(0xFF);
        buf.resize(2048).unwrap();
        assert!(buf.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_resize_same_len_is_noop() {
        let mut buf = ResizableBuffer::<u32>::with_len(16).unwrap();
        buf[3] = 42;
        let ptr = buf.as_ptr();
        buf.resize(16).unwrap();
        buf.resize(16).unwrap();
        assert_eq!(buf.as_ptr(), ptr);
        assert_eq!(buf[3], 42);
    }

    #[test]
    fn test_resize_to_zero() {
        let mut buf = ResizableBuffer::<u32>::with_len(100).unwrap();
        buf.resize(0).unwrap();
        assert!(buf.as_ptr().is_null());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.byte_len(), 0);
        // Empty -> empty stays a no-op.
        buf.resize(0).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut buf = ResizableBuffer::<u8>::with_len(10).unwrap();
        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.as_ptr().is_null());
    }

    #[test]
    fn test_strategy_threshold() {
        let page_size = page::get_page_size();
        let mut buf = ResizableBuffer::<u8>::with_len(page_size - 1).unwrap();
        assert_eq!(buf.strategy(), Some(AllocStrategy::Simple));
        buf.resize(page_size).unwrap();
        assert_eq!(buf.strategy(), Some(AllocStrategy::PageAligned));
        assert!(is_aligned_ptr(buf.as_ptr(), page_size));
        assert_eq!(buf.alignment(), Some(page_size));
    }

    #[test]
    fn test_page_alignment_for_large_buffers() {
        let page_size = page::get_page_size();
        let mut buf = ResizableBuffer::<u32>::new();
        for n in [page_size / 4, page_size, page_size * 3 + 5] {
            buf.resize(n).unwrap();
            assert!(buf.byte_len() >= page_size);
            assert!(is_aligned_ptr(buf.as_ptr(), page_size));
        }
    }

    #[test]
    fn test_small_buffers_element_aligned() {
        let mut buf = ResizableBuffer::<u64>::new();
        for n in 1..64 {
            buf.resize(n).unwrap();
            assert!(is_aligned_ptr(buf.as_ptr(), mem::align_of::<u64>()));
            assert!(is_aligned_ptr(buf.as_ptr(), 16));
        }
    }

    #[test]
    fn test_byte_views_alias_typed_view() {
        let mut buf = ResizableBuffer::<u32>::with_len(4).unwrap();
        buf[1] = 0x0403_0201;
        assert_eq!(&buf.as_bytes()[4..8], &0x0403_0201u32.to_ne_bytes());
        assert_eq!(buf.as_byte_ptr(), buf.as_ptr() as *const u8);

        buf.as_bytes_mut()[0..4].copy_from_slice(&7u32.to_ne_bytes());
        assert_eq!(buf[0], 7);

        buf.as_signed_bytes_mut()[12..16].copy_from_slice(&[-1, -1, -1, -1]);
        assert_eq!(buf[3], u32::MAX);
        assert_eq!(buf.as_signed_bytes()[12], -1);
        assert_eq!(buf.as_bytes()[12], 0xFF);
    }

    #[test]
    fn test_release() {
        let mut buf = ResizableBuffer::<u32>::with_len(10).unwrap();
        for (i, v) in buf.iter_mut().enumerate() {
            *v = i as u32 * 3;
        }
        let ptr = buf.as_ptr();

        let released = buf.release();
        assert_eq!(released.as_ptr(), ptr);
        assert_eq!(released.len(), 10);
        assert_eq!(released.byte_len(), 40);
        assert_eq!(
            released.as_slice(),
            &[0, 3, 6, 9, 12, 15, 18, 21, 24, 27]
        );

        assert_eq!(buf.len(), 0);
        assert_eq!(buf.byte_len(), 0);
        assert!(buf.as_ptr().is_null());
        assert!(buf.as_slice().is_empty());
    }

    #[test]
    fn test_release_empty() {
        let mut buf = ResizableBuffer::<u32>::new();
        let released = buf.release();
        assert!(released.as_ptr().is_null());
        assert_eq!(released.len(), 0);
        assert_eq!(released.byte_len(), 0);
    }

    #[test]
    fn test_reuse_after_release() {
        let mut buf = ResizableBuffer::<u8>::with_len(8).unwrap();
        buf.fill(9);
        let released = buf.release();

        buf.resize(8).unwrap();
        assert_ne!(buf.as_ptr(), released.as_ptr());
        assert!(buf.iter().all(|&b| b == 0));
        assert!(released.as_slice().iter().all(|&b| b == 9));
    }

    #[test]
    fn test_end_to_end() {
        let page_size = page::get_page_size();

        let mut buf = ResizableBuffer::<u32>::with_len(10).unwrap();
        assert!(!buf.as_ptr().is_null());
        assert_eq!(buf.byte_len(), 40);
        assert!(buf.as_bytes().iter().all(|&b| b == 0));
        assert_eq!(buf.strategy(), Some(AllocStrategy::Simple));

        // 2000 x 4 bytes spans more than one page with 4 KiB pages.
        let n = if page_size <= 8000 { 2000 } else { 2 * page_size / 4 };
        buf.resize(n).unwrap();
        assert_eq!(buf.byte_len(), n * 4);
        assert_eq!(buf.strategy(), Some(AllocStrategy::PageAligned));
        assert!(is_aligned_ptr(buf.as_ptr(), page_size));
        assert!(buf.as_bytes().iter().all(|&b| b == 0));

        let released = buf.release();
        assert!(!released.as_ptr().is_null());
        assert_eq!(released.len(), n);
        assert_eq!(released.byte_len(), n * 4);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn test_capacity_overflow() {
        let mut buf = ResizableBuffer::<u32>::new();
        let e = buf.resize(usize::MAX).unwrap_err();
        assert!(matches!(e.kind(), ErrorKind::CapacityOverflow { .. }));
        assert!(buf.is_empty());

        // Fits in usize but not in a valid layout.
        let e = buf.resize(usize::MAX / 4).unwrap_err();
        assert!(matches!(e.kind(), ErrorKind::CapacityOverflow { .. }));
        assert!(buf.is_empty());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_allocation_failure_leaves_buffer_empty() {
        let mut buf = ResizableBuffer::<u8>::with_len(100).unwrap();
        let e = buf.resize(1 << 62).unwrap_err();
        assert!(e.is_allocation_failure());
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.byte_len(), 0);
        assert!(buf.as_ptr().is_null());

        buf.resize(100).unwrap();
        assert_eq!(buf.len(), 100);
    }

    #[test]
    fn test_memory_owner() {
        let buf = ResizableBuffer::<u16>::with_len(5).unwrap();
        let mem = buf.memory();
        assert_eq!(mem.ptr, buf.as_byte_ptr());
        assert_eq!(mem.len, 10);
        assert_eq!(mem.capacity, 10);
        assert!(mem.alignment >= 16);

        let empty = ResizableBuffer::<u16>::new();
        assert!(empty.memory().ptr.is_null());
        assert!(empty.memory().is_empty());
    }

    #[test]
    fn test_random_resize_sequence() {
        let page_size = page::get_page_size();
        let mut rng = fastrand::Rng::with_seed(42);
        let mut buf = ResizableBuffer::<u32>::new();
        for _ in 0..300 {
            let n = if rng.u8(..) < 16 { 0 } else { rng.usize(..page_size) };
            let prev_ptr = buf.as_ptr();
            let prev_len = buf.len();
            buf.resize(n).unwrap();
            assert_eq!(buf.len(), n);
            assert_eq!(buf.byte_len(), n * 4);
            if n == prev_len {
                assert_eq!(buf.as_ptr(), prev_ptr);
            } else {
                assert!(buf.as_bytes().iter().all(|&b| b == 0));
            }
            if buf.byte_len() >= page_size {
                assert!(is_aligned_ptr(buf.as_ptr(), page_size));
            }
            if let Some(v) = buf.first_mut() {
                *v = 0xDEAD_BEEF;
            }
        }
    }

    #[test]
    fn test_debug_format() {
        let buf = ResizableBuffer::<u8>::with_len(3).unwrap();
        let s = format!("{buf:?}");
        assert!(s.contains("ResizableBuffer"));
        assert!(s.contains("byte_len: 3"));
        assert!(s.contains("Simple"));
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ResizableBuffer<u32>>();
    }
}
