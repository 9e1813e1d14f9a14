//! `ReleasedBuffer`: storage handed off by [`ResizableBuffer::release`].
//!
//! A `ReleasedBuffer` is the sole owner of the memory it describes. Dropping it
//! frees the memory with the deallocator matching the way it was allocated.
//! To pass the memory to a foreign owner (for instance a garbage-collected host
//! that finalizes it later), split it with [`ReleasedBuffer::into_raw_parts`]
//! and rebuild it with [`ReleasedBuffer::from_raw_parts`] when the foreign
//! owner is done.
//!
//! [`ResizableBuffer::release`]: crate::ResizableBuffer::release

use std::{alloc::Layout, marker::PhantomData, mem, mem::ManuallyDrop, ptr::NonNull, sync::Arc};

use bytemuck::Pod;
use stagebuf_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};
use stagebuf_page_alloc::{
    alloc::{AllocStrategy, RawAllocation},
    page,
};

use crate::shared::SharedBlock;

/// Memory transferred out of a [`ResizableBuffer`](crate::ResizableBuffer),
/// together with the element and byte counts it had when released.
pub struct ReleasedBuffer<T: Pod> {
    storage: Option<RawAllocation>,
    len: usize,
    _marker: PhantomData<T>,
}

/// The raw description of released memory, for owners outside of Rust.
///
/// `ptr` is null (and the counts are zero) when an empty buffer was released.
/// Memory described by `RawParts` is leaked unless it is eventually passed to
/// [`ReleasedBuffer::from_raw_parts`] and dropped.
#[derive(Debug, PartialEq, Eq)]
pub struct RawParts<T> {
    pub ptr: *mut T,
    pub len: usize,
    pub byte_len: usize,
    pub alignment: usize,
}

impl<T: Pod> ReleasedBuffer<T> {
    pub(crate) fn new(storage: Option<RawAllocation>, len: usize) -> ReleasedBuffer<T> {
        debug_assert_eq!(storage.is_some(), len != 0);
        debug_assert!(
            storage
                .as_ref()
                .is_none_or(|a| a.size() == len * mem::size_of::<T>())
        );
        ReleasedBuffer {
            storage,
            len,
            _marker: PhantomData,
        }
    }

    /// Pointer to the first element, null if the released buffer was empty.
    #[inline]
    pub fn as_ptr(&self) -> *const T {
        self.storage
            .as_ref()
            .map_or(std::ptr::null(), |a| a.ptr().as_ptr() as *const T)
    }

    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.storage
            .as_ref()
            .map_or(std::ptr::null_mut(), |a| a.ptr().as_ptr() as *mut T)
    }

    /// Number of elements at the time of release.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of bytes at the time of release.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.len * mem::size_of::<T>()
    }

    /// The layout the memory was allocated with, `None` when empty.
    ///
    /// This is the layout to hand to `std::alloc::dealloc` if the memory is
    /// freed by hand instead of by dropping the `ReleasedBuffer`.
    #[inline]
    pub fn layout(&self) -> Option<Layout> {
        self.storage.as_ref().map(RawAllocation::layout)
    }

    #[inline]
    pub fn strategy(&self) -> Option<AllocStrategy> {
        self.storage.as_ref().map(RawAllocation::strategy)
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        match &self.storage {
            // SAFETY: `len` initialized, suitably aligned elements, exclusively owned.
            Some(a) => unsafe {
                std::slice::from_raw_parts(a.ptr().as_ptr() as *const T, self.len)
            },
            None => &[],
        }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        match &self.storage {
            Some(a) => unsafe {
                std::slice::from_raw_parts_mut(a.ptr().as_ptr() as *mut T, self.len)
            },
            None => &mut [],
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Gives up ownership without freeing, returning the raw description of
    /// the memory.
    pub fn into_raw_parts(self) -> RawParts<T> {
        let mut this = ManuallyDrop::new(self);
        let len = this.len;
        match this.storage.take() {
            Some(a) => RawParts {
                ptr: a.ptr().as_ptr() as *mut T,
                len,
                byte_len: a.size(),
                alignment: a.alignment(),
            },
            None => RawParts {
                ptr: std::ptr::null_mut(),
                len: 0,
                byte_len: 0,
                alignment: mem::align_of::<T>(),
            },
        }
    }

    /// Takes back ownership of memory given up by
    /// [`into_raw_parts`](Self::into_raw_parts).
    ///
    /// # Safety
    ///
    /// `parts` must be the unmodified result of a call to `into_raw_parts` on a
    /// `ReleasedBuffer<T>`, and must not have been reclaimed or freed since.
    pub unsafe fn from_raw_parts(parts: RawParts<T>) -> ReleasedBuffer<T> {
        let RawParts {
            ptr,
            len,
            byte_len,
            alignment,
        } = parts;
        let storage = NonNull::new(ptr as *mut u8).map(|ptr| {
            debug_assert_eq!(byte_len, len * mem::size_of::<T>());
            // SAFETY: forwarded from the caller's contract.
            unsafe {
                RawAllocation::from_raw_parts(ptr, byte_len, alignment, page::get_page_size())
            }
        });
        let len = if storage.is_some() { len } else { 0 };
        ReleasedBuffer::new(storage, len)
    }

    /// Moves the memory into a shared, immutable block without copying.
    pub fn into_shared(self) -> SharedBlock
    where
        T: Send + Sync,
    {
        SharedBlock::from_owner(Arc::new(self))
    }
}

impl<T: Pod> Drop for ReleasedBuffer<T> {
    fn drop(&mut self) {
        if let Some(alloc) = self.storage.take() {
            // SAFETY: exclusively owned block produced by `allocate_zeroed`.
            unsafe { alloc.deallocate() };
        }
    }
}

impl<T: Pod> std::fmt::Debug for ReleasedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleasedBuffer")
            .field("ptr", &self.as_ptr())
            .field("len", &self.len)
            .field("byte_len", &self.byte_len())
            .finish()
    }
}

unsafe impl<T: Pod> MemoryOwner for ReleasedBuffer<T> {
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
