use std::sync::Arc;

use stagebuf_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};

use crate::{ResizableBuffer, align::is_aligned_ptr};

/// `SharedBlock` is an immutable byte block with shared ownership semantics.
///
/// It provides a view into memory owned by a [`MemoryOwner`], keeping that
/// memory alive through reference counting. Clones share the same memory; no
/// bytes are ever copied. This is the form in which staged data is handed to
/// consumers that outlive the staging buffer.
#[derive(Clone)]
pub struct SharedBlock {
    ptr: *const u8,
    len: usize,
    alignment: usize,
    owner: Arc<dyn MemoryOwner + Send + Sync + 'static>,
}

unsafe impl Send for SharedBlock {}

unsafe impl Sync for SharedBlock {}

impl SharedBlock {
    /// Creates an empty block.
    pub fn new() -> SharedBlock {
        Self::from_owner(Arc::new(ResizableBuffer::<u8>::new()))
    }

    /// Creates a block over the memory of any `MemoryOwner`.
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - The reported alignment is not a power of two
    /// - The memory is not aligned to the reported alignment
    /// - The capacity is less than the length
    /// - The pointer is null while the length is non-zero
    pub fn from_owner(owner: Arc<dyn MemoryOwner + Send + Sync + 'static>) -> SharedBlock {
        let MemoryAllocation {
            ptr,
            len,
            capacity,
            alignment,
        } = owner.memory();
        assert!(alignment.is_power_of_two());
        assert!(capacity >= len);
        assert!(!ptr.is_null() || len == 0);
        assert!(ptr.is_null() || is_aligned_ptr(ptr, alignment));
        SharedBlock {
            ptr,
            len,
            alignment,
            owner,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer to the first byte, null for an empty block.
    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Alignment guaranteed by the owner of the memory.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    /// Checks if the block starts at an address aligned to `alignment`.
    ///
    /// An empty block is considered aligned.
    pub fn is_aligned(&self, alignment: usize) -> bool {
        self.ptr.is_null() || is_aligned_ptr(self.ptr, alignment)
    }

    /// Returns a slice of `T` values from the block.
    ///
    /// # Panics
    ///
    /// Panics if the block is not aligned for `T` or its length is not a
    /// multiple of `size_of::<T>()`.
    #[inline]
    pub fn typed_data<T>(&self) -> &[T]
    where
        T: bytemuck::AnyBitPattern,
    {
        bytemuck::cast_slice(self.as_slice())
    }

    /// Consumes the block and returns the underlying memory owner.
    pub fn into_owner(self) -> Arc<dyn MemoryOwner + Send + Sync + 'static> {
        self.owner
    }
}

impl std::ops::Deref for SharedBlock {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl AsRef<[u8]> for SharedBlock {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl std::fmt::Debug for SharedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBlock")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}

impl Default for SharedBlock {
    fn default() -> Self {
        SharedBlock::new()
    }
}

impl<T> From<ResizableBuffer<T>> for SharedBlock
where
    T: bytemuck::Pod + Send + Sync,
{
    /// Moves the buffer's storage into a shared block without copying.
    fn from(mut buf: ResizableBuffer<T>) -> SharedBlock {
        buf.release().into_shared()
    }
}
