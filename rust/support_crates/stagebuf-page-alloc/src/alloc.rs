//! Raw zero-filled allocations with a size-driven alignment strategy.
//!
//! Requests of at least one page are served page-aligned; smaller requests use
//! a plain aligned allocation. The strategy is recorded alongside the
//! [`Layout`] in [`RawAllocation`], and [`RawAllocation::deallocate`] is the
//! only way memory produced here is returned to the allocator, so the two
//! paths can never be freed with the wrong layout.

use std::{alloc::Layout, ptr::NonNull};

/// Minimum alignment of allocations served by [`AllocStrategy::Simple`].
pub const MIN_ALIGNMENT: usize = 16;

/// How a block of a given size is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocStrategy {
    /// Plain aligned allocation, used below one page.
    Simple,
    /// Allocation aligned to the page size, used from one page upwards.
    PageAligned,
}

impl AllocStrategy {
    /// Selects the strategy for a block of `byte_len` bytes.
    #[inline]
    pub fn select(byte_len: usize, page_size: usize) -> AllocStrategy {
        if byte_len >= page_size {
            AllocStrategy::PageAligned
        } else {
            AllocStrategy::Simple
        }
    }

    /// Alignment used by this strategy for elements requiring `min_align`.
    #[inline]
    pub fn alignment(self, min_align: usize, page_size: usize) -> usize {
        match self {
            AllocStrategy::Simple => min_align.max(MIN_ALIGNMENT),
            AllocStrategy::PageAligned => page_size.max(min_align),
        }
    }
}

/// A zero-filled block obtained from [`allocate_zeroed`].
///
/// `RawAllocation` does not free its memory on drop: it is a record of what
/// must be passed back to [`RawAllocation::deallocate`]. Owners wrap it and
/// decide when (and whether) that happens.
#[derive(Debug)]
pub struct RawAllocation {
    ptr: NonNull<u8>,
    layout: Layout,
    strategy: AllocStrategy,
}

impl RawAllocation {
    /// Pointer to the first byte of the block.
    #[inline]
    pub fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    /// The layout the block was allocated with.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Size of the block in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Alignment of the block in bytes.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }

    #[inline]
    pub fn strategy(&self) -> AllocStrategy {
        self.strategy
    }

    /// Rebuilds the allocation record for a block previously produced by
    /// [`allocate_zeroed`] and described by `ptr`, `size` and `alignment`.
    ///
    /// # Safety
    ///
    /// `ptr`, `size` and `alignment` must be exactly the values of a live
    /// `RawAllocation` that was given up (for example through
    /// `std::mem::forget`) and has not been deallocated since.
    pub unsafe fn from_raw_parts(
        ptr: NonNull<u8>,
        size: usize,
        alignment: usize,
        page_size: usize,
    ) -> RawAllocation {
        // SAFETY: the values come from a layout that was valid at allocation time.
        let layout = unsafe { Layout::from_size_align_unchecked(size, alignment) };
        RawAllocation {
            ptr,
            layout,
            strategy: AllocStrategy::select(size, page_size),
        }
    }

    /// Returns the block to the allocator.
    ///
    /// # Safety
    ///
    /// No pointer into the block may be used after this call, and no other
    /// record of the same block may be deallocated.
    pub unsafe fn deallocate(self) {
        log::trace!(
            "deallocate {:?}: {} bytes, {:?}",
            self.ptr,
            self.layout.size(),
            self.strategy
        );
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: RawAllocation is a plain record of an exclusively owned block.
unsafe impl Send for RawAllocation {}
unsafe impl Sync for RawAllocation {}

/// Allocates a zero-filled block of `size` bytes.
///
/// The block is page-aligned when `size >= page_size` and aligned to
/// `max(min_align, MIN_ALIGNMENT)` otherwise.
///
/// # Errors
///
/// - `InvalidInput` if `size` is zero, `min_align` or `page_size` is not a power
///   of two, or the size overflows when rounded up to the alignment.
/// - `OutOfMemory` if the allocator returns null.
pub fn allocate_zeroed(
    size: usize,
    min_align: usize,
    page_size: usize,
) -> std::io::Result<RawAllocation> {
    if size == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "zero-sized allocation",
        ));
    }
    if !page_size.is_power_of_two() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "page size is not a power of two",
        ));
    }

    let strategy = AllocStrategy::select(size, page_size);
    let alignment = strategy.alignment(min_align, page_size);
    let layout = Layout::from_size_align(size, alignment)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))?;

    let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
    let Some(ptr) = NonNull::new(ptr) else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "Failed to allocate memory",
        ));
    };
    log::trace!("allocate {ptr:?}: {size} bytes, align {alignment}, {strategy:?}");

    Ok(RawAllocation {
        ptr,
        layout,
        strategy,
    })
}
