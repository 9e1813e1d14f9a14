//! `MemoryOwner`: A trait for types that own a raw memory block.

/// A trait for types that exclusively own a raw memory block.
///
/// # Safety
///
/// Implementors must guarantee that:
/// - The memory returned by `memory()` remains valid and is not reallocated
///   for as long as the owner is alive and not mutably borrowed.
/// - Memory is exclusively owned by the `MemoryOwner` instance,
///   with no shared ownership or cloning of the underlying block.
/// - `ptr` is aligned to the reported `alignment`.
/// - The reported length and capacity are accurate, and `len <= capacity`.
/// - A zero-length block may report a null `ptr`.
pub unsafe trait MemoryOwner {
    /// Returns information about the owned memory block.
    fn memory(&self) -> MemoryAllocation;
}

/// Represents a block of allocated memory with its size information.
#[derive(Debug, Clone)]
pub struct MemoryAllocation {
    /// Pointer to the start of the allocated memory.
    pub ptr: *const u8,
    /// Current length of the allocated memory in bytes.
    pub len: usize,
    /// Total capacity of the allocated memory in bytes.
    pub capacity: usize,
    /// Formal alignment of the memory block.
    pub alignment: usize,
}

impl MemoryAllocation {
    /// An allocation descriptor for an owner that holds no memory.
    pub const fn empty() -> MemoryAllocation {
        MemoryAllocation {
            ptr: std::ptr::null(),
            len: 0,
            capacity: 0,
            alignment: 1,
        }
    }

    /// Returns `true` if the described block holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
