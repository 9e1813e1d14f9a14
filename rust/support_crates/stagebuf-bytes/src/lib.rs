//! Staging buffers for data that is built in place and then handed off without
//! copying.
//!
//! [`ResizableBuffer`] owns a zero-initialized block of plain-data elements
//! that is page-aligned once it spans a page. Its storage can be transferred
//! out as a [`ReleasedBuffer`], which either frees the memory when dropped,
//! passes it to a foreign owner as [`RawParts`], or becomes a reference-counted
//! [`SharedBlock`].

pub mod align;
pub mod released;
pub mod resizable;
pub mod shared;

pub use released::{RawParts, ReleasedBuffer};
pub use resizable::ResizableBuffer;
pub use shared::SharedBlock;
pub use stagebuf_page_alloc::alloc::AllocStrategy;
