//! Page-size discovery and the raw allocation strategies used by stagebuf
//! buffers.

pub mod alloc;

#[cfg_attr(unix, path = "page_unix.rs")]
#[cfg_attr(windows, path = "page_win.rs")]
#[cfg_attr(not(any(unix, windows)), path = "page_fallback.rs")]
pub mod page;
