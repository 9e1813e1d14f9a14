//! Traits and definitions shared by the stagebuf support crates.
//!
//! # Modules
//!
//! - [`memory_owner`]: Traits for types that exclusively own a raw memory block
//!   and can describe it to a zero-copy consumer

pub mod memory_owner;
