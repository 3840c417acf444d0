//! Traits and definitions shared by the memseg support crates.
//!
//! # Modules
//!
//! - [`memory_owner`]: ownership of memory blocks that back segments

pub mod memory_owner;
