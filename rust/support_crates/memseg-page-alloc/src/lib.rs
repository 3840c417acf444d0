//! Page-granular native memory for memseg arenas: anonymous page buffers and
//! file mappings, with a portable `std::alloc` fallback where `mmap` is not
//! available.

pub mod mapped;
pub mod page_buffer;

#[cfg_attr(unix, path = "mmap_unix.rs")]
#[cfg_attr(not(unix), path = "mmap_fallback.rs")]
pub mod mmap;
