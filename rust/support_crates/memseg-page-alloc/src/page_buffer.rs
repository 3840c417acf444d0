//! Page-aligned anonymous memory used for large arena allocations.
//!
//! Small allocations go through the global allocator; past a configurable
//! threshold an arena asks for whole pages instead, which are zeroed by the
//! operating system and returned to it as soon as the owning scope ends.

use memseg_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};

use crate::mmap;

/// A block of whole, zero-initialized memory pages.
pub struct PageBuffer {
    ptr: *mut u8,
    /// The requested size in bytes.
    len: usize,
    /// The mapped size, a multiple of the page size.
    capacity: usize,
}

impl PageBuffer {
    /// Returns the size of a memory page on the current system.
    pub fn page_size() -> usize {
        mmap::get_page_size()
    }

    /// Allocates at least `size` bytes of zeroed, page-aligned memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the system cannot provide the pages.
    pub fn allocate(size: usize) -> std::io::Result<PageBuffer> {
        let (ptr, capacity) = mmap::allocate(size)?;
        debug_assert!((ptr as usize).is_multiple_of(Self::page_size()));
        Ok(PageBuffer {
            ptr: ptr as *mut u8,
            len: size,
            capacity,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Raw pointer to the first byte; valid until the buffer is dropped.
    #[inline]
    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }
}

unsafe impl MemoryOwner for PageBuffer {
    fn memory(&self) -> MemoryAllocation {
        MemoryAllocation {
            ptr: self.ptr,
            len: self.len,
            capacity: self.capacity,
            alignment: Self::page_size(),
        }
    }

    fn describe(&self) -> &'static str {
        "pages"
    }
}

impl Drop for PageBuffer {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            let _ = unsafe { mmap::free(self.ptr as _, self.capacity) };
        }
    }
}

// SAFETY: the buffer exclusively owns its pages and releases them on drop;
// synchronizing access to the contents is up to the segments viewing it.
unsafe impl Send for PageBuffer {}

// SAFETY: see `Send`.
unsafe impl Sync for PageBuffer {}

impl std::fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .finish()
    }
}
