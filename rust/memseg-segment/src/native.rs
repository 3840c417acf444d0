//! Memory blocks owned by scopes: global-allocator blocks for arena
//! allocations and pinned vectors backing heap segments.

use std::alloc::Layout;
use std::ptr::NonNull;

use memseg_common::{Result, error::Error};
use memseg_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};

/// A block from the global allocator.
pub(crate) struct NativeBlock {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

impl NativeBlock {
    /// Allocates `size` bytes aligned to `align`. A zero-size request still
    /// gets a distinct, suitably aligned address.
    pub fn allocate(size: u64, align: u64, zeroed: bool) -> Result<NativeBlock> {
        let len = usize::try_from(size)
            .map_err(|_| Error::invalid_arg("byte_size", "exceeds the address space"))?;
        let align = usize::try_from(align)
            .map_err(|_| Error::invalid_arg("byte_alignment", "exceeds the address space"))?;
        let layout = Layout::from_size_align(len.max(1), align)
            .map_err(|e| Error::invalid_arg("byte_size", e.to_string()))?;
        let ptr = unsafe {
            if zeroed {
                std::alloc::alloc_zeroed(layout)
            } else {
                std::alloc::alloc(layout)
            }
        };
        let ptr = NonNull::new(ptr).ok_or_else(|| {
            Error::io(
                format!("allocate {len} bytes"),
                std::io::Error::from(std::io::ErrorKind::OutOfMemory),
            )
        })?;
        Ok(NativeBlock { ptr, len, layout })
    }
}

unsafe impl MemoryOwner for NativeBlock {
    fn memory(&self) -> MemoryAllocation {
        MemoryAllocation {
            ptr: self.ptr.as_ptr(),
            len: self.len,
            capacity: self.layout.size(),
            alignment: self.layout.align(),
        }
    }

    fn describe(&self) -> &'static str {
        "native"
    }
}

impl Drop for NativeBlock {
    fn drop(&mut self) {
        unsafe { std::alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: the block exclusively owns its allocation and frees it on drop.
unsafe impl Send for NativeBlock {}

// SAFETY: see `Send`.
unsafe impl Sync for NativeBlock {}

/// The storage of a heap segment: a vector whose buffer is never moved or
/// resized again.
pub(crate) struct PinnedVec<T: bytemuck::Pod + Send + Sync> {
    data: Vec<T>,
    ptr: *mut u8,
}

impl<T: bytemuck::Pod + Send + Sync> PinnedVec<T> {
    pub fn new(mut data: Vec<T>) -> PinnedVec<T> {
        let ptr = data.as_mut_ptr() as *mut u8;
        PinnedVec { data, ptr }
    }
}

unsafe impl<T: bytemuck::Pod + Send + Sync> MemoryOwner for PinnedVec<T> {
    fn memory(&self) -> MemoryAllocation {
        let len = std::mem::size_of_val(self.data.as_slice());
        MemoryAllocation {
            ptr: self.ptr,
            len,
            capacity: len,
            alignment: std::mem::align_of::<T>(),
        }
    }

    fn describe(&self) -> &'static str {
        "heap"
    }
}

// SAFETY: the vector is owned; its buffer is only reached through segments,
// which go through raw pointers.
unsafe impl<T: bytemuck::Pod + Send + Sync> Send for PinnedVec<T> {}

// SAFETY: see `Send`.
unsafe impl<T: bytemuck::Pod + Send + Sync> Sync for PinnedVec<T> {}
