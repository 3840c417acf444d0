//! Shared file mappings backing `Mapped` segments.

use std::ffi::c_void;
use std::fs::File;

use memseg_common_traits::memory_owner::{MemoryAllocation, MemoryOwner};

use crate::mmap;

/// Access mode of a file mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MapMode {
    /// Pages are mapped read-only; segments over them are read-only.
    ReadOnly,
    /// Pages are mapped shared and writable; writes reach the file.
    ReadWrite,
}

/// A region of a file mapped into memory with `MAP_SHARED`.
///
/// The region stays mapped until the value is dropped.
pub struct MappedRegion {
    /// Page-aligned start of the mapping.
    base: *mut u8,
    /// Length of the whole mapping, starting at `base`.
    mapped_len: usize,
    /// Distance from `base` to the first requested byte.
    delta: usize,
    /// Requested length.
    len: usize,
    mode: MapMode,
}

impl MappedRegion {
    /// Maps `len` bytes of `file` starting at byte `offset`.
    ///
    /// The file must already be at least `offset + len` bytes long; mapping
    /// never grows it.
    pub fn map(file: &File, offset: u64, len: usize, mode: MapMode) -> std::io::Result<MappedRegion> {
        let file_len = file.metadata()?.len();
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "range overflow"))?;
        if end > file_len {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("mapped range ends at {end}, past the file length {file_len}"),
            ));
        }
        let (base, mapped_len, delta) =
            mmap::map_file(raw_fd(file), offset, len, mode == MapMode::ReadWrite)?;
        Ok(MappedRegion {
            base: base as *mut u8,
            mapped_len,
            delta,
            len,
            mode,
        })
    }

    /// Address of the first requested byte.
    #[inline]
    pub fn ptr(&self) -> *mut u8 {
        self.base.wrapping_add(self.delta)
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
    pub fn mode(&self) -> MapMode {
        self.mode
    }
}

/// Asks the kernel to page in the mapped bytes `[ptr, ptr + len)`.
///
/// # Safety
///
/// The range must lie inside a live mapping created by [`MappedRegion::map`].
/// The same applies to [`unload`], [`is_loaded`] and [`force`].
pub unsafe fn load(ptr: *mut u8, len: usize) -> std::io::Result<()> {
    let (start, len) = page_range(ptr, len);
    unsafe { mmap::advise(start, len, true) }
}

/// # Safety
///
/// See [`load`].
pub unsafe fn unload(ptr: *mut u8, len: usize) -> std::io::Result<()> {
    let (start, len) = page_range(ptr, len);
    unsafe { mmap::advise(start, len, false) }
}

/// # Safety
///
/// See [`load`].
pub unsafe fn is_loaded(ptr: *mut u8, len: usize) -> std::io::Result<bool> {
    let (start, len) = page_range(ptr, len);
    unsafe { mmap::is_resident(start, len) }
}

/// # Safety
///
/// See [`load`].
pub unsafe fn force(ptr: *mut u8, len: usize) -> std::io::Result<()> {
    let (start, len) = page_range(ptr, len);
    unsafe { mmap::sync(start, len) }
}

/// Expands a byte range to start on a page boundary. Mappings start on a page
/// boundary, so the expanded range stays inside the mapping.
fn page_range(ptr: *mut u8, len: usize) -> (*mut c_void, usize) {
    let page_size = mmap::get_page_size();
    let delta = ptr as usize & (page_size - 1);
    (ptr.wrapping_sub(delta) as *mut c_void, (len + delta).max(1))
}

unsafe impl MemoryOwner for MappedRegion {
    fn memory(&self) -> MemoryAllocation {
        MemoryAllocation {
            ptr: self.ptr(),
            len: self.len,
            capacity: self.len,
            alignment: if self.delta == 0 {
                mmap::get_page_size()
            } else {
                1 << self.delta.trailing_zeros()
            },
        }
    }

    fn describe(&self) -> &'static str {
        "mapped file"
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if !self.base.is_null() {
            let _ = unsafe { mmap::free(self.base as _, self.mapped_len) };
        }
    }
}

// SAFETY: the region exclusively owns the mapping and unmaps it on drop.
unsafe impl Send for MappedRegion {}

// SAFETY: see `Send`.
unsafe impl Sync for MappedRegion {}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("base", &self.base)
            .field("delta", &self.delta)
            .field("len", &self.len)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(unix)]
fn raw_fd(file: &File) -> i32 {
    use std::os::fd::AsRawFd;
    file.as_raw_fd()
}

#[cfg(not(unix))]
fn raw_fd(_file: &File) -> i32 {
    -1
}
