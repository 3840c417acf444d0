use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::ffi::c_void;

/// Allocates zeroed, page-aligned memory (emulated with the global allocator).
pub fn allocate(size: usize) -> std::io::Result<(*mut c_void, usize)> {
    let page_size = get_page_size();
    let capacity = size
        .max(1)
        .checked_next_multiple_of(page_size)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "size overflow"))?;
    let layout = page_layout(capacity)?;

    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "failed to allocate memory",
        ));
    }
    Ok((ptr as *mut c_void, capacity))
}

/// Frees memory returned by [`allocate`].
///
/// # Safety
///
/// `ptr`/`size` must come from exactly one previous [`allocate`] call.
pub unsafe fn free(ptr: *mut c_void, size: usize) -> std::io::Result<()> {
    let layout = page_layout(size)?;
    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

/// File mappings require `mmap`; this target has none.
pub fn map_file(
    _fd: i32,
    _offset: u64,
    _len: usize,
    _writable: bool,
) -> std::io::Result<(*mut c_void, usize, usize)> {
    Err(unsupported())
}

/// # Safety
///
/// Never reachable: no mapping can be created on this target.
pub unsafe fn sync(_ptr: *mut c_void, _len: usize) -> std::io::Result<()> {
    Err(unsupported())
}

/// # Safety
///
/// Never reachable: no mapping can be created on this target.
pub unsafe fn advise(_ptr: *mut c_void, _len: usize, _will_need: bool) -> std::io::Result<()> {
    Err(unsupported())
}

/// # Safety
///
/// Never reachable: no mapping can be created on this target.
pub unsafe fn is_resident(_ptr: *mut c_void, _len: usize) -> std::io::Result<bool> {
    Err(unsupported())
}

/// Returns the emulated page size in bytes.
pub fn get_page_size() -> usize {
    4 * 1024
}

fn page_layout(size: usize) -> std::io::Result<Layout> {
    Layout::from_size_align(size, get_page_size())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid layout"))
}

fn unsupported() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "file mapping is not supported on this platform",
    )
}
