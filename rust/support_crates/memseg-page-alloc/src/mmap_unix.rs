use std::ffi::c_void;
use std::os::fd::RawFd;
use std::sync::OnceLock;

/// Maps `size` bytes (rounded up to whole pages) of anonymous, zeroed,
/// read-write memory.
///
/// Returns the base pointer and the mapped capacity. The region must be
/// released with [`free`] passing the returned capacity.
pub fn allocate(size: usize) -> std::io::Result<(*mut c_void, usize)> {
    let page_size = get_page_size();
    let capacity = round_to_pages(size.max(1), page_size)?;
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Unmaps a region returned by [`allocate`] or [`map_file`].
///
/// # Safety
///
/// `ptr`/`size` must describe exactly one live mapping returned by this module,
/// and no references into it may be used afterwards.
pub unsafe fn free(ptr: *mut c_void, size: usize) -> std::io::Result<()> {
    let res = unsafe { libc::munmap(ptr, size) };
    if res != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Maps `len` bytes of the file behind `fd`, starting at byte `offset`.
///
/// `mmap` needs a page-aligned file offset, so the mapping starts at the page
/// containing `offset`. Returns `(base, mapped_len, delta)` where
/// `base + delta` is the address of byte `offset`.
pub fn map_file(
    fd: RawFd,
    offset: u64,
    len: usize,
    writable: bool,
) -> std::io::Result<(*mut c_void, usize, usize)> {
    let page_size = get_page_size() as u64;
    let aligned_offset = offset & !(page_size - 1);
    let delta = (offset - aligned_offset) as usize;
    let mapped_len = len
        .checked_add(delta)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "length overflow"))?
        .max(1);
    let prot = if writable {
        libc::PROT_READ | libc::PROT_WRITE
    } else {
        libc::PROT_READ
    };
    let file_offset = libc::off_t::try_from(aligned_offset)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "offset too large"))?;
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            mapped_len,
            prot,
            libc::MAP_SHARED,
            fd,
            file_offset,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, mapped_len, delta))
}

/// Flushes modified pages of a file mapping back to the file.
///
/// # Safety
///
/// `ptr` must be page aligned and `[ptr, ptr + len)` inside a live mapping.
pub unsafe fn sync(ptr: *mut c_void, len: usize) -> std::io::Result<()> {
    let res = unsafe { libc::msync(ptr, len, libc::MS_SYNC) };
    if res != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Hints the kernel that the range will (or will not) be needed soon.
///
/// # Safety
///
/// `ptr` must be page aligned and `[ptr, ptr + len)` inside a live mapping.
pub unsafe fn advise(ptr: *mut c_void, len: usize, will_need: bool) -> std::io::Result<()> {
    let advice = if will_need {
        libc::MADV_WILLNEED
    } else {
        libc::MADV_DONTNEED
    };
    let res = unsafe { libc::madvise(ptr, len, advice) };
    if res != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Reports whether every page of the range is resident in physical memory.
///
/// # Safety
///
/// `ptr` must be page aligned and `[ptr, ptr + len)` inside a live mapping.
pub unsafe fn is_resident(ptr: *mut c_void, len: usize) -> std::io::Result<bool> {
    let page_size = get_page_size();
    let pages = len.max(1).div_ceil(page_size);
    let mut residency = vec![0u8; pages];
    let res = unsafe { libc::mincore(ptr, len.max(1), residency.as_mut_ptr() as _) };
    if res != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(residency.iter().all(|&page| page & 1 != 0))
}

/// Returns the size of a regular memory page in bytes.
pub fn get_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size > 0 { size as usize } else { 4096 }
    })
}

fn round_to_pages(size: usize, page_size: usize) -> std::io::Result<usize> {
    size.checked_next_multiple_of(page_size)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "size overflow"))
}
