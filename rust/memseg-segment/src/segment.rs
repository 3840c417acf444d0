//! `MemorySegment`: a bounds-, alignment- and lifetime-checked view of a
//! contiguous memory region.
//!
//! A segment never owns memory. The region belongs to the segment's scope,
//! which keeps it valid until the scope ends; every access goes through the
//! scope so that it either completes while the memory is valid or fails.
//!
//! Segments of shared arenas may be used from many threads at once. Like
//! plain memory, concurrent accesses to the same bytes must be ordered by
//! the caller when at least one of them writes.

use std::ptr;
use std::thread::ThreadId;

use bytemuck::Pod;
use memseg_common::{
    Result,
    align::{is_aligned_u64, max_alignment_of},
    error::Error,
    verify_arg,
};
use memseg_layout::{MemoryLayout, ValueLayout};
use memseg_page_alloc::mapped;

use crate::carrier::{ValueCarrier, check_carrier, pod_size};
use crate::charset::Charset;
use crate::native::PinnedVec;
use crate::scope::Scope;

/// Where the memory of a segment comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    /// A Rust vector; addresses are offsets into it.
    Heap,
    /// Off-heap memory, or a raw native address.
    Native,
    /// A region of a memory-mapped file.
    Mapped,
}

/// Maximal element alignment of native memory: unconstrained.
const NATIVE_ELEMENT_ALIGN: u64 = 1 << 63;

/// A view of `byte_size` bytes starting at `address`.
///
/// Cloning is cheap and yields a view of the same memory under the same
/// scope.
#[derive(Clone)]
pub struct MemorySegment {
    kind: SegmentKind,
    /// Address of the heap storage; zero for native and mapped segments.
    base: usize,
    /// Absolute address for native and mapped segments, offset into the
    /// storage for heap segments.
    address: u64,
    len: u64,
    /// Upper bound on the alignment an access may claim: the element
    /// alignment of heap storage.
    element_align: u64,
    read_only: bool,
    scope: Scope,
}

impl MemorySegment {
    pub(crate) fn native(
        kind: SegmentKind,
        address: u64,
        len: u64,
        read_only: bool,
        scope: Scope,
    ) -> MemorySegment {
        MemorySegment {
            kind,
            base: 0,
            address,
            len,
            element_align: NATIVE_ELEMENT_ALIGN,
            read_only,
            scope,
        }
    }

    /// The zero-length native segment at address zero.
    pub fn null() -> MemorySegment {
        MemorySegment::native(SegmentKind::Native, 0, 0, false, Scope::global())
    }

    /// A heap segment over the elements of `data`.
    ///
    /// The vector is kept alive by the segment's automatic scope. Accesses
    /// may not claim an alignment stricter than `align_of::<T>()`.
    pub fn of_vec<T: Pod + Send + Sync>(data: Vec<T>) -> MemorySegment {
        let pinned = PinnedVec::new(data);
        let memory = memseg_common_traits::memory_owner::MemoryOwner::memory(&pinned);
        MemorySegment {
            kind: SegmentKind::Heap,
            base: memory.ptr.expose_provenance(),
            address: 0,
            len: memory.len as u64,
            element_align: memory.alignment as u64,
            read_only: false,
            scope: Scope::owning(Box::new(pinned)),
        }
    }

    /// A heap segment over a copy of `bytes`.
    pub fn of_bytes(bytes: &[u8]) -> MemorySegment {
        MemorySegment::of_vec(bytes.to_vec())
    }

    /// The address of the first byte: absolute for native and mapped
    /// segments, an offset into the backing storage for heap segments.
    #[inline]
    pub fn address(&self) -> u64 {
        self.address
    }

    #[inline]
    pub fn byte_size(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The strictest alignment any access through this segment can satisfy.
    pub fn max_byte_alignment(&self) -> u64 {
        self.element_align.min(max_alignment_of(self.address))
    }

    #[inline]
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        self.kind != SegmentKind::Heap
    }

    #[inline]
    pub fn is_mapped(&self) -> bool {
        self.kind == SegmentKind::Mapped
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// A read-only view of the same memory.
    pub fn as_read_only(&self) -> MemorySegment {
        MemorySegment {
            read_only: true,
            ..self.clone()
        }
    }

    #[inline]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Whether `thread` may access this segment, liveness aside.
    pub fn is_accessible_by(&self, thread: ThreadId) -> bool {
        self.kind == SegmentKind::Heap || self.scope.is_accessible_by(thread)
    }

    /// A view of `size` bytes starting at `offset`, sharing memory and scope.
    pub fn as_slice(&self, offset: u64, size: u64) -> Result<MemorySegment> {
        self.scope.check_thread()?;
        self.check_bounds(offset, size)?;
        Ok(self.slice_unchecked(offset, size))
    }

    /// The view from `offset` to the end of this segment.
    pub fn as_slice_from(&self, offset: u64) -> Result<MemorySegment> {
        self.as_slice(offset, self.len.saturating_sub(offset))
    }

    /// Like [`MemorySegment::as_slice`], also requiring the slice to start
    /// on an `alignment` boundary.
    pub fn as_slice_aligned(&self, offset: u64, size: u64, alignment: u64) -> Result<MemorySegment> {
        verify_arg!(alignment, alignment.is_power_of_two());
        let slice = self.as_slice(offset, size)?;
        self.check_alignment(offset, alignment)?;
        Ok(slice)
    }

    /// A view of `layout.byte_size()` bytes at `offset`, aligned for `layout`.
    pub fn as_slice_layout(&self, offset: u64, layout: &MemoryLayout) -> Result<MemorySegment> {
        self.as_slice_aligned(offset, layout.byte_size(), layout.byte_alignment())
    }

    pub(crate) fn slice_unchecked(&self, offset: u64, size: u64) -> MemorySegment {
        MemorySegment {
            address: self.address + offset,
            len: size,
            ..self.clone()
        }
    }

    /// The same address under a different size and scope.
    pub(crate) fn reinterpreted(&self, len: u64, scope: Scope) -> MemorySegment {
        MemorySegment {
            len,
            scope,
            ..self.clone()
        }
    }

    /// Reads a value of `layout` at `offset`.
    pub fn get<T: ValueCarrier>(&self, layout: &ValueLayout, offset: u64) -> Result<T> {
        check_carrier::<T>(layout)?;
        let size = layout.byte_size() as usize;
        let mut buf = [0u8; 8];
        self.with_memory(offset, layout.byte_size(), layout.byte_alignment(), false, |p| unsafe {
            ptr::copy_nonoverlapping(p, buf.as_mut_ptr(), size)
        })?;
        let bytes = &mut buf[..size];
        if !layout.order().is_native() {
            bytes.reverse();
        }
        T::decode(bytes, layout)
    }

    /// Writes `value` as `layout` at `offset`.
    pub fn set<T: ValueCarrier>(&self, layout: &ValueLayout, offset: u64, value: T) -> Result<()> {
        check_carrier::<T>(layout)?;
        let size = layout.byte_size() as usize;
        let mut buf = [0u8; 8];
        let bytes = &mut buf[..size];
        value.encode(bytes)?;
        if !layout.order().is_native() {
            bytes.reverse();
        }
        self.with_memory(offset, layout.byte_size(), layout.byte_alignment(), true, |p| unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), p, size)
        })
    }

    /// Reads the `index`-th value of a run of `layout`s starting at offset 0.
    pub fn get_at_index<T: ValueCarrier>(&self, layout: &ValueLayout, index: u64) -> Result<T> {
        self.get(layout, index_offset(layout, index)?)
    }

    /// Writes the `index`-th value of a run of `layout`s starting at offset 0.
    pub fn set_at_index<T: ValueCarrier>(&self, layout: &ValueLayout, index: u64, value: T) -> Result<()> {
        self.set(layout, index_offset(layout, index)?, value)
    }

    /// Sets every byte of the segment to `value`.
    pub fn fill(&self, value: u8) -> Result<&MemorySegment> {
        self.with_memory(0, self.len, 1, true, |p| {
            if self.len > 0 {
                unsafe { ptr::write_bytes(p, value, self.len as usize) }
            }
        })?;
        Ok(self)
    }

    /// Copies all of `src` to the start of this segment.
    pub fn copy_from(&self, src: &MemorySegment) -> Result<&MemorySegment> {
        MemorySegment::copy(src, 0, self, 0, src.len)?;
        Ok(self)
    }

    /// Copies `len` bytes from `src` at `src_offset` to `dst` at
    /// `dst_offset`. Overlapping ranges are copied as if through an
    /// intermediate buffer.
    pub fn copy(
        src: &MemorySegment,
        src_offset: u64,
        dst: &MemorySegment,
        dst_offset: u64,
        len: u64,
    ) -> Result<()> {
        src.with_memory(src_offset, len, 1, false, |s| {
            dst.with_memory(dst_offset, len, 1, true, |d| {
                if len > 0 {
                    unsafe { ptr::copy(s, d, len as usize) }
                }
            })
        })?
    }

    /// Copies `count` elements between runs of value layouts of the same
    /// size, swapping bytes when the two layouts differ in byte order.
    pub fn copy_elements(
        src: &MemorySegment,
        src_layout: &ValueLayout,
        src_offset: u64,
        dst: &MemorySegment,
        dst_layout: &ValueLayout,
        dst_offset: u64,
        count: u64,
    ) -> Result<()> {
        let size = src_layout.byte_size();
        if dst_layout.byte_size() != size {
            return Err(Error::invalid_arg(
                "dst_layout",
                format!("element sizes differ: {src_layout} and {dst_layout}"),
            ));
        }
        check_element_alignment(src_layout)?;
        check_element_alignment(dst_layout)?;
        let len = size
            .checked_mul(count)
            .ok_or_else(|| Error::out_of_bounds(src_offset, u64::MAX, src.len))?;
        let swap = src_layout.order() != dst_layout.order() && size > 1;
        src.with_memory(src_offset, len, src_layout.byte_alignment(), false, |s| {
            dst.with_memory(dst_offset, len, dst_layout.byte_alignment(), true, |d| {
                if len == 0 {
                    return;
                }
                unsafe { ptr::copy(s, d, len as usize) };
                if swap {
                    let out = unsafe { std::slice::from_raw_parts_mut(d, len as usize) };
                    out.chunks_exact_mut(size as usize).for_each(<[u8]>::reverse);
                }
            })
        })?
    }

    /// Copies bytes starting at `offset` into `dst`, in native byte order.
    pub fn copy_to_slice<T: Pod>(&self, offset: u64, dst: &mut [T]) -> Result<()> {
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(dst);
        let len = bytes.len();
        self.with_memory(offset, len as u64, 1, false, |p| {
            if len > 0 {
                unsafe { ptr::copy_nonoverlapping(p, bytes.as_mut_ptr(), len) }
            }
        })
    }

    /// Copies `src` into this segment at `offset`, in native byte order.
    pub fn copy_from_slice<T: Pod>(&self, offset: u64, src: &[T]) -> Result<()> {
        let bytes: &[u8] = bytemuck::cast_slice(src);
        let len = bytes.len();
        self.with_memory(offset, len as u64, 1, true, |p| {
            if len > 0 {
                unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), p, len) }
            }
        })
    }

    /// Copies the whole segment into a new vector of `T`.
    pub fn to_vec<T: Pod>(&self) -> Result<Vec<T>> {
        let size = pod_size::<T>()? as u64;
        if !self.len.is_multiple_of(size) {
            return Err(Error::invalid_arg(
                "T",
                format!("segment size {} is not a multiple of {size}", self.len),
            ));
        }
        let count = usize::try_from(self.len / size)
            .map_err(|_| Error::invalid_arg("T", "segment too large"))?;
        let mut out = vec![T::zeroed(); count];
        self.copy_to_slice(0, &mut out)?;
        Ok(out)
    }

    /// The first offset at which this segment and `other` differ.
    ///
    /// Returns `None` if both have the same size and content. If one is a
    /// proper prefix of the other, returns the shorter size.
    pub fn mismatch(&self, other: &MemorySegment) -> Result<Option<u64>> {
        MemorySegment::mismatch_ranges(self, 0, self.len, other, 0, other.len)
    }

    /// Like [`MemorySegment::mismatch`], over `src[src_from..src_to]` and
    /// `dst[dst_from..dst_to]`; the result is relative to the range starts.
    pub fn mismatch_ranges(
        src: &MemorySegment,
        src_from: u64,
        src_to: u64,
        dst: &MemorySegment,
        dst_from: u64,
        dst_to: u64,
    ) -> Result<Option<u64>> {
        let src_len = range_len(src, src_from, src_to)?;
        let dst_len = range_len(dst, dst_from, dst_to)?;
        let common = src_len.min(dst_len) as usize;
        let first = src.with_memory(src_from, src_len, 1, false, |s| {
            dst.with_memory(dst_from, dst_len, 1, false, |d| {
                if common == 0 {
                    return None;
                }
                let (a, b) = unsafe {
                    (
                        std::slice::from_raw_parts(s, common),
                        std::slice::from_raw_parts(d, common),
                    )
                };
                a.iter().zip(b).position(|(x, y)| x != y)
            })
        })??;
        Ok(match first {
            Some(index) => Some(index as u64),
            None if src_len == dst_len => None,
            None => Some(common as u64),
        })
    }

    /// The part of this segment that overlaps `other`, if any.
    pub fn as_overlapping_slice(&self, other: &MemorySegment) -> Option<MemorySegment> {
        if !self.same_space(other) {
            return None;
        }
        let start = self.address.max(other.address);
        let end = (self.address + self.len).min(other.address + other.len);
        (start < end).then(|| self.slice_unchecked(start - self.address, end - start))
    }

    /// The offset of `other`'s start relative to this segment's start.
    pub fn segment_offset(&self, other: &MemorySegment) -> Result<i64> {
        if !self.same_space(other) {
            return Err(Error::unsupported(
                "segment_offset",
                "segments do not share an address space",
            ));
        }
        Ok(other.address.wrapping_sub(self.address) as i64)
    }

    /// Splits the segment into consecutive slices of `layout`'s size.
    pub fn elements(
        &self,
        layout: &MemoryLayout,
    ) -> Result<impl Iterator<Item = MemorySegment> + use<>> {
        let size = layout.byte_size();
        if size == 0 {
            return Err(Error::invalid_arg("layout", "element layout has zero size"));
        }
        if !self.len.is_multiple_of(size) {
            return Err(Error::invalid_arg(
                "layout",
                format!("segment size {} is not a multiple of {layout}", self.len),
            ));
        }
        if !self.alignment_ok(0, layout.byte_alignment()) || !is_aligned_u64(size, layout.byte_alignment())
        {
            return Err(Error::invalid_arg(
                "layout",
                format!("{layout} alignment is incompatible with the segment"),
            ));
        }
        self.scope.check_thread()?;
        let segment = self.clone();
        Ok((0..self.len / size).map(move |i| segment.slice_unchecked(i * size, size)))
    }

    /// Reads a null-terminated string starting at `offset`.
    pub fn get_string(&self, offset: u64, charset: Charset) -> Result<String> {
        self.check_bounds(offset, 0)?;
        let available = self.len - offset;
        let decoded = self.with_memory(offset, available, 1, false, |p| {
            let bytes = if available == 0 {
                &[][..]
            } else {
                unsafe { std::slice::from_raw_parts(p, available as usize) }
            };
            charset
                .terminated_len(bytes)
                .map(|len| charset.decode(&bytes[..len]))
        })?;
        decoded.ok_or_else(|| Error::out_of_bounds(offset, available + 1, self.len))
    }

    /// Writes `s` and a terminator at `offset`.
    pub fn set_string(&self, offset: u64, s: &str, charset: Charset) -> Result<()> {
        self.copy_from_slice(offset, &charset.encode(s))
    }

    /// Asks the OS to page in a mapped segment.
    pub fn load(&self) -> Result<()> {
        self.mapped_op("load", |p, len| unsafe { mapped::load(p, len) })
    }

    /// Tells the OS a mapped segment's pages are not needed.
    pub fn unload(&self) -> Result<()> {
        self.mapped_op("unload", |p, len| unsafe { mapped::unload(p, len) })
    }

    /// Whether a mapped segment is resident in physical memory. A hint only.
    pub fn is_loaded(&self) -> Result<bool> {
        self.mapped_op("is_loaded", |p, len| unsafe { mapped::is_loaded(p, len) })
    }

    /// Writes modified pages of a mapped segment back to its file.
    pub fn force(&self) -> Result<()> {
        self.mapped_op("force", |p, len| unsafe { mapped::force(p, len) })
    }

    fn mapped_op<R>(
        &self,
        operation: &str,
        op: impl FnOnce(*mut u8, usize) -> std::io::Result<R>,
    ) -> Result<R> {
        if self.kind != SegmentKind::Mapped {
            return Err(Error::unsupported(operation, "segment is not file-mapped"));
        }
        let len = self.len as usize;
        self.with_memory(0, self.len, 1, false, |p| op(p, len))?
            .map_err(|e| Error::io(operation, e))
    }

    /// Runs `op` on the address of `[offset, offset + length)` after checking
    /// the scope, the read-only flag, bounds and alignment.
    pub(crate) fn with_memory<R>(
        &self,
        offset: u64,
        length: u64,
        alignment: u64,
        write: bool,
        op: impl FnOnce(*mut u8) -> R,
    ) -> Result<R> {
        self.scope.access(|| {
            if write && self.read_only {
                return Err(Error::read_only());
            }
            self.check_bounds(offset, length)?;
            self.check_alignment(offset, alignment)?;
            Ok(op(self.raw(offset)))
        })
    }

    pub(crate) fn check_bounds(&self, offset: u64, length: u64) -> Result<()> {
        match offset.checked_add(length) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Error::out_of_bounds(offset, length, self.len)),
        }
    }

    pub(crate) fn check_alignment(&self, offset: u64, alignment: u64) -> Result<()> {
        if self.alignment_ok(offset, alignment) {
            Ok(())
        } else {
            Err(Error::misaligned(self.address.wrapping_add(offset), alignment))
        }
    }

    fn alignment_ok(&self, offset: u64, alignment: u64) -> bool {
        alignment <= self.element_align
            && is_aligned_u64(self.address.wrapping_add(offset), alignment)
    }

    fn raw(&self, offset: u64) -> *mut u8 {
        let address = self.base as u64 + self.address + offset;
        ptr::with_exposed_provenance_mut(address as usize)
    }

    fn same_space(&self, other: &MemorySegment) -> bool {
        self.is_native() == other.is_native() && self.base == other.base
    }
}

fn index_offset(layout: &ValueLayout, index: u64) -> Result<u64> {
    check_element_alignment(layout)?;
    index
        .checked_mul(layout.byte_size())
        .ok_or_else(|| Error::index_out_of_bounds(index, u64::MAX / layout.byte_size()))
}

fn check_element_alignment(layout: &ValueLayout) -> Result<()> {
    if layout.byte_alignment() > layout.byte_size() {
        return Err(Error::invalid_arg(
            "layout",
            format!("{layout} alignment exceeds its size, elements cannot be contiguous"),
        ));
    }
    Ok(())
}

fn range_len(segment: &MemorySegment, from: u64, to: u64) -> Result<u64> {
    if from > to || to > segment.len {
        return Err(Error::out_of_bounds(from, to.saturating_sub(from), segment.len));
    }
    Ok(to - from)
}

/// Two segments are equal when they start at the same address of the same
/// memory; size and scope are not compared.
impl PartialEq for MemorySegment {
    fn eq(&self, other: &Self) -> bool {
        self.same_space(other) && self.address == other.address
    }
}

impl Eq for MemorySegment {}

impl std::hash::Hash for MemorySegment {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.is_native().hash(state);
        self.base.hash(state);
        self.address.hash(state);
    }
}

impl std::fmt::Debug for MemorySegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySegment")
            .field("kind", &self.kind)
            .field("address", &format_args!("{:#x}", self.address))
            .field("byte_size", &self.len)
            .field("read_only", &self.read_only)
            .field("scope", &self.scope)
            .finish()
    }
}
