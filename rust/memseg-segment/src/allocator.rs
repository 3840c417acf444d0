//! `SegmentAllocator` and the allocators that carve segments out of an
//! existing one.

use std::cell::Cell;

use bytemuck::Pod;
use memseg_common::{Result, align::checked_align_up_u64, error::Error, result::verify_allocation};
use memseg_layout::{MemoryLayout, ValueLayout};

use crate::carrier::ValueCarrier;
use crate::charset::Charset;
use crate::segment::MemorySegment;

/// A source of memory segments.
///
/// Only [`SegmentAllocator::allocate`] is required; the other methods
/// allocate through it and initialize the result.
pub trait SegmentAllocator {
    /// Returns a segment of `byte_size` bytes whose address is a multiple of
    /// `byte_alignment`.
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<MemorySegment>;

    /// A segment with the size and alignment of `layout`.
    fn allocate_layout(&self, layout: &MemoryLayout) -> Result<MemorySegment> {
        self.allocate(layout.byte_size(), layout.byte_alignment())
    }

    /// A segment for `count` consecutive `element`s.
    fn allocate_array(&self, element: &MemoryLayout, count: u64) -> Result<MemorySegment> {
        let size = element
            .byte_size()
            .checked_mul(count)
            .ok_or_else(|| Error::invalid_arg("count", format!("{count} x {element} overflows")))?;
        self.allocate(size, element.byte_alignment())
    }

    /// A segment for one `layout` value, initialized to `value`.
    fn allocate_value<T: ValueCarrier>(&self, layout: &ValueLayout, value: T) -> Result<MemorySegment>
    where
        Self: Sized,
    {
        let segment = self.allocate(layout.byte_size(), layout.byte_alignment())?;
        segment.set(layout, 0, value)?;
        Ok(segment)
    }

    /// A segment holding a copy of `values`, in native byte order.
    fn allocate_from_slice<T: Pod>(&self, values: &[T]) -> Result<MemorySegment>
    where
        Self: Sized,
    {
        let segment = self.allocate(
            std::mem::size_of_val(values) as u64,
            std::mem::align_of::<T>() as u64,
        )?;
        segment.copy_from_slice(0, values)?;
        Ok(segment)
    }

    /// A segment holding `s` encoded in `charset`, null-terminated.
    fn allocate_str(&self, s: &str, charset: Charset) -> Result<MemorySegment>
    where
        Self: Sized,
    {
        let bytes = charset.encode(s);
        let segment = self.allocate(bytes.len() as u64, charset.unit_size() as u64)?;
        segment.copy_from_slice(0, &bytes)?;
        Ok(segment)
    }
}

impl<A: SegmentAllocator + ?Sized> SegmentAllocator for &A {
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<MemorySegment> {
        (**self).allocate(byte_size, byte_alignment)
    }
}

/// A segment allocates from itself like a [`PrefixAllocator`]: every request
/// is served from its first bytes.
impl SegmentAllocator for MemorySegment {
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<MemorySegment> {
        verify_allocation(byte_size, byte_alignment)?;
        self.as_slice_aligned(0, byte_size, byte_alignment)
    }
}

/// Serves consecutive, non-overlapping slices of a fixed segment.
///
/// Each request starts at the first suitably aligned offset past the
/// previous one. Once the segment is exhausted requests fail with an
/// out-of-bounds error. The cursor is not synchronized; the allocator
/// cannot be shared between threads.
#[derive(Debug)]
pub struct SlicingAllocator {
    segment: MemorySegment,
    cursor: Cell<u64>,
}

impl SlicingAllocator {
    pub fn new(segment: MemorySegment) -> SlicingAllocator {
        SlicingAllocator {
            segment,
            cursor: Cell::new(0),
        }
    }

    /// Bytes handed out so far, alignment gaps included.
    pub fn used(&self) -> u64 {
        self.cursor.get()
    }

    pub fn segment(&self) -> &MemorySegment {
        &self.segment
    }

    /// Starts over from the beginning of the segment. Slices handed out
    /// before still alias the memory.
    pub fn reset(&mut self) {
        self.cursor.set(0);
    }
}

impl SegmentAllocator for SlicingAllocator {
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<MemorySegment> {
        verify_allocation(byte_size, byte_alignment)?;
        let address = self.segment.address();
        let start = address
            .checked_add(self.cursor.get())
            .and_then(|at| checked_align_up_u64(at, byte_alignment))
            .map(|aligned| aligned - address)
            .ok_or_else(|| {
                Error::out_of_bounds(self.cursor.get(), byte_size, self.segment.byte_size())
            })?;
        let slice = self.segment.as_slice_aligned(start, byte_size, byte_alignment)?;
        self.cursor.set(start + byte_size);
        Ok(slice)
    }
}

/// Serves every request from the start of a fixed segment, so each
/// allocation recycles the memory of the previous one.
#[derive(Debug, Clone)]
pub struct PrefixAllocator {
    segment: MemorySegment,
}

impl PrefixAllocator {
    pub fn new(segment: MemorySegment) -> PrefixAllocator {
        PrefixAllocator { segment }
    }

    pub fn segment(&self) -> &MemorySegment {
        &self.segment
    }
}

impl SegmentAllocator for PrefixAllocator {
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<MemorySegment> {
        self.segment.allocate(byte_size, byte_alignment)
    }
}
