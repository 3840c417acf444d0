//! Typed accessors and slicers derived from layout paths.

use memseg_common::{Result, error::Error};
use memseg_layout::{AccessPlan, MemoryLayout, OffsetHandle, PathElement, ValueLayout};

use crate::carrier::ValueCarrier;
use crate::segment::MemorySegment;

/// Accessor derivation on layouts.
pub trait LayoutHandles {
    /// An accessor for the value layout selected by `path`.
    ///
    /// Its coordinates are a segment, a base offset and one index per open
    /// path element. Dereference elements read an address and continue in
    /// the pointed-to memory, at offset zero.
    fn var_handle(&self, path: &[PathElement]) -> Result<VarHandle>;

    /// Like [`LayoutHandles::var_handle`], with a leading index that selects
    /// the `index`-th consecutive instance of this layout, for runs whose
    /// length is not statically known.
    fn array_element_var_handle(&self, path: &[PathElement]) -> Result<VarHandle>;

    /// A slicer for the layout selected by `path`, which must not contain
    /// dereference elements.
    fn slice_handle(&self, path: &[PathElement]) -> Result<SliceHandle>;
}

impl LayoutHandles for MemoryLayout {
    fn var_handle(&self, path: &[PathElement]) -> Result<VarHandle> {
        VarHandle::new(self.access_plan(path)?)
    }

    fn array_element_var_handle(&self, path: &[PathElement]) -> Result<VarHandle> {
        VarHandle::new(self.array_element_access_plan(path)?)
    }

    fn slice_handle(&self, path: &[PathElement]) -> Result<SliceHandle> {
        Ok(SliceHandle {
            root: self.clone(),
            offsets: self.byte_offset_handle(path)?,
            selected: self.select(path)?,
        })
    }
}

/// Reads and writes one value inside a structured segment.
#[derive(Debug, Clone)]
pub struct VarHandle {
    plan: AccessPlan,
    leaf: ValueLayout,
}

impl VarHandle {
    fn new(plan: AccessPlan) -> Result<VarHandle> {
        let leaf = plan.leaf().as_value().cloned().ok_or_else(|| {
            Error::invalid_arg(
                "path",
                format!("path selects {}, not a value layout", plan.leaf()),
            )
        })?;
        Ok(VarHandle { plan, leaf })
    }

    /// The value layout this handle reads and writes.
    pub fn layout(&self) -> &ValueLayout {
        &self.leaf
    }

    /// Number of index coordinates after the base offset.
    pub fn coordinates(&self) -> usize {
        self.plan.coordinates()
    }

    pub fn get<T: ValueCarrier>(&self, segment: &MemorySegment, base: u64, indices: &[u64]) -> Result<T> {
        let (target, offset) = self.locate(segment, base, indices)?;
        target.get(&self.leaf, offset)
    }

    pub fn set<T: ValueCarrier>(
        &self,
        segment: &MemorySegment,
        base: u64,
        indices: &[u64],
        value: T,
    ) -> Result<()> {
        let (target, offset) = self.locate(segment, base, indices)?;
        target.set(&self.leaf, offset, value)
    }

    /// Walks the plan's stages, following pointers between them, and returns
    /// the segment and offset of the leaf value.
    fn locate(&self, segment: &MemorySegment, base: u64, indices: &[u64]) -> Result<(MemorySegment, u64)> {
        if indices.len() != self.coordinates() {
            return Err(Error::invalid_arg(
                "indices",
                format!("expected {} indices, got {}", self.coordinates(), indices.len()),
            ));
        }
        let mut current = segment.clone();
        let mut base = base;
        let mut rest = indices;
        let stages = self.plan.stages();
        for (i, stage) in stages.iter().enumerate() {
            let (outer, tail) = rest.split_at(stage.enclosing_offsets.coordinates());
            let (inner, tail) = tail.split_at(stage.offsets.coordinates());
            rest = tail;

            let enclosing_at = stage.enclosing_offsets.offset(base, outer)?;
            check_enclosing(&current, enclosing_at, &stage.enclosing)?;
            let at = stage.offsets.offset(enclosing_at, inner)?;
            if i + 1 == stages.len() {
                return Ok((current, at));
            }
            let pointer = stage.layout.as_value().ok_or_else(|| {
                Error::invalid_arg("path", format!("{} is not an address layout", stage.layout))
            })?;
            current = current.get::<MemorySegment>(pointer, at)?;
            base = 0;
        }
        unreachable!("an access plan has at least one stage")
    }
}

/// Produces slices for the layout selected by a path.
#[derive(Debug, Clone)]
pub struct SliceHandle {
    root: MemoryLayout,
    offsets: OffsetHandle,
    selected: MemoryLayout,
}

impl SliceHandle {
    pub fn layout(&self) -> &MemoryLayout {
        &self.selected
    }

    pub fn coordinates(&self) -> usize {
        self.offsets.coordinates()
    }

    pub fn slice(&self, segment: &MemorySegment, base: u64, indices: &[u64]) -> Result<MemorySegment> {
        check_enclosing(segment, base, &self.root)?;
        let offset = self.offsets.offset(base, indices)?;
        segment.as_slice_layout(offset, &self.selected)
    }
}

/// The segment must be alive, and the enclosing layout must fit in it at
/// `offset` and be aligned.
fn check_enclosing(segment: &MemorySegment, offset: u64, layout: &MemoryLayout) -> Result<()> {
    segment.scope().check_valid_state()?;
    segment.check_bounds(offset, layout.byte_size())?;
    segment.check_alignment(offset, layout.byte_alignment())
}
