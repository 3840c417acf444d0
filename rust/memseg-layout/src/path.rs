//! Layout paths: navigation into nested layouts.
//!
//! A path is a slice of [`PathElement`]s applied left to right to a root
//! layout. Resolution is a fold that tracks the current layout, the static
//! byte offset accumulated so far and one [`OpenIndex`] per open element.
//! Dereference elements end the current [`AccessStage`] and start a new one
//! rooted at the pointer's target layout.

use std::sync::Arc;

use memseg_common::{Result, error::Error};

use crate::layout::MemoryLayout;

/// A single navigation step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathElement {
    /// Selects the first member of a group layout with the given name.
    GroupElementByName(Arc<str>),
    /// Selects the member of a group layout at the given position.
    GroupElementByIndex(u64),
    /// Selects one fixed element of a sequence layout.
    SequenceElementIndex(u64),
    /// Selects the elements `start, start + step, ...` of a sequence layout.
    /// Open: contributes one index coordinate.
    SequenceElementRange { start: u64, step: i64 },
    /// Selects any element of a sequence layout. Open: contributes one index
    /// coordinate.
    SequenceElement,
    /// Follows an address layout to its target layout.
    Dereference,
}

impl PathElement {
    pub fn group_element(name: impl Into<Arc<str>>) -> PathElement {
        PathElement::GroupElementByName(name.into())
    }

    pub fn group_element_at(index: u64) -> PathElement {
        PathElement::GroupElementByIndex(index)
    }

    pub fn sequence_element() -> PathElement {
        PathElement::SequenceElement
    }

    pub fn sequence_element_at(index: u64) -> PathElement {
        PathElement::SequenceElementIndex(index)
    }

    /// An open element selecting every `step`-th element starting at
    /// `start`. A negative step walks towards the start of the sequence.
    pub fn sequence_element_range(start: u64, step: i64) -> Result<PathElement> {
        if step == 0 {
            return Err(Error::invalid_arg("step", "range step must not be zero"));
        }
        Ok(PathElement::SequenceElementRange { start, step })
    }

    pub fn dereference() -> PathElement {
        PathElement::Dereference
    }

    /// Whether this element leaves the offset parametric in an index.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PathElement::SequenceElement | PathElement::SequenceElementRange { .. }
        )
    }

    pub fn is_dereference(&self) -> bool {
        matches!(self, PathElement::Dereference)
    }
}

impl std::fmt::Display for PathElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathElement::GroupElementByName(name) => write!(f, "groupElement(\"{name}\")"),
            PathElement::GroupElementByIndex(index) => write!(f, "groupElement({index})"),
            PathElement::SequenceElementIndex(index) => write!(f, "sequenceElement({index})"),
            PathElement::SequenceElementRange { start, step } => {
                write!(f, "sequenceElement({start}, {step})")
            }
            PathElement::SequenceElement => f.write_str("sequenceElement()"),
            PathElement::Dereference => f.write_str("dereferenceElement()"),
        }
    }
}

/// The contribution of one open path element: `index * stride`, with
/// `index < bound`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenIndex {
    pub stride: i64,
    pub bound: u64,
}

/// Computes `base + static_offset + Σ index_i * stride_i` for a resolved path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OffsetHandle {
    static_offset: u64,
    open: Vec<OpenIndex>,
}

impl OffsetHandle {
    pub fn static_offset(&self) -> u64 {
        self.static_offset
    }

    pub fn open_indices(&self) -> &[OpenIndex] {
        &self.open
    }

    /// Number of index arguments `offset` expects.
    pub fn coordinates(&self) -> usize {
        self.open.len()
    }

    /// The offset of the selected layout relative to a segment, for the
    /// given base offset and one index per open element.
    pub fn offset(&self, base: u64, indices: &[u64]) -> Result<u64> {
        if indices.len() != self.open.len() {
            return Err(Error::invalid_arg(
                "indices",
                format!("expected {} indices, got {}", self.open.len(), indices.len()),
            ));
        }
        let mut offset = base as i128 + self.static_offset as i128;
        for (&index, open) in indices.iter().zip(&self.open) {
            if index >= open.bound {
                return Err(Error::index_out_of_bounds(index, open.bound));
            }
            offset += index as i128 * open.stride as i128;
        }
        u64::try_from(offset).map_err(|_| Error::out_of_bounds(base, 0, u64::MAX))
    }

    fn with_leading(mut self, open: OpenIndex) -> OffsetHandle {
        self.open.insert(0, open);
        self
    }
}

/// One pointer-free leg of an access path.
///
/// `enclosing` is the layout the stage navigates into: the root layout for
/// the first stage, the dereferenced target layout for later stages. The
/// accessor checks it against the segment at `enclosing_offsets` before
/// computing the address of `layout` at `offsets`, relative to the enclosing
/// layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessStage {
    pub enclosing: MemoryLayout,
    pub enclosing_offsets: OffsetHandle,
    pub offsets: OffsetHandle,
    pub layout: MemoryLayout,
}

impl AccessStage {
    pub fn coordinates(&self) -> usize {
        self.enclosing_offsets.coordinates() + self.offsets.coordinates()
    }
}

/// A resolved access path, split at each dereference.
///
/// Every stage but the last ends in an address layout with a target; the
/// last ends in the selected layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccessPlan {
    stages: Vec<AccessStage>,
}

impl AccessPlan {
    pub fn stages(&self) -> &[AccessStage] {
        &self.stages
    }

    /// The layout selected by the path.
    pub fn leaf(&self) -> &MemoryLayout {
        // A plan always has at least one stage.
        &self.stages[self.stages.len() - 1].layout
    }

    /// Total number of index arguments across all stages.
    pub fn coordinates(&self) -> usize {
        self.stages.iter().map(AccessStage::coordinates).sum()
    }
}

/// State of the path fold.
struct LayoutPath {
    enclosing: MemoryLayout,
    layout: MemoryLayout,
    offset: u64,
    open: Vec<OpenIndex>,
    stages: Vec<AccessStage>,
}

impl LayoutPath {
    fn root(layout: &MemoryLayout) -> LayoutPath {
        LayoutPath {
            enclosing: layout.clone(),
            layout: layout.clone(),
            offset: 0,
            open: Vec::new(),
            stages: Vec::new(),
        }
    }

    fn walk(layout: &MemoryLayout, elements: &[PathElement]) -> Result<LayoutPath> {
        elements
            .iter()
            .try_fold(LayoutPath::root(layout), |path, element| path.step(element))
    }

    fn step(mut self, element: &PathElement) -> Result<LayoutPath> {
        match element {
            PathElement::GroupElementByName(name) => {
                let group = self.group(element)?;
                let index = group.member_index(name).ok_or_else(|| {
                    ill_formed(element, format!("no member named '{name}' in {}", self.layout))
                })?;
                self.select_member(index)
            }
            PathElement::GroupElementByIndex(index) => {
                let group = self.group(element)?;
                let count = group.member_layouts().len();
                match usize::try_from(*index).ok().filter(|&i| i < count) {
                    Some(i) => self.select_member(i),
                    None => Err(ill_formed(
                        element,
                        format!("member index {index} out of range for {count} members"),
                    )),
                }
            }
            PathElement::SequenceElementIndex(index) => {
                let (element_layout, count) = self.sequence(element)?;
                if *index >= count {
                    return Err(ill_formed(
                        element,
                        format!("index {index} out of range for {count} elements"),
                    ));
                }
                let delta = index
                    .checked_mul(element_layout.byte_size())
                    .ok_or_else(|| ill_formed(element, "offset overflow"))?;
                self.advance(delta, element_layout)
            }
            PathElement::SequenceElementRange { start, step } => {
                let (element_layout, count) = self.sequence(element)?;
                if *step == 0 {
                    return Err(ill_formed(element, "range step must not be zero"));
                }
                if *start >= count {
                    return Err(ill_formed(
                        element,
                        format!("range start {start} out of range for {count} elements"),
                    ));
                }
                let size = element_layout.byte_size();
                let span = if *step > 0 { count - start } else { start + 1 };
                let bound = span.div_ceil(step.unsigned_abs());
                let stride = i64::try_from(size)
                    .ok()
                    .and_then(|size| size.checked_mul(*step))
                    .ok_or_else(|| ill_formed(element, "stride overflow"))?;
                self.open.push(OpenIndex { stride, bound });
                self.advance(start * size, element_layout)
            }
            PathElement::SequenceElement => {
                let (element_layout, count) = self.sequence(element)?;
                let stride = i64::try_from(element_layout.byte_size())
                    .map_err(|_| ill_formed(element, "stride overflow"))?;
                self.open.push(OpenIndex {
                    stride,
                    bound: count,
                });
                self.advance(0, element_layout)
            }
            PathElement::Dereference => {
                let target = match &self.layout {
                    MemoryLayout::Value(value) if value.is_address() => {
                        value.target_layout().cloned().ok_or_else(|| {
                            ill_formed(element, format!("{} has no target layout", self.layout))
                        })?
                    }
                    _ => {
                        return Err(ill_formed(
                            element,
                            format!("{} is not an address layout", self.layout),
                        ));
                    }
                };
                let stage = self.finish();
                let mut next = LayoutPath::root(&target);
                next.stages = stage;
                Ok(next)
            }
        }
    }

    fn group(&self, element: &PathElement) -> Result<crate::layout::GroupLayout> {
        self.layout
            .as_group()
            .cloned()
            .ok_or_else(|| ill_formed(element, format!("{} is not a group layout", self.layout)))
    }

    fn sequence(&self, element: &PathElement) -> Result<(MemoryLayout, u64)> {
        self.layout
            .as_sequence()
            .map(|s| (s.element_layout().clone(), s.element_count()))
            .ok_or_else(|| {
                ill_formed(element, format!("{} is not a sequence layout", self.layout))
            })
    }

    fn select_member(self, index: usize) -> Result<LayoutPath> {
        let (delta, member) = match self.layout.as_group() {
            Some(group) => (
                group.member_offset(index),
                group.member_layouts()[index].clone(),
            ),
            None => unreachable!("member selection on a group layout"),
        };
        self.advance(delta, member)
    }

    fn advance(mut self, delta: u64, layout: MemoryLayout) -> Result<LayoutPath> {
        self.offset = self
            .offset
            .checked_add(delta)
            .ok_or_else(|| Error::invalid_arg("path", "offset overflow"))?;
        self.layout = layout;
        Ok(self)
    }

    fn offset_handle(&self) -> OffsetHandle {
        OffsetHandle {
            static_offset: self.offset,
            open: self.open.clone(),
        }
    }

    /// Closes the current stage and returns every stage so far.
    fn finish(self) -> Vec<AccessStage> {
        let offsets = self.offset_handle();
        let mut stages = self.stages;
        stages.push(AccessStage {
            enclosing: self.enclosing,
            enclosing_offsets: OffsetHandle::default(),
            offsets,
            layout: self.layout,
        });
        stages
    }
}

fn ill_formed(element: &PathElement, message: impl std::fmt::Display) -> Error {
    Error::invalid_arg("path", format!("bad layout path at {element}: {message}"))
}

fn reject(elements: &[PathElement], operation: &str, open: bool) -> Result<()> {
    for element in elements {
        if element.is_dereference() || (open && element.is_open()) {
            return Err(Error::invalid_arg(
                "path",
                format!("{operation} does not accept {element}"),
            ));
        }
    }
    Ok(())
}

impl MemoryLayout {
    /// The offset of the layout selected by a closed path.
    ///
    /// Fails if the path is ill-formed for this layout, or contains open or
    /// dereference elements.
    pub fn byte_offset(&self, elements: &[PathElement]) -> Result<u64> {
        reject(elements, "byte_offset", true)?;
        Ok(LayoutPath::walk(self, elements)?.offset)
    }

    /// An offset computation for a path that may contain open elements.
    pub fn byte_offset_handle(&self, elements: &[PathElement]) -> Result<OffsetHandle> {
        reject(elements, "byte_offset_handle", false)?;
        Ok(LayoutPath::walk(self, elements)?.offset_handle())
    }

    /// The layout at the end of a path. Sequence elements, open or not,
    /// select the element layout.
    pub fn select(&self, elements: &[PathElement]) -> Result<MemoryLayout> {
        reject(elements, "select", false)?;
        Ok(LayoutPath::walk(self, elements)?.layout)
    }

    /// Resolves a path, dereferences included, into the stages an accessor
    /// walks.
    pub fn access_plan(&self, elements: &[PathElement]) -> Result<AccessPlan> {
        Ok(AccessPlan {
            stages: LayoutPath::walk(self, elements)?.finish(),
        })
    }

    /// Like [`MemoryLayout::access_plan`], with a leading unbounded index that
    /// selects the `index`-th consecutive instance of this layout.
    pub fn array_element_access_plan(&self, elements: &[PathElement]) -> Result<AccessPlan> {
        let stride = i64::try_from(self.byte_size())
            .map_err(|_| Error::invalid_arg("layout", "layout too large for array access"))?;
        let mut plan = self.access_plan(elements)?;
        let first = &mut plan.stages[0];
        first.enclosing_offsets =
            std::mem::take(&mut first.enclosing_offsets).with_leading(OpenIndex {
                stride,
                bound: u64::MAX,
            });
        Ok(plan)
    }
}
