//! The closed `MemoryLayout` hierarchy and its size/alignment derivation rules.

use std::sync::Arc;

use memseg_common::{Result, error::Error, verify_arg};

use crate::value::{Carrier, ValueLayout};

/// A description of the binary shape of a piece of data at rest.
///
/// Layouts are immutable values. Size and alignment are derived once, at
/// construction, from the substructure; the `with_*` methods return new
/// layouts. Equality is structural, including names and alignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemoryLayout {
    /// A scalar or pointer value.
    Value(ValueLayout),
    /// Unused bytes, typically inserted to honor a member's alignment.
    Padding(PaddingLayout),
    /// A homogeneous repetition of an element layout.
    Sequence(SequenceLayout),
    /// A struct (members laid out one after another) or union (members
    /// overlapping at offset zero).
    Group(GroupLayout),
}

/// Size-only layout; its natural alignment is 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaddingLayout {
    byte_size: u64,
    byte_alignment: u64,
    name: Option<Arc<str>>,
}

/// `element_count` consecutive copies of an element layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceLayout {
    element: Arc<MemoryLayout>,
    element_count: u64,
    byte_size: u64,
    byte_alignment: u64,
    name: Option<Arc<str>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    Struct,
    Union,
}

/// How a group treats member alignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum GroupPolicy {
    /// Every member must start at an offset that is a multiple of its
    /// alignment; the group's alignment is the largest member alignment and
    /// cannot be overridden with a weaker one.
    #[default]
    Strict,
    /// Members may start at any offset; the group's natural alignment is 1.
    /// Misaligned members must be declared with a weak enough alignment to be
    /// accessible.
    Packed,
}

/// A struct or union of member layouts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupLayout {
    kind: GroupKind,
    policy: GroupPolicy,
    members: Arc<[MemoryLayout]>,
    byte_size: u64,
    natural_alignment: u64,
    byte_alignment: u64,
    name: Option<Arc<str>>,
}

impl MemoryLayout {
    /// A struct layout: members follow each other with no implicit padding.
    pub fn struct_layout<I, L>(members: I) -> Result<MemoryLayout>
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        Self::struct_layout_with(GroupPolicy::Strict, members)
    }

    /// A struct layout built under an explicit alignment policy.
    pub fn struct_layout_with<I, L>(policy: GroupPolicy, members: I) -> Result<MemoryLayout>
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        GroupLayout::new(GroupKind::Struct, policy, members).map(MemoryLayout::Group)
    }

    /// A union layout: all members start at offset zero.
    pub fn union_layout<I, L>(members: I) -> Result<MemoryLayout>
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        GroupLayout::new(GroupKind::Union, GroupPolicy::Strict, members).map(MemoryLayout::Group)
    }

    pub fn sequence_layout(element_count: u64, element: impl Into<MemoryLayout>) -> Result<MemoryLayout> {
        SequenceLayout::new(element_count, element.into()).map(MemoryLayout::Sequence)
    }

    pub fn padding_layout(byte_size: u64) -> Result<MemoryLayout> {
        verify_arg!(byte_size, byte_size > 0);
        Ok(MemoryLayout::Padding(PaddingLayout {
            byte_size,
            byte_alignment: 1,
            name: None,
        }))
    }

    pub fn byte_size(&self) -> u64 {
        match self {
            MemoryLayout::Value(v) => v.byte_size(),
            MemoryLayout::Padding(p) => p.byte_size,
            MemoryLayout::Sequence(s) => s.byte_size,
            MemoryLayout::Group(g) => g.byte_size,
        }
    }

    pub fn byte_alignment(&self) -> u64 {
        match self {
            MemoryLayout::Value(v) => v.byte_alignment(),
            MemoryLayout::Padding(p) => p.byte_alignment,
            MemoryLayout::Sequence(s) => s.byte_alignment,
            MemoryLayout::Group(g) => g.byte_alignment,
        }
    }

    /// The alignment this layout has when not overridden.
    pub fn natural_alignment(&self) -> u64 {
        match self {
            MemoryLayout::Value(v) => v.carrier().byte_size(),
            MemoryLayout::Padding(_) => 1,
            MemoryLayout::Sequence(s) => s.element.byte_alignment(),
            MemoryLayout::Group(g) => g.natural_alignment,
        }
    }

    pub fn has_natural_alignment(&self) -> bool {
        self.byte_alignment() == self.natural_alignment()
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            MemoryLayout::Value(v) => v.name(),
            MemoryLayout::Padding(p) => p.name.as_deref(),
            MemoryLayout::Sequence(s) => s.name.as_deref(),
            MemoryLayout::Group(g) => g.name.as_deref(),
        }
    }

    pub fn with_name(&self, name: impl Into<Arc<str>>) -> MemoryLayout {
        self.rename(Some(name.into()))
    }

    pub fn without_name(&self) -> MemoryLayout {
        self.rename(None)
    }

    /// Returns a copy of this layout with the given alignment.
    ///
    /// Fails if `byte_alignment` is not a power of two, or if it is weaker than
    /// what the structure of a sequence or group requires.
    pub fn with_byte_alignment(&self, byte_alignment: u64) -> Result<MemoryLayout> {
        verify_arg!(byte_alignment, byte_alignment.is_power_of_two());
        let mut layout = self.clone();
        match &mut layout {
            MemoryLayout::Value(v) => *v = v.with_byte_alignment(byte_alignment)?,
            MemoryLayout::Padding(p) => p.byte_alignment = byte_alignment,
            MemoryLayout::Sequence(s) => {
                if byte_alignment < s.element.byte_alignment() {
                    return Err(weaker_alignment(byte_alignment, self));
                }
                s.byte_alignment = byte_alignment;
            }
            MemoryLayout::Group(g) => {
                if byte_alignment < g.natural_alignment {
                    return Err(weaker_alignment(byte_alignment, self));
                }
                g.byte_alignment = byte_alignment;
            }
        }
        Ok(layout)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, MemoryLayout::Value(_))
    }

    pub fn is_address(&self) -> bool {
        matches!(self, MemoryLayout::Value(v) if v.is_address())
    }

    pub fn is_padding(&self) -> bool {
        matches!(self, MemoryLayout::Padding(_))
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, MemoryLayout::Sequence(_))
    }

    pub fn is_group(&self) -> bool {
        matches!(self, MemoryLayout::Group(_))
    }

    pub fn as_value(&self) -> Option<&ValueLayout> {
        match self {
            MemoryLayout::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&SequenceLayout> {
        match self {
            MemoryLayout::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupLayout> {
        match self {
            MemoryLayout::Group(g) => Some(g),
            _ => None,
        }
    }

    /// The carrier, for value layouts.
    pub fn carrier(&self) -> Option<Carrier> {
        self.as_value().map(ValueLayout::carrier)
    }

    fn rename(&self, name: Option<Arc<str>>) -> MemoryLayout {
        match self {
            MemoryLayout::Value(v) => MemoryLayout::Value(match name {
                Some(name) => v.with_name(name),
                None => v.without_name(),
            }),
            MemoryLayout::Padding(p) => MemoryLayout::Padding(PaddingLayout {
                name,
                ..p.clone()
            }),
            MemoryLayout::Sequence(s) => MemoryLayout::Sequence(SequenceLayout {
                name,
                ..s.clone()
            }),
            MemoryLayout::Group(g) => MemoryLayout::Group(GroupLayout { name, ..g.clone() }),
        }
    }
}

impl From<ValueLayout> for MemoryLayout {
    fn from(layout: ValueLayout) -> Self {
        MemoryLayout::Value(layout)
    }
}

impl From<&ValueLayout> for MemoryLayout {
    fn from(layout: &ValueLayout) -> Self {
        MemoryLayout::Value(layout.clone())
    }
}

impl From<SequenceLayout> for MemoryLayout {
    fn from(layout: SequenceLayout) -> Self {
        MemoryLayout::Sequence(layout)
    }
}

impl From<GroupLayout> for MemoryLayout {
    fn from(layout: GroupLayout) -> Self {
        MemoryLayout::Group(layout)
    }
}

impl From<&MemoryLayout> for MemoryLayout {
    fn from(layout: &MemoryLayout) -> Self {
        layout.clone()
    }
}

impl SequenceLayout {
    fn new(element_count: u64, element: MemoryLayout) -> Result<SequenceLayout> {
        let element_size = element.byte_size();
        let element_alignment = element.byte_alignment();
        if !element_size.is_multiple_of(element_alignment) {
            return Err(Error::invalid_arg(
                "element",
                format!(
                    "element layout size {element_size} is not a multiple of its alignment {element_alignment}"
                ),
            ));
        }
        let byte_size = element_size.checked_mul(element_count).ok_or_else(|| {
            Error::invalid_arg(
                "element_count",
                format!("sequence of {element_count} x {element_size} bytes overflows"),
            )
        })?;
        Ok(SequenceLayout {
            element: Arc::new(element),
            element_count,
            byte_size,
            byte_alignment: element_alignment,
            name: None,
        })
    }

    pub fn element_layout(&self) -> &MemoryLayout {
        &self.element
    }

    pub fn element_count(&self) -> u64 {
        self.element_count
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn byte_alignment(&self) -> u64 {
        self.byte_alignment
    }

    /// The same sequence with a different element count; name and alignment
    /// are preserved.
    pub fn with_element_count(&self, element_count: u64) -> Result<SequenceLayout> {
        let resized = SequenceLayout::new(element_count, (*self.element).clone())?;
        Ok(SequenceLayout {
            byte_alignment: self.byte_alignment,
            name: self.name.clone(),
            ..resized
        })
    }

    /// Collapses nested sequences into one sequence of the innermost
    /// non-sequence element.
    ///
    /// `[3:[4:i4]]` flattens to `[12:i4]`. Fails if the total element count
    /// does not fit in `u64`, which only zero-sized elements allow.
    pub fn flatten(&self) -> Result<SequenceLayout> {
        let mut count = self.element_count;
        let mut element = self.element.as_ref();
        while let MemoryLayout::Sequence(inner) = element {
            count = count.checked_mul(inner.element_count).ok_or_else(|| {
                Error::invalid_arg(
                    "element_count",
                    format!("{count} x {} elements overflow", inner.element_count),
                )
            })?;
            element = inner.element.as_ref();
        }
        Ok(SequenceLayout {
            element: Arc::new(element.clone()),
            element_count: count,
            byte_size: self.byte_size,
            byte_alignment: element.byte_alignment(),
            name: None,
        })
    }

    /// Rearranges the flattened elements of this sequence into nested
    /// sequences with the given counts, outermost first.
    ///
    /// At most one count may be `-1`, in which case it is inferred.
    /// `[12:i4].reshape(&[-1, 4])` yields `[3:[4:i4]]`.
    pub fn reshape(&self, counts: &[i64]) -> Result<SequenceLayout> {
        verify_arg!(counts, !counts.is_empty());
        let flat = self.flatten()?;
        let total = flat.element_count;

        let mut inferred = None;
        let mut product: u64 = 1;
        for (i, &count) in counts.iter().enumerate() {
            if count == -1 {
                if inferred.replace(i).is_some() {
                    return Err(Error::invalid_arg("counts", "more than one inferred count"));
                }
            } else if count < 0 {
                return Err(Error::invalid_arg("counts", format!("invalid count {count}")));
            } else {
                product = product
                    .checked_mul(count as u64)
                    .ok_or_else(|| Error::invalid_arg("counts", "element count overflow"))?;
            }
        }

        let mut resolved: Vec<u64> = counts.iter().map(|&c| c.max(0) as u64).collect();
        if let Some(i) = inferred {
            if product == 0 || !total.is_multiple_of(product) {
                return Err(Error::invalid_arg(
                    "counts",
                    format!("cannot infer a count to reshape {total} elements"),
                ));
            }
            resolved[i] = total / product;
        } else if product != total {
            return Err(Error::invalid_arg(
                "counts",
                format!("reshape to {product} elements, sequence has {total}"),
            ));
        }

        let mut layout = (*flat.element).clone();
        for &count in resolved.iter().rev() {
            layout = MemoryLayout::Sequence(SequenceLayout::new(count, layout)?);
        }
        match layout {
            MemoryLayout::Sequence(s) => Ok(s),
            _ => unreachable!("counts is not empty"),
        }
    }
}

impl GroupLayout {
    fn new<I, L>(kind: GroupKind, policy: GroupPolicy, members: I) -> Result<GroupLayout>
    where
        I: IntoIterator<Item = L>,
        L: Into<MemoryLayout>,
    {
        let members: Arc<[MemoryLayout]> = members.into_iter().map(Into::into).collect();
        let mut byte_size: u64 = 0;
        let mut max_alignment: u64 = 1;
        for member in members.iter() {
            let alignment = member.byte_alignment();
            max_alignment = max_alignment.max(alignment);
            match kind {
                GroupKind::Struct => {
                    if policy == GroupPolicy::Strict && !byte_size.is_multiple_of(alignment) {
                        return Err(Error::invalid_arg(
                            "members",
                            format!(
                                "member {member} at offset {byte_size} violates its alignment {alignment}"
                            ),
                        ));
                    }
                    byte_size = byte_size.checked_add(member.byte_size()).ok_or_else(|| {
                        Error::invalid_arg("members", "struct size overflows")
                    })?;
                }
                GroupKind::Union => byte_size = byte_size.max(member.byte_size()),
            }
        }
        let natural_alignment = match policy {
            GroupPolicy::Strict => max_alignment,
            GroupPolicy::Packed => 1,
        };
        Ok(GroupLayout {
            kind,
            policy,
            members,
            byte_size,
            natural_alignment,
            byte_alignment: natural_alignment,
            name: None,
        })
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn policy(&self) -> GroupPolicy {
        self.policy
    }

    pub fn is_struct(&self) -> bool {
        self.kind == GroupKind::Struct
    }

    pub fn is_union(&self) -> bool {
        self.kind == GroupKind::Union
    }

    pub fn member_layouts(&self) -> &[MemoryLayout] {
        &self.members
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn byte_alignment(&self) -> u64 {
        self.byte_alignment
    }

    /// Offset of the member at `index`: the sum of the preceding member sizes
    /// for a struct, zero for a union.
    pub fn member_offset(&self, index: usize) -> u64 {
        match self.kind {
            GroupKind::Struct => self.members[..index].iter().map(MemoryLayout::byte_size).sum(),
            GroupKind::Union => 0,
        }
    }

    /// Index of the first member carrying `name`.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name() == Some(name))
    }
}

impl std::fmt::Display for MemoryLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let MemoryLayout::Value(v) = self {
            return std::fmt::Display::fmt(v, f);
        }
        if !self.has_natural_alignment() {
            write!(f, "{}%", self.byte_alignment())?;
        }
        match self {
            MemoryLayout::Value(_) => {}
            MemoryLayout::Padding(p) => write!(f, "x{}", p.byte_size)?,
            MemoryLayout::Sequence(s) => write!(f, "[{}:{}]", s.element_count, s.element)?,
            MemoryLayout::Group(g) => {
                let separator = match g.kind {
                    GroupKind::Struct => "",
                    GroupKind::Union => "|",
                };
                f.write_str("[")?;
                for (i, member) in g.members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(separator)?;
                    }
                    write!(f, "{member}")?;
                }
                f.write_str("]")?;
            }
        }
        if let Some(name) = self.name() {
            write!(f, "({name})")?;
        }
        Ok(())
    }
}

fn weaker_alignment(byte_alignment: u64, layout: &MemoryLayout) -> Error {
    Error::invalid_arg(
        "byte_alignment",
        format!(
            "alignment {byte_alignment} is weaker than the {} required by {layout}",
            layout.natural_alignment()
        ),
    )
}
