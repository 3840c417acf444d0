//! The layout algebra: descriptions of the binary shape of C-like data.
//!
//! A [`MemoryLayout`] is an immutable value describing size, alignment and
//! structure. Layouts compose into sequences, structs and unions, and
//! [`PathElement`] lists navigate into them to compute offsets
//! ([`OffsetHandle`]) or access plans ([`AccessPlan`]) that the segment
//! crate turns into typed accessors.
//!
//! ```
//! use memseg_layout::{MemoryLayout, PathElement, value};
//!
//! let tagged = MemoryLayout::struct_layout([
//!     MemoryLayout::from(value::BYTE.with_name("kind")),
//!     MemoryLayout::padding_layout(3).unwrap(),
//!     MemoryLayout::from(value::INT.with_name("value")),
//! ])
//! .unwrap();
//! assert_eq!(tagged.byte_size(), 8);
//! assert_eq!(tagged.byte_alignment(), 4);
//! assert_eq!(tagged.byte_offset(&[PathElement::group_element("value")]).unwrap(), 4);
//! ```

pub mod descriptor;
pub mod layout;
pub mod path;
pub mod value;

pub use descriptor::FunctionDescriptor;
pub use layout::{GroupKind, GroupLayout, GroupPolicy, MemoryLayout, PaddingLayout, SequenceLayout};
pub use path::{AccessPlan, AccessStage, OffsetHandle, OpenIndex, PathElement};
pub use value::{ByteOrder, Carrier, ValueLayout};
