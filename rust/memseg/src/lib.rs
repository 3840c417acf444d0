//! # memseg: checked access to foreign memory
//!
//! memseg describes the shape of raw memory with composable layouts and reads
//! and writes it through segments whose every access is checked. A segment
//! knows its bounds, the alignment an access requires, the scope that keeps
//! its memory alive, and which threads may touch it. A failed check is an
//! `Err`, never undefined behavior.
//!
//! ## Module Organization
//!
//! * [`layout`] - memory layouts, layout paths and function descriptors
//! * [`segment`] - scopes, arenas, segments, allocators and typed handles
//! * [`common`] - the error taxonomy and alignment helpers shared by all crates
//!
//! ### Support Modules
//!
//! * [`support::common_traits`] - ownership of the blocks that back segments
//! * [`support::page_alloc`] - page-granular buffers and file mappings
//!
//! ## Getting Started
//!
//! ```
//! use memseg::{Arena, LayoutHandles, MemoryLayout, PathElement, SegmentAllocator};
//! use memseg::layout::value::INT;
//!
//! let point = MemoryLayout::struct_layout([INT.with_name("x"), INT.with_name("y")]).unwrap();
//! let points = MemoryLayout::sequence_layout(4, point).unwrap();
//!
//! let arena = Arena::of_confined();
//! let segment = arena.allocate_layout(&points).unwrap();
//! let ys = points
//!     .var_handle(&[PathElement::sequence_element(), PathElement::group_element("y")])
//!     .unwrap();
//! ys.set(&segment, 0, &[3], 42i32).unwrap();
//! assert_eq!(segment.get::<i32>(&INT, 28).unwrap(), 42);
//!
//! arena.close().unwrap();
//! assert!(ys.get::<i32>(&segment, 0, &[3]).is_err());
//! ```
//!
//! ## Lifetimes and threads
//!
//! Confined arenas may only be used, and closed, by the thread that created
//! them. Shared arenas may be used from any thread, and closing one waits for
//! accesses in flight. Automatic arenas release their memory once the arena
//! and every segment allocated from it are dropped. The global arena never
//! releases anything.

pub use memseg_common as common;
pub use memseg_layout as layout;
pub use memseg_segment as segment;

pub use memseg_common::{
    Result,
    error::{Error, ErrorCategory, ErrorKind},
};
pub use memseg_layout::{
    ByteOrder, Carrier, FunctionDescriptor, GroupPolicy, MemoryLayout, PathElement, ValueLayout,
};
pub use memseg_segment::{
    Arena, ArenaBuilder, ArenaOptions, Charset, LayoutHandles, MapMode, MemorySegment,
    PrefixAllocator, RestrictedAccess, Scope, ScopeKind, SegmentAllocator, SegmentKind,
    SliceHandle, SlicingAllocator, ValueCarrier, VarHandle,
};

pub mod support {
    pub use memseg_common_traits as common_traits;
    pub use memseg_page_alloc as page_alloc;
}
