//! Checked access to native and heap memory.
//!
//! An [`Arena`] owns a [`Scope`] and allocates [`MemorySegment`]s in it. Every
//! access through a segment is checked against its bounds, the alignment of
//! the layout used, the liveness of its scope and the scope's thread
//! confinement. Layout paths turn into typed accessors through
//! [`LayoutHandles`].
//!
//! ```
//! use memseg_layout::value::INT;
//! use memseg_segment::{Arena, SegmentAllocator};
//!
//! let arena = Arena::of_confined();
//! let ints = arena.allocate(40, 4).unwrap();
//! for i in 0..10 {
//!     ints.set_at_index(&INT, i, i as i32).unwrap();
//! }
//! assert_eq!(ints.get_at_index::<i32>(&INT, 9).unwrap(), 9);
//!
//! arena.close().unwrap();
//! assert!(ints.get_at_index::<i32>(&INT, 0).is_err());
//! ```

pub mod allocator;
pub mod arena;
pub mod carrier;
pub mod charset;
pub mod handles;
mod native;
pub mod restricted;
pub mod scope;
pub mod segment;

pub use allocator::{PrefixAllocator, SegmentAllocator, SlicingAllocator};
pub use arena::{Arena, ArenaBuilder, ArenaOptions};
pub use carrier::ValueCarrier;
pub use charset::Charset;
pub use handles::{LayoutHandles, SliceHandle, VarHandle};
pub use memseg_page_alloc::mapped::MapMode;
pub use restricted::RestrictedAccess;
pub use scope::{Released, Scope, ScopeKind};
pub use segment::{MemorySegment, SegmentKind};

#[cfg(test)]
mod tests;
