//! Escape hatches that bypass the safety derivation of segments.
//!
//! Everything here can fabricate a segment over memory the library knows
//! nothing about. The operations hang off [`RestrictedAccess`], which can only
//! be obtained through an `unsafe` constructor, so every use site is marked
//! `unsafe` and can be found by searching for the type.

use memseg_common::{Result, error::Error};
use memseg_layout::{MemoryLayout, ValueLayout};

use crate::arena::Arena;
use crate::scope::Scope;
use crate::segment::{MemorySegment, SegmentKind};

/// Capability to call the restricted segment operations.
#[derive(Debug, Clone, Copy)]
pub struct RestrictedAccess {
    _private: (),
}

impl RestrictedAccess {
    /// # Safety
    ///
    /// The caller takes responsibility for every segment produced through
    /// the returned token: each must describe memory that is valid for its
    /// whole size, for as long as its scope is alive.
    pub unsafe fn new() -> RestrictedAccess {
        RestrictedAccess { _private: () }
    }

    /// A zero-length native segment of the global scope at `address`.
    ///
    /// The result must be widened with [`RestrictedAccess::reinterpret`]
    /// before it can be accessed.
    pub fn of_address(&self, address: u64) -> MemorySegment {
        MemorySegment::native(SegmentKind::Native, address, 0, false, Scope::global())
    }

    /// The same memory and scope under a caller-asserted size.
    pub fn reinterpret(&self, segment: &MemorySegment, byte_size: u64) -> Result<MemorySegment> {
        check_native(segment, "reinterpret")?;
        segment.scope().check_thread()?;
        Ok(segment.reinterpreted(byte_size, segment.scope().clone()))
    }

    /// The same memory under a caller-asserted size, owned by `arena`'s
    /// scope.
    ///
    /// `cleanup` runs exactly once, when that scope ends, with a zero-length
    /// segment of the global scope at the same address.
    pub fn reinterpret_in(
        &self,
        segment: &MemorySegment,
        byte_size: u64,
        arena: &Arena,
        cleanup: Option<Box<dyn FnOnce(MemorySegment) + Send>>,
    ) -> Result<MemorySegment> {
        check_native(segment, "reinterpret")?;
        let scope = arena.scope();
        scope.check_valid_state()?;
        if let Some(cleanup) = cleanup {
            let address = segment.address();
            scope.register_cleanup(Box::new(move || {
                cleanup(MemorySegment::native(
                    SegmentKind::Native,
                    address,
                    0,
                    false,
                    Scope::global(),
                ))
            }))?;
        }
        Ok(segment.reinterpreted(byte_size, scope.clone()))
    }

    /// The same memory and size, owned by `arena`'s scope.
    pub fn reinterpret_scope(&self, segment: &MemorySegment, arena: &Arena) -> Result<MemorySegment> {
        self.reinterpret_in(segment, segment.byte_size(), arena, None)
    }

    /// An address layout that dereferences to `target`.
    pub fn with_target_layout(&self, layout: &ValueLayout, target: MemoryLayout) -> Result<ValueLayout> {
        // SAFETY: the token's constructor carries the obligation.
        unsafe { layout.with_target_layout(target) }
    }
}

fn check_native(segment: &MemorySegment, operation: &str) -> Result<()> {
    if segment.kind() == SegmentKind::Heap {
        return Err(Error::unsupported(operation, "heap segments cannot be reinterpreted"));
    }
    Ok(())
}
