//! `MemoryOwner`: a trait for types that own a block of memory backing segments.

/// A type that owns a block of memory at a stable address.
///
/// Segments do not own memory; a scope keeps a list of `MemoryOwner`s and drops
/// them when it ends. Until then any number of segment views may read and write
/// through the reported pointer.
///
/// # Safety
///
/// Implementors must guarantee that:
/// - The memory described by `memory()` stays valid, writable (unless the
///   owner is documented as read-only) and at the same address for the whole
///   lifetime of the owner, including across moves of the owner value.
/// - The block is not freed or reused until the owner is dropped.
/// - `ptr` is aligned to at least `alignment`, and `len <= capacity`.
pub unsafe trait MemoryOwner: Send + Sync {
    /// Returns information about the owned memory block.
    fn memory(&self) -> MemoryAllocation;

    /// Short label of the backing kind, used in diagnostics.
    fn describe(&self) -> &'static str {
        "memory"
    }
}

/// Represents a block of allocated memory with its size information.
#[derive(Debug, Clone, Copy)]
pub struct MemoryAllocation {
    /// Pointer to the start of the allocated memory.
    pub ptr: *mut u8,
    /// Length of the usable memory in bytes.
    pub len: usize,
    /// Total capacity of the allocated memory in bytes.
    pub capacity: usize,
    /// Formal alignment of the memory block.
    pub alignment: usize,
}

impl MemoryAllocation {
    /// Address of the block as an integer.
    #[inline]
    pub fn address(&self) -> u64 {
        self.ptr as usize as u64
    }
}
