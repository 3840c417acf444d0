//! Arenas: allocators that own a scope and release everything they
//! allocated when the scope ends.

use std::fs::File;
use std::sync::OnceLock;
use std::thread::ThreadId;

use memseg_common::{Result, error::Error, result::verify_allocation};
use memseg_common_traits::memory_owner::MemoryOwner;
use memseg_page_alloc::mapped::{MapMode, MappedRegion};
use memseg_page_alloc::page_buffer::PageBuffer;

use crate::allocator::SegmentAllocator;
use crate::native::NativeBlock;
use crate::scope::{Scope, ScopeKind};
use crate::segment::{MemorySegment, SegmentKind};

/// Tuning knobs of an arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaOptions {
    /// Zero newly allocated memory. Page-backed allocations are always zeroed.
    pub zero_fill: bool,
    /// Allocations of at least this many bytes take whole pages from the OS
    /// instead of the global allocator.
    pub page_threshold: Option<u64>,
    /// Shown in log messages.
    pub label: Option<String>,
}

impl Default for ArenaOptions {
    fn default() -> Self {
        ArenaOptions {
            zero_fill: true,
            page_threshold: None,
            label: None,
        }
    }
}

/// Builds an arena with non-default options.
///
/// ```
/// use memseg_segment::{Arena, SegmentAllocator};
///
/// let arena = Arena::builder()
///     .shared()
///     .page_threshold(1 << 20)
///     .label("decoder")
///     .build();
/// let segment = arena.allocate(64, 8).unwrap();
/// assert_eq!(segment.byte_size(), 64);
/// ```
#[derive(Debug, Clone)]
pub struct ArenaBuilder {
    kind: ScopeKind,
    options: ArenaOptions,
}

impl ArenaBuilder {
    pub fn confined(mut self) -> Self {
        self.kind = ScopeKind::Confined;
        self
    }

    pub fn shared(mut self) -> Self {
        self.kind = ScopeKind::Shared;
        self
    }

    pub fn automatic(mut self) -> Self {
        self.kind = ScopeKind::Automatic;
        self
    }

    pub fn zero_fill(mut self, zero_fill: bool) -> Self {
        self.options.zero_fill = zero_fill;
        self
    }

    pub fn page_threshold(mut self, bytes: u64) -> Self {
        self.options.page_threshold = Some(bytes);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.options.label = Some(label.into());
        self
    }

    pub fn options(mut self, options: ArenaOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Arena {
        Arena::with_options(self.kind, self.options)
    }
}

/// Owns a scope and allocates native segments in it.
///
/// Confined and shared arenas end with [`Arena::close`], or on drop.
/// Automatic arenas end once the arena and every segment allocated from it
/// are gone. The global arena never ends.
pub struct Arena {
    scope: Scope,
    options: ArenaOptions,
}

impl Arena {
    /// An arena usable only by the current thread.
    pub fn of_confined() -> Arena {
        Arena::with_options(ScopeKind::Confined, ArenaOptions::default())
    }

    /// An arena usable, and closable, by any thread.
    pub fn of_shared() -> Arena {
        Arena::with_options(ScopeKind::Shared, ArenaOptions::default())
    }

    /// An arena whose memory is released when nothing references it anymore.
    pub fn of_auto() -> Arena {
        Arena::with_options(ScopeKind::Automatic, ArenaOptions::default())
    }

    /// The arena of the global scope. Its memory is never released.
    pub fn global() -> &'static Arena {
        static GLOBAL: OnceLock<Arena> = OnceLock::new();
        GLOBAL.get_or_init(|| Arena {
            scope: Scope::global(),
            options: ArenaOptions::default(),
        })
    }

    /// A builder for a confined arena; pick another kind on the builder.
    pub fn builder() -> ArenaBuilder {
        ArenaBuilder {
            kind: ScopeKind::Confined,
            options: ArenaOptions::default(),
        }
    }

    fn with_options(kind: ScopeKind, options: ArenaOptions) -> Arena {
        let scope = Scope::new(kind);
        log::debug!(
            "arena {} opened: scope #{} ({:?})",
            options.label.as_deref().unwrap_or("<unnamed>"),
            scope.id(),
            kind
        );
        Arena { scope, options }
    }

    #[inline]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[inline]
    pub fn kind(&self) -> ScopeKind {
        self.scope.kind()
    }

    #[inline]
    pub fn options(&self) -> &ArenaOptions {
        &self.options
    }

    /// Whether `thread` owns this arena. Only confined arenas have an owner.
    pub fn is_owned_by(&self, thread: ThreadId) -> bool {
        self.scope.owner() == Some(thread)
    }

    /// Ends the arena's scope and releases all of its memory.
    ///
    /// Every segment allocated from the arena becomes permanently
    /// inaccessible. Fails if the scope already ended, if a confined arena is
    /// closed by another thread, or if a `while_alive` action holds the scope.
    /// Automatic and global arenas cannot be closed.
    pub fn close(&self) -> Result<()> {
        let released = self.scope.close()?;
        log::debug!(
            "arena {} closed: scope #{}, {} block(s), {} bytes, {} cleanup action(s)",
            self.label(),
            self.scope.id(),
            released.blocks,
            released.bytes,
            released.cleanups
        );
        Ok(())
    }

    /// Maps `size` bytes of `file` starting at byte `offset` into a segment
    /// owned by this arena. Read-only mappings yield read-only segments.
    pub fn map_file(&self, file: &File, offset: u64, size: u64, mode: MapMode) -> Result<MemorySegment> {
        let len = usize::try_from(size)
            .map_err(|_| Error::invalid_arg("size", "exceeds the address space"))?;
        let region = MappedRegion::map(file, offset, len, mode)
            .map_err(|e| Error::io(format!("map {size} bytes at offset {offset}"), e))?;
        let address = region.memory().address();
        self.scope.register_block(Box::new(region))?;
        log::debug!(
            "arena {} mapped {size} bytes at {address:#x} ({mode:?})",
            self.label()
        );
        Ok(MemorySegment::native(
            SegmentKind::Mapped,
            address,
            size,
            mode == MapMode::ReadOnly,
            self.scope.clone(),
        ))
    }

    fn allocate_block(&self, size: u64, align: u64) -> Result<Box<dyn MemoryOwner>> {
        let use_pages = self.options.page_threshold.is_some_and(|threshold| size >= threshold)
            && align <= PageBuffer::page_size() as u64;
        if use_pages {
            let len = usize::try_from(size)
                .map_err(|_| Error::invalid_arg("byte_size", "exceeds the address space"))?;
            let pages = PageBuffer::allocate(len)
                .map_err(|e| Error::io(format!("allocate {size} bytes of pages"), e))?;
            Ok(Box::new(pages))
        } else {
            Ok(Box::new(NativeBlock::allocate(
                size,
                align,
                self.options.zero_fill,
            )?))
        }
    }

    fn label(&self) -> &str {
        self.options.label.as_deref().unwrap_or("<unnamed>")
    }
}

impl SegmentAllocator for Arena {
    /// Allocates a new native segment of `byte_size` bytes whose address is a
    /// multiple of `byte_alignment`, owned by this arena's scope.
    fn allocate(&self, byte_size: u64, byte_alignment: u64) -> Result<MemorySegment> {
        verify_allocation(byte_size, byte_alignment)?;
        self.scope.check_valid_state()?;
        let block = self.allocate_block(byte_size, byte_alignment)?;
        let memory = block.memory();
        let backing = block.describe();
        self.scope.register_block(block)?;
        log::trace!(
            "arena {} allocated {byte_size} bytes (align {byte_alignment}) at {:#x} from {backing}",
            self.label(),
            memory.address()
        );
        Ok(MemorySegment::native(
            SegmentKind::Native,
            memory.address(),
            byte_size,
            false,
            self.scope.clone(),
        ))
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        match self.scope.kind() {
            ScopeKind::Confined | ScopeKind::Shared if self.scope.is_alive() => {
                if let Err(e) = self.close() {
                    log::warn!(
                        "arena {} dropped without close and could not be closed: {e}; \
                         memory is released with the last segment of scope #{}",
                        self.label(),
                        self.scope.id()
                    );
                }
            }
            _ => {}
        }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("scope", &self.scope)
            .field("options", &self.options)
            .finish()
    }
}
