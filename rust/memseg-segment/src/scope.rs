//! Lifetime authorities for segments.
//!
//! A [`Scope`] answers two questions for every access: is the memory still
//! there, and may the current thread touch it. It also owns the memory blocks
//! and cleanup actions registered by its arena, and releases each of them
//! exactly once when the scope ends.
//!
//! Shared scopes coordinate `close` with concurrent accesses through two
//! counters and a state word, all updated with `SeqCst` ordering:
//!
//! - an access increments `accesses`, then reads the state;
//! - `close` moves the state from `OPEN` to `CLOSING`, reads `pins`, and
//!   either restores `OPEN` or commits to `DRAINING`, then waits for
//!   `accesses` to reach zero before publishing `CLOSED`.
//!
//! Either the access observes a closing state and backs off, or `close`
//! observes the access and waits for it to finish. An access therefore sees
//! the scope alive for its whole duration.
//!
//! `CLOSING` only lasts while `close` reads `pins`, so waiting it out is
//! bounded. `DRAINING` is waited out by `close` alone: an access that sees
//! it fails at once. An access nested inside another access of the same
//! scope (a copy within one segment, say) thus never waits on a `close`
//! that is itself waiting on the outer access.

use std::sync::atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, ThreadId};

use memseg_common::{Result, error::Error};
use memseg_common_traits::memory_owner::MemoryOwner;

const OPEN: u8 = 0;
const CLOSING: u8 = 1;
const DRAINING: u8 = 2;
const CLOSED: u8 = 3;

/// How a scope ends and which threads may use it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Never ends; accessible from every thread.
    Global,
    /// Ends on explicit close by the owner thread, the only thread allowed to
    /// access it.
    Confined,
    /// Ends on explicit close from any thread; accessible from every thread.
    Shared,
    /// Ends when the arena and the last segment referencing it are dropped.
    Automatic,
}

/// A lifetime shared by an arena and every segment derived from it.
///
/// Cloning a `Scope` yields another handle to the same lifetime; equality is
/// identity of the lifetime.
#[derive(Clone)]
pub struct Scope(Arc<ScopeInner>);

struct ScopeInner {
    id: u64,
    kind: ScopeKind,
    owner: Option<ThreadId>,
    state: AtomicU8,
    /// Active `while_alive` actions.
    pins: AtomicUsize,
    /// In-flight transient accesses; only maintained for shared scopes.
    accesses: AtomicUsize,
    resources: Mutex<ResourceList>,
}

/// Memory blocks and cleanup actions released when a scope ends.
#[derive(Default)]
struct ResourceList {
    entries: Vec<Resource>,
}

enum Resource {
    Block(Box<dyn MemoryOwner>),
    Cleanup(Box<dyn FnOnce() + Send>),
}

/// What a scope released when it ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Released {
    pub blocks: usize,
    pub bytes: u64,
    pub cleanups: usize,
}

impl Scope {
    pub(crate) fn new(kind: ScopeKind) -> Scope {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let owner = match kind {
            ScopeKind::Confined => Some(thread::current().id()),
            _ => None,
        };
        Scope(Arc::new(ScopeInner {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            kind,
            owner,
            state: AtomicU8::new(OPEN),
            pins: AtomicUsize::new(0),
            accesses: AtomicUsize::new(0),
            resources: Mutex::new(ResourceList::default()),
        }))
    }

    /// An automatic scope that owns `block` from the start.
    pub(crate) fn owning(block: Box<dyn MemoryOwner>) -> Scope {
        let scope = Scope::new(ScopeKind::Automatic);
        scope.resources().entries.push(Resource::Block(block));
        scope
    }

    /// The scope that never ends.
    pub fn global() -> Scope {
        static GLOBAL: OnceLock<Scope> = OnceLock::new();
        GLOBAL
            .get_or_init(|| {
                let scope = Scope::new(ScopeKind::Global);
                log::debug!("scope #{} opened ({:?})", scope.id(), scope.kind());
                scope
            })
            .clone()
    }

    /// Process-unique identifier, used in diagnostics.
    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    pub fn kind(&self) -> ScopeKind {
        self.0.kind
    }

    /// The only thread allowed to use a confined scope.
    #[inline]
    pub fn owner(&self) -> Option<ThreadId> {
        self.0.owner
    }

    /// Whether the scope has not ended yet. A scope whose close has been
    /// decided no longer counts as alive, even while in-flight accesses
    /// finish.
    pub fn is_alive(&self) -> bool {
        matches!(self.0.state.load(Ordering::Acquire), OPEN | CLOSING)
    }

    /// Whether `thread` is permitted by the scope's confinement. Liveness is
    /// not considered.
    pub fn is_accessible_by(&self, thread: ThreadId) -> bool {
        self.0.owner.is_none_or(|owner| owner == thread)
    }

    /// Fails unless the scope is alive and accessible by the current thread.
    pub fn check_valid_state(&self) -> Result<()> {
        self.check_thread()?;
        if self.is_alive() {
            Ok(())
        } else {
            Err(Error::scope_not_alive(self.id()))
        }
    }

    /// Runs `action` while preventing the scope from closing.
    ///
    /// Fails if the scope is not alive (or not accessible) on entry. A
    /// concurrent `close` fails with `ScopeAcquired` while `action` runs.
    pub fn while_alive<R>(&self, action: impl FnOnce() -> R) -> Result<R> {
        self.check_thread()?;
        match self.0.kind {
            ScopeKind::Global | ScopeKind::Automatic => return Ok(action()),
            ScopeKind::Confined | ScopeKind::Shared => {}
        }
        loop {
            self.0.pins.fetch_add(1, Ordering::SeqCst);
            match self.0.state.load(Ordering::SeqCst) {
                OPEN => break,
                CLOSING => {
                    self.0.pins.fetch_sub(1, Ordering::SeqCst);
                    self.await_close_outcome();
                }
                _ => {
                    self.0.pins.fetch_sub(1, Ordering::SeqCst);
                    return Err(Error::scope_not_alive(self.id()));
                }
            }
        }
        let _pin = Unpin(&self.0.pins);
        Ok(action())
    }

    /// Runs a transient memory access, failing with a lifetime or
    /// confinement error instead of touching released memory.
    pub(crate) fn access<R>(&self, op: impl FnOnce() -> Result<R>) -> Result<R> {
        self.check_thread()?;
        match self.0.kind {
            ScopeKind::Global | ScopeKind::Automatic => op(),
            ScopeKind::Confined => {
                // Only this thread can close the scope, so no race is possible.
                if self.0.state.load(Ordering::Acquire) >= DRAINING {
                    return Err(Error::scope_not_alive(self.id()));
                }
                op()
            }
            ScopeKind::Shared => loop {
                self.0.accesses.fetch_add(1, Ordering::SeqCst);
                let guard = Unpin(&self.0.accesses);
                match self.0.state.load(Ordering::SeqCst) {
                    OPEN => return op(),
                    CLOSING => {
                        drop(guard);
                        self.await_close_outcome();
                    }
                    _ => return Err(Error::scope_not_alive(self.id())),
                }
            },
        }
    }

    /// Adds a memory block to the scope. If the scope is no longer alive the
    /// block is released immediately and an error returned.
    pub(crate) fn register_block(&self, block: Box<dyn MemoryOwner>) -> Result<()> {
        self.register(Resource::Block(block))
    }

    /// Adds an action to run exactly once, when the scope ends. If the scope
    /// is no longer alive the action is dropped without running.
    pub(crate) fn register_cleanup(&self, action: Box<dyn FnOnce() + Send>) -> Result<()> {
        self.register(Resource::Cleanup(action))
    }

    fn register(&self, resource: Resource) -> Result<()> {
        self.access(|| {
            self.resources().entries.push(resource);
            Ok(())
        })
    }

    /// Ends a confined or shared scope and releases its resources.
    pub(crate) fn close(&self) -> Result<Released> {
        match self.0.kind {
            ScopeKind::Global | ScopeKind::Automatic => {
                return Err(Error::unsupported(
                    "close",
                    format!("{:?} scopes cannot be closed explicitly", self.0.kind),
                ));
            }
            ScopeKind::Confined => {
                if self.0.owner != Some(thread::current().id()) {
                    return Err(Error::wrong_owner(self.id()));
                }
            }
            ScopeKind::Shared => {}
        }

        loop {
            match self.0.state.compare_exchange(
                OPEN,
                CLOSING,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(CLOSING) => self.await_close_outcome(),
                Err(_) => return Err(Error::scope_not_alive(self.id())),
            }
        }

        let holders = self.0.pins.load(Ordering::SeqCst);
        if holders > 0 {
            self.0.state.store(OPEN, Ordering::SeqCst);
            return Err(Error::scope_acquired(self.id(), holders));
        }
        self.0.state.store(DRAINING, Ordering::SeqCst);
        let mut spins = 0u32;
        while self.0.accesses.load(Ordering::SeqCst) > 0 {
            backoff(&mut spins);
        }
        self.0.state.store(CLOSED, Ordering::SeqCst);
        Ok(self.release())
    }

    fn await_close_outcome(&self) {
        let mut spins = 0u32;
        while self.0.state.load(Ordering::SeqCst) == CLOSING {
            backoff(&mut spins);
        }
    }

    fn release(&self) -> Released {
        let entries = std::mem::take(&mut self.resources().entries);
        release_entries(entries)
    }

    fn resources(&self) -> std::sync::MutexGuard<'_, ResourceList> {
        // A cleanup action never runs under the lock, so a poisoned lock
        // still holds a consistent list.
        self.0
            .resources
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn check_thread(&self) -> Result<()> {
        match self.0.owner {
            Some(owner) if owner != thread::current().id() => {
                Err(Error::wrong_thread(self.id()))
            }
            _ => Ok(()),
        }
    }
}

/// Releases entries newest first: cleanup actions registered after a block
/// may still refer to it.
fn release_entries(entries: Vec<Resource>) -> Released {
    let mut released = Released::default();
    for entry in entries.into_iter().rev() {
        match entry {
            Resource::Block(block) => {
                released.blocks += 1;
                released.bytes += block.memory().capacity as u64;
                drop(block);
            }
            Resource::Cleanup(action) => {
                released.cleanups += 1;
                action();
            }
        }
    }
    released
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        let entries = std::mem::take(
            &mut self
                .resources
                .get_mut()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .entries,
        );
        if entries.is_empty() {
            return;
        }
        let released = release_entries(entries);
        log::debug!(
            "scope #{} reclaimed ({:?}): {} block(s), {} bytes, {} cleanup action(s)",
            self.id,
            self.kind,
            released.blocks,
            released.bytes,
            released.cleanups
        );
    }
}

/// Decrements a counter on drop, so a panicking access or action does not
/// leave the scope pinned.
struct Unpin<'a>(&'a AtomicUsize);

impl Drop for Unpin<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn backoff(spins: &mut u32) {
    if *spins < 64 {
        std::hint::spin_loop();
    } else {
        thread::yield_now();
    }
    *spins = spins.saturating_add(1);
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Scope {}

impl std::hash::Hash for Scope {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.0.id)
            .field("kind", &self.0.kind)
            .field("alive", &self.is_alive())
            .finish()
    }
}
