//! Reserve-then-commit linear allocator with scoped unwinding (`spec.md` §3/§4.1).
//!
//! The arena reserves a fixed byte range up front (standing in for a
//! virtual-memory reservation — actual `mmap`/`VirtualAlloc` belongs to the
//! platform layer this crate does not own) and tracks a `committed`
//! high-water mark and a bump `offset` within it. Deallocation is LIFO
//! through [`Scope`] only; [`Arena::free`] exists solely for tag accounting
//! symmetry with the allocator facade and never rewinds `offset`.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{EngineError, Result};
use crate::memory::tag::{MemoryTag, TagCounters};

/// A bracketed arena region that rewinds `offset` back to its start on close.
///
/// Scopes must nest: closing out of LIFO order is a programmer error and is
/// caught with a `debug_assert!` in debug builds, per `spec.md` §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope {
    id: u64,
    offset_at_open: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaFlags {
    None,
    ZeroOnAlloc,
}

pub struct Arena {
    base: NonNull<u8>,
    layout: Layout,
    reserved: usize,
    commit_size: usize,
    committed: usize,
    offset: usize,
    flags: ArenaFlags,
    counters: TagCounters,
    open_scopes: Vec<u64>,
    next_scope_id: u64,
}

// The arena is single-owner and never shared across threads concurrently;
// each worker in the job system owns its own (`spec.md` §5: "Arena: not
// thread-safe. Each owning thread uses its own arena").
unsafe impl Send for Arena {}

impl Arena {
    /// Create an arena reserving `reserve_size` bytes and committing in
    /// `commit_size` increments. `reserve_size` and `commit_size` must be
    /// non-zero and `commit_size` must evenly divide into the eventual
    /// commit growth (no further constraint beyond being non-zero).
    pub fn new(reserve_size: usize, commit_size: usize, flags: ArenaFlags) -> Result<Self> {
        if reserve_size == 0 || commit_size == 0 {
            log::warn!("arena creation rejected: reserve_size and commit_size must be non-zero");
            return Err(EngineError::InvalidParameter(
                "reserve_size and commit_size must be non-zero".into(),
            ));
        }
        let layout = Layout::array::<u8>(reserve_size).map_err(|_| {
            log::warn!("arena creation rejected: reserve_size {reserve_size} overflows layout");
            EngineError::InvalidParameter("reserve_size overflows layout".into())
        })?;
        let base = unsafe { alloc::alloc(layout) };
        let base = NonNull::new(base).ok_or_else(|| {
            log::error!("arena creation rejected: failed to reserve {reserve_size} bytes");
            EngineError::OutOfMemory
        })?;

        Ok(Self {
            base,
            layout,
            reserved: reserve_size,
            commit_size,
            committed: 0,
            offset: 0,
            flags,
            counters: TagCounters::new(),
            open_scopes: Vec::new(),
            next_scope_id: 1,
        })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn committed(&self) -> usize {
        self.committed
    }

    pub fn reserved(&self) -> usize {
        self.reserved
    }

    pub fn bytes_allocated(&self, tag: MemoryTag) -> i64 {
        self.counters.bytes(tag)
    }

    fn align_up(value: usize, align: usize) -> Option<usize> {
        debug_assert!(align.is_power_of_two());
        value.checked_add(align - 1).map(|v| v & !(align - 1))
    }

    fn ensure_committed(&mut self, end: usize) -> Result<()> {
        if end <= self.committed {
            return Ok(());
        }
        if end > self.reserved {
            log::error!("arena commit rejected: {end} exceeds reserved {}", self.reserved);
            return Err(EngineError::OutOfMemory);
        }
        let mut new_committed = self.committed;
        while new_committed < end {
            new_committed = (new_committed + self.commit_size).min(self.reserved);
            if new_committed == self.committed {
                log::error!("arena commit rejected: cannot grow commit beyond {}", self.committed);
                return Err(EngineError::OutOfMemory);
            }
        }
        self.committed = new_committed;
        Ok(())
    }

    /// Allocate `size` bytes aligned to `align`, charging `tag`.
    pub fn alloc(&mut self, size: usize, align: usize, tag: MemoryTag) -> Result<NonNull<u8>> {
        if size == 0 || !align.is_power_of_two() {
            log::warn!("arena alloc rejected: size must be non-zero and align a power of two");
            return Err(EngineError::InvalidParameter(
                "size must be non-zero and align a power of two".into(),
            ));
        }
        let aligned_offset = Self::align_up(self.offset, align).ok_or_else(|| {
            log::error!("arena alloc rejected: offset {} overflows on align {align}", self.offset);
            EngineError::OutOfMemory
        })?;
        let end = aligned_offset.checked_add(size).ok_or_else(|| {
            log::error!("arena alloc rejected: aligned_offset {aligned_offset} + size {size} overflows");
            EngineError::OutOfMemory
        })?;
        if end > self.reserved {
            log::error!("arena alloc rejected: {end} exceeds reserved {}", self.reserved);
            return Err(EngineError::OutOfMemory);
        }
        self.ensure_committed(end)?;

        self.offset = end;
        self.counters.charge(tag, size as i64);

        let ptr = unsafe { self.base.as_ptr().add(aligned_offset) };
        if self.flags == ArenaFlags::ZeroOnAlloc {
            unsafe { ptr.write_bytes(0, size) };
        }
        Ok(unsafe { NonNull::new_unchecked(ptr) })
    }

    /// Deduct `size` from `tag`'s counter. Never rewinds `offset` — per
    /// `spec.md` §4.1, "individual frees are no-ops apart from tag
    /// accounting"; only closing a [`Scope`] reclaims address space.
    pub fn free(&mut self, _ptr: NonNull<u8>, size: usize, tag: MemoryTag) {
        self.counters.charge(tag, -(size as i64));
    }

    /// Grow or shrink an allocation in place when possible.
    ///
    /// Returns the same pointer when `new_size <= old_size` (no move, no
    /// tag delta beyond what `free`/`alloc` would already express);
    /// otherwise allocates fresh, copies `old_size` bytes, and charges the
    /// delta, per `spec.md` §4.1.
    pub fn realloc(
        &mut self,
        old: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        align: usize,
        tag: MemoryTag,
    ) -> Result<NonNull<u8>> {
        if new_size == 0 {
            log::warn!("arena realloc rejected: new_size must be non-zero");
            return Err(EngineError::InvalidParameter("new_size must be non-zero".into()));
        }
        if new_size <= old_size {
            return Ok(old);
        }
        let new_ptr = self.alloc(new_size, align, tag)?;
        unsafe {
            std::ptr::copy_nonoverlapping(old.as_ptr(), new_ptr.as_ptr(), old_size);
        }
        self.counters.charge(tag, -(old_size as i64));
        Ok(new_ptr)
    }

    /// Open a new scope at the current offset.
    pub fn begin_scope(&mut self) -> Scope {
        let id = self.next_scope_id;
        self.next_scope_id += 1;
        self.open_scopes.push(id);
        Scope {
            id,
            offset_at_open: self.offset,
        }
    }

    /// Close `scope`, rewinding the arena to its offset at open and
    /// subtracting the reclaimed bytes from `tag`'s counter.
    ///
    /// Closing out of LIFO order is a programming error; debug builds
    /// assert on it, matching `spec.md` §4.1.
    pub fn end_scope(&mut self, scope: Scope, tag: MemoryTag) {
        let is_top = self.open_scopes.last() == Some(&scope.id);
        debug_assert!(is_top, "arena scopes must be closed in LIFO order");
        if let Some(pos) = self.open_scopes.iter().rposition(|&id| id == scope.id) {
            self.open_scopes.truncate(pos);
        }

        let reclaimed = self.offset.saturating_sub(scope.offset_at_open);
        self.offset = scope.offset_at_open;
        self.counters.charge(tag, -(reclaimed as i64));
    }

    /// Whether `scope` is still open on this arena (has not already been
    /// closed by a prior [`Arena::end_scope`]).
    pub fn is_scope_valid(&self, scope: Scope) -> bool {
        self.open_scopes.contains(&scope.id)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe {
            alloc::dealloc(self.base.as_ptr(), self.layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_1_arena_round_trip() {
        let mut arena = Arena::new(1024 * 1024, 64 * 1024, ArenaFlags::None).unwrap();
        let scope = arena.begin_scope();
        for _ in 0..10 {
            arena.alloc(4096, 16, MemoryTag::Array).unwrap();
        }
        arena.end_scope(scope, MemoryTag::Array);

        assert_eq!(arena.offset(), 0);
        assert_eq!(arena.bytes_allocated(MemoryTag::Array), 0);
    }

    #[test]
    fn nested_scopes_rewind_correctly() {
        let mut arena = Arena::new(1024 * 1024, 64 * 1024, ArenaFlags::None).unwrap();
        let outer = arena.begin_scope();
        arena.alloc(128, 8, MemoryTag::Struct).unwrap();
        let inner = arena.begin_scope();
        arena.alloc(256, 8, MemoryTag::Struct).unwrap();
        arena.end_scope(inner, MemoryTag::Struct);
        assert_eq!(arena.offset(), 128);
        arena.end_scope(outer, MemoryTag::Struct);
        assert_eq!(arena.offset(), 0);
        assert_eq!(arena.bytes_allocated(MemoryTag::Struct), 0);
    }

    #[test]
    fn out_of_reserve_fails() {
        let mut arena = Arena::new(1024, 256, ArenaFlags::None).unwrap();
        let err = arena.alloc(2048, 8, MemoryTag::Buffer).unwrap_err();
        assert_eq!(err, EngineError::OutOfMemory);
    }

    #[test]
    fn realloc_grows_and_copies() {
        let mut arena = Arena::new(1024 * 1024, 64 * 1024, ArenaFlags::None).unwrap();
        let ptr = arena.alloc(4, 4, MemoryTag::Array).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(0xAB, 4);
        }
        let grown = arena.realloc(ptr, 4, 16, 4, MemoryTag::Array).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(grown.as_ptr(), 4) };
        assert_eq!(bytes, &[0xAB, 0xAB, 0xAB, 0xAB]);
    }

    #[test]
    fn destroying_arena_zeroes_tag_counters_on_fresh_arena() {
        let arena = Arena::new(4096, 1024, ArenaFlags::None).unwrap();
        assert_eq!(arena.bytes_allocated(MemoryTag::Struct), 0);
        drop(arena);
        let arena2 = Arena::new(4096, 1024, ArenaFlags::None).unwrap();
        assert_eq!(arena2.bytes_allocated(MemoryTag::Struct), 0);
    }
}
