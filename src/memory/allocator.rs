//! Allocator facade: a uniform alloc/free/realloc surface over either an
//! [`Arena`] or the system allocator, per `spec.md` §3 "Allocator facade".

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::error::{EngineError, Result};
use crate::memory::arena::{Arena, ArenaFlags, Scope};
use crate::memory::tag::{MemoryTag, TagCounters};

/// Backend an [`Allocator`] routes calls to.
enum Backend {
    Arena(Arena),
    GeneralPurpose(TagCounters),
}

/// Facade over either a scoped arena or the system allocator.
///
/// Scopes on the general-purpose backend are no-ops (`begin_scope` returns
/// an inert handle, `end_scope` does nothing beyond tag accounting) because
/// general-purpose allocations are individually freed, not bump-rewound.
pub struct Allocator {
    backend: Backend,
}

impl Allocator {
    pub fn arena(reserve_size: usize, commit_size: usize, flags: ArenaFlags) -> Result<Self> {
        Ok(Self {
            backend: Backend::Arena(Arena::new(reserve_size, commit_size, flags)?),
        })
    }

    pub fn general_purpose() -> Self {
        Self {
            backend: Backend::GeneralPurpose(TagCounters::new()),
        }
    }

    pub fn alloc(&mut self, size: usize, align: usize, tag: MemoryTag) -> Result<NonNull<u8>> {
        match &mut self.backend {
            Backend::Arena(arena) => arena.alloc(size, align, tag),
            Backend::GeneralPurpose(counters) => {
                if size == 0 || !align.is_power_of_two() {
                    log::warn!("allocator alloc rejected: size must be non-zero and align a power of two");
                    return Err(EngineError::InvalidParameter(
                        "size must be non-zero and align a power of two".into(),
                    ));
                }
                let layout = Layout::from_size_align(size, align).map_err(|_| {
                    log::warn!("allocator alloc rejected: bad layout for size {size}, align {align}");
                    EngineError::InvalidParameter("bad layout".into())
                })?;
                let ptr = unsafe { alloc::alloc(layout) };
                let ptr = NonNull::new(ptr).ok_or_else(|| {
                    log::error!("allocator alloc rejected: system allocation failed for {size} bytes");
                    EngineError::OutOfMemory
                })?;
                counters.charge(tag, size as i64);
                Ok(ptr)
            }
        }
    }

    pub fn free(&mut self, ptr: NonNull<u8>, size: usize, align: usize, tag: MemoryTag) {
        match &mut self.backend {
            Backend::Arena(arena) => arena.free(ptr, size, tag),
            Backend::GeneralPurpose(counters) => {
                let layout = Layout::from_size_align(size, align)
                    .expect("layout was valid at alloc time");
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
                counters.charge(tag, -(size as i64));
            }
        }
    }

    pub fn realloc(
        &mut self,
        ptr: NonNull<u8>,
        old_size: usize,
        new_size: usize,
        align: usize,
        tag: MemoryTag,
    ) -> Result<NonNull<u8>> {
        match &mut self.backend {
            Backend::Arena(arena) => arena.realloc(ptr, old_size, new_size, align, tag),
            Backend::GeneralPurpose(counters) => {
                if new_size == 0 {
                    log::warn!("allocator realloc rejected: new_size must be non-zero");
                    return Err(EngineError::InvalidParameter(
                        "new_size must be non-zero".into(),
                    ));
                }
                let old_layout = Layout::from_size_align(old_size, align).map_err(|_| {
                    log::warn!("allocator realloc rejected: bad layout for old_size {old_size}, align {align}");
                    EngineError::InvalidParameter("bad layout".into())
                })?;
                let raw = unsafe { alloc::realloc(ptr.as_ptr(), old_layout, new_size) };
                let raw = NonNull::new(raw).ok_or_else(|| {
                    log::error!("allocator realloc rejected: system reallocation failed for {new_size} bytes");
                    EngineError::OutOfMemory
                })?;
                counters.charge(tag, new_size as i64 - old_size as i64);
                Ok(raw)
            }
        }
    }

    /// Open a scope. On the general-purpose backend this is an inert marker
    /// that carries no address-space meaning.
    pub fn begin_scope(&mut self) -> Option<Scope> {
        match &mut self.backend {
            Backend::Arena(arena) => Some(arena.begin_scope()),
            Backend::GeneralPurpose(_) => None,
        }
    }

    pub fn end_scope(&mut self, scope: Option<Scope>, tag: MemoryTag) {
        if let (Backend::Arena(arena), Some(scope)) = (&mut self.backend, scope) {
            arena.end_scope(scope, tag);
        }
    }

    pub fn is_scope_valid(&self, scope: Option<Scope>) -> bool {
        match (&self.backend, scope) {
            (Backend::Arena(arena), Some(scope)) => arena.is_scope_valid(scope),
            (Backend::GeneralPurpose(_), None) => true,
            _ => false,
        }
    }

    pub fn bytes_allocated(&self, tag: MemoryTag) -> i64 {
        match &self.backend {
            Backend::Arena(arena) => arena.bytes_allocated(tag),
            Backend::GeneralPurpose(counters) => counters.bytes(tag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_purpose_round_trips() {
        let mut alloc = Allocator::general_purpose();
        let ptr = alloc.alloc(64, 8, MemoryTag::Struct).unwrap();
        assert_eq!(alloc.bytes_allocated(MemoryTag::Struct), 64);
        alloc.free(ptr, 64, 8, MemoryTag::Struct);
        assert_eq!(alloc.bytes_allocated(MemoryTag::Struct), 0);
    }

    #[test]
    fn general_purpose_scopes_are_inert() {
        let mut alloc = Allocator::general_purpose();
        let scope = alloc.begin_scope();
        assert!(scope.is_none());
        assert!(alloc.is_scope_valid(scope));
        alloc.end_scope(scope, MemoryTag::Struct);
    }

    #[test]
    fn arena_backend_routes_through() {
        let mut alloc = Allocator::arena(4096, 1024, ArenaFlags::None).unwrap();
        let scope = alloc.begin_scope();
        alloc.alloc(128, 8, MemoryTag::Array).unwrap();
        assert!(alloc.is_scope_valid(scope));
        alloc.end_scope(scope, MemoryTag::Array);
        assert_eq!(alloc.bytes_allocated(MemoryTag::Array), 0);
    }
}
