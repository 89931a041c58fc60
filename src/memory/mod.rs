//! Arena allocation and tagged accounting (`spec.md` §4.1).

pub mod allocator;
pub mod arena;
pub mod tag;

pub use allocator::Allocator;
pub use arena::{Arena, ArenaFlags, Scope};
pub use tag::{MemoryTag, TagCounters};
