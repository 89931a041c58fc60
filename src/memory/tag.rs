//! Memory tags used purely for allocation telemetry (`spec.md` §3, "Allocator facade").

use std::fmt;

/// Tag attached to every allocation for accounting purposes only; it never
/// affects placement or alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTag {
    Struct,
    Array,
    String,
    Vector,
    HashTable,
    Renderer,
    Buffer,
    File,
    Job,
    Ecs,
    RenderGraph,
    EventBus,
}

impl MemoryTag {
    pub const ALL: [MemoryTag; 12] = [
        MemoryTag::Struct,
        MemoryTag::Array,
        MemoryTag::String,
        MemoryTag::Vector,
        MemoryTag::HashTable,
        MemoryTag::Renderer,
        MemoryTag::Buffer,
        MemoryTag::File,
        MemoryTag::Job,
        MemoryTag::Ecs,
        MemoryTag::RenderGraph,
        MemoryTag::EventBus,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryTag::Struct => "struct",
            MemoryTag::Array => "array",
            MemoryTag::String => "string",
            MemoryTag::Vector => "vector",
            MemoryTag::HashTable => "hashtable",
            MemoryTag::Renderer => "renderer",
            MemoryTag::Buffer => "buffer",
            MemoryTag::File => "file",
            MemoryTag::Job => "job",
            MemoryTag::Ecs => "ecs",
            MemoryTag::RenderGraph => "render_graph",
            MemoryTag::EventBus => "event_bus",
        };
        f.write_str(name)
    }
}

/// Per-tag byte counters. Every arena/allocator owns one of these; nothing
/// here is process-global, which keeps multiple arenas in the same process
/// (e.g. one per test) from stepping on each other's accounting.
#[derive(Debug, Default, Clone)]
pub struct TagCounters {
    counts: [i64; MemoryTag::ALL.len()],
}

impl TagCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn charge(&mut self, tag: MemoryTag, bytes: i64) {
        self.counts[tag.index()] += bytes;
    }

    pub fn bytes(&self, tag: MemoryTag) -> i64 {
        self.counts[tag.index()]
    }

    pub fn total(&self) -> i64 {
        self.counts.iter().sum()
    }
}
