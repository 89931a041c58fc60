//! Archetype ECS: chunked Struct-of-Arrays component storage, an entity
//! directory with generation recycling, and archetype queries (`spec.md` §4.4).

pub mod archetype;
pub mod chunk;
pub mod component;
pub mod directory;
pub mod entity;
pub mod query;
pub mod world;

pub use component::{ComponentRegistry, Signature, MAX_COMPONENTS};
pub use entity::EntityId;
pub use query::{query_build, query_compile, query_destroy, query_each_chunk, CompiledQuery, Query};
pub use world::World;
