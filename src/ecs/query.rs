//! Archetype queries: uncompiled (always-fresh) and compiled (staleness-
//! checked) variants (`spec.md` §4.4).

use crate::containers::Bitset;
use crate::ecs::archetype::Archetype;
use crate::ecs::chunk::Chunk;
use crate::ecs::component::Signature;
use crate::ecs::world::World;

/// An include/exclude signature mask. Matching archetypes satisfy
/// `include ⊆ signature ∧ exclude ∩ signature = ∅`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Query {
    include: Signature,
    exclude: Signature,
}

fn matches(signature: &Signature, include: &Signature, exclude: &Signature) -> bool {
    signature.contains_all(include) && {
        let overlap: Bitset<4> = {
            let mut b = Signature::new();
            for i in 0..Signature::BITS {
                if signature.test(i) && exclude.test(i) {
                    b.set(i);
                }
            }
            b
        };
        overlap.is_empty()
    }
}

/// Build a query's signature masks. Does not snapshot anything — re-checked
/// against the world's current archetype list on every `query_each_chunk`
/// call, so it can never go stale.
pub fn query_build(include: &[u16], exclude: &[u16]) -> Query {
    let mut include_sig = Signature::new();
    for &t in include {
        include_sig.set(t as usize);
    }
    let mut exclude_sig = Signature::new();
    for &t in exclude {
        exclude_sig.set(t as usize);
    }
    Query {
        include: include_sig,
        exclude: exclude_sig,
    }
}

/// Visit every chunk of every archetype matching `query`.
pub fn query_each_chunk<F: FnMut(&Archetype, &Chunk)>(world: &World, query: &Query, mut f: F) {
    for archetype in world.archetypes() {
        if matches(&archetype.signature, &query.include, &query.exclude) {
            for chunk in archetype.chunks() {
                f(archetype, chunk);
            }
        }
    }
}

/// A snapshot of the archetypes matching `query` at compile time, plus the
/// world archetype count at that moment for staleness detection.
pub struct CompiledQuery {
    query: Query,
    matching_archetypes: Vec<usize>,
    archetype_count_at_compile: usize,
}

pub fn query_compile(world: &World, query: Query) -> CompiledQuery {
    let matching_archetypes = world
        .archetypes()
        .iter()
        .enumerate()
        .filter(|(_, a)| matches(&a.signature, &query.include, &query.exclude))
        .map(|(i, _)| i)
        .collect();
    CompiledQuery {
        query,
        matching_archetypes,
        archetype_count_at_compile: world.archetype_count(),
    }
}

impl CompiledQuery {
    pub fn is_stale(&self, world: &World) -> bool {
        world.archetype_count() != self.archetype_count_at_compile
    }

    /// Visit every chunk of the snapshotted archetype list. Debug builds
    /// assert the snapshot is still fresh; release builds silently use the
    /// stale list, matching `spec.md` §4.4's documented ambiguity.
    pub fn each_chunk<F: FnMut(&Archetype, &Chunk)>(&self, world: &World, mut f: F) {
        debug_assert!(
            !self.is_stale(world),
            "compiled query used after new archetypes were created"
        );
        let archetypes = world.archetypes();
        for &index in &self.matching_archetypes {
            if let Some(archetype) = archetypes.get(index) {
                for chunk in archetype.chunks() {
                    f(archetype, chunk);
                }
            }
        }
    }

    pub fn query(&self) -> Query {
        self.query
    }
}

/// Explicit pair with `query_compile`; present for API symmetry with the
/// source model's paired compile/destroy lifecycle. Compiled queries hold
/// no resources beyond a `Vec`, so this simply drops it.
pub fn query_destroy(_compiled: CompiledQuery) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::world::World;

    #[test]
    fn scenario_3_query_over_archetypes() {
        let mut world = World::new(0);
        let a = world.register_component("A", 4, 4).unwrap();
        let b = world.register_component("B", 4, 4).unwrap();

        world.create_entity_with_components(&[a], &[None]).unwrap();
        world.create_entity_with_components(&[a, b], &[None, None]).unwrap();
        world.create_entity_with_components(&[b], &[None]).unwrap();

        let query = query_build(&[a], &[]);
        let mut total_entities = 0;
        let mut matched_archetypes = 0;
        query_each_chunk(&world, &query, |_archetype, chunk| {
            matched_archetypes += 1;
            total_entities += chunk.count();
        });

        assert_eq!(matched_archetypes, 2);
        assert_eq!(total_entities, 2);
    }

    #[test]
    fn compiled_query_detects_staleness() {
        let mut world = World::new(0);
        let a = world.register_component("A", 4, 4).unwrap();
        world.create_entity_with_components(&[a], &[None]).unwrap();

        let query = query_build(&[a], &[]);
        let compiled = query_compile(&world, query);
        assert!(!compiled.is_stale(&world));

        let b = world.register_component("B", 4, 4).unwrap();
        world.create_entity_with_components(&[a, b], &[None, None]).unwrap();
        assert!(compiled.is_stale(&world));
    }

    #[test]
    fn exclude_mask_filters_archetypes() {
        let mut world = World::new(0);
        let a = world.register_component("A", 4, 4).unwrap();
        let b = world.register_component("B", 4, 4).unwrap();
        world.create_entity_with_components(&[a], &[None]).unwrap();
        world.create_entity_with_components(&[a, b], &[None, None]).unwrap();

        let query = query_build(&[a], &[b]);
        let mut count = 0;
        query_each_chunk(&world, &query, |_archetype, chunk| count += chunk.count());
        assert_eq!(count, 1);
    }
}
