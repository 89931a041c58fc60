//! Archetype: a group of entities sharing the same component signature
//! (`spec.md` §3, "Archetype").

use crate::ecs::chunk::{chunk_capacity, Chunk};
use crate::ecs::component::{ComponentRegistry, Signature, MAX_COMPONENTS};
use crate::ecs::entity::EntityId;

pub const ABSENT_COLUMN: u16 = 0xFFFF;

/// Where a live row currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocation {
    pub chunk: usize,
    pub row: usize,
}

pub struct Archetype {
    pub signature: Signature,
    pub type_ids: Vec<u16>,
    type_to_column: [u16; MAX_COMPONENTS],
    chunks: Vec<Chunk>,
    chunk_capacity: usize,
    column_layouts: Vec<(usize, usize)>,
}

impl Archetype {
    pub fn new(type_ids: Vec<u16>, registry: &ComponentRegistry) -> Self {
        let mut signature = Signature::new();
        let mut type_to_column = [ABSENT_COLUMN; MAX_COMPONENTS];
        let mut column_layouts = Vec::with_capacity(type_ids.len());
        for (column, &type_id) in type_ids.iter().enumerate() {
            signature.set(type_id as usize);
            type_to_column[type_id as usize] = column as u16;
            let info = registry.info(type_id).expect("type_id was registered");
            column_layouts.push((info.size, info.align));
        }
        let row_stride: usize = column_layouts.iter().map(|&(size, _)| size).sum();
        Self {
            signature,
            type_ids,
            type_to_column,
            chunks: Vec::new(),
            chunk_capacity: chunk_capacity(row_stride),
            column_layouts,
        }
    }

    pub fn column_of(&self, type_id: u16) -> Option<usize> {
        let col = self.type_to_column[type_id as usize];
        if col == ABSENT_COLUMN {
            None
        } else {
            Some(col as usize)
        }
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, index: usize) -> &Chunk {
        &self.chunks[index]
    }

    pub fn chunk_mut(&mut self, index: usize) -> &mut Chunk {
        &mut self.chunks[index]
    }

    pub fn entity_count(&self) -> usize {
        self.chunks.iter().map(|c| c.count()).sum()
    }

    /// Allocate a row for `entity`, appending a new chunk if the tail chunk
    /// is full or none exists yet.
    pub fn allocate_row(&mut self, entity: EntityId) -> RowLocation {
        if self.chunks.last().is_none_or(|c| c.is_full()) {
            self.chunks.push(Chunk::new(self.chunk_capacity, &self.column_layouts));
        }
        let chunk_index = self.chunks.len() - 1;
        let row = self.chunks[chunk_index].push_row(entity);
        RowLocation { chunk: chunk_index, row }
    }

    /// Swap-remove the row at `location`. Returns the entity displaced into
    /// that slot (if any) along with its new location, so the caller (the
    /// entity directory) can update that entity's record.
    pub fn remove_row(&mut self, location: RowLocation) -> Option<(EntityId, RowLocation)> {
        let moved = self.chunks[location.chunk].swap_remove(location.row);
        moved.map(|entity| (entity, location))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::ComponentRegistry;

    #[test]
    fn allocate_and_remove_row() {
        let mut registry = ComponentRegistry::new();
        let a = registry.register_component("A", 4, 4).unwrap();
        let mut archetype = Archetype::new(vec![a], &registry);

        let e0 = EntityId::new(0, 1, 0);
        let e1 = EntityId::new(0, 1, 1);
        let loc0 = archetype.allocate_row(e0);
        let loc1 = archetype.allocate_row(e1);
        assert_eq!(archetype.entity_count(), 2);

        let displaced = archetype.remove_row(loc0);
        assert_eq!(displaced, Some((e1, loc0)));
        assert_eq!(archetype.entity_count(), 1);
        let _ = loc1;
    }

    #[test]
    fn column_lookup_reflects_signature() {
        let mut registry = ComponentRegistry::new();
        let a = registry.register_component("A", 4, 4).unwrap();
        let b = registry.register_component("B", 8, 8).unwrap();
        let archetype = Archetype::new(vec![a, b], &registry);
        assert_eq!(archetype.column_of(a), Some(0));
        assert_eq!(archetype.column_of(b), Some(1));
        assert_eq!(archetype.column_of(99), None);
    }
}
