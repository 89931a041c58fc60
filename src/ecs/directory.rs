//! Entity directory: index-addressable records plus a recyclable free list
//! (`spec.md` §3, "Entity directory").

use crate::ecs::archetype::RowLocation;
use crate::ecs::entity::EntityId;

#[derive(Debug, Clone, Copy)]
pub struct EntityRecord {
    pub archetype: usize,
    pub location: RowLocation,
}

pub struct EntityDirectory {
    world: u16,
    records: Vec<Option<EntityRecord>>,
    generations: Vec<u16>,
    free_list: Vec<u32>,
}

impl EntityDirectory {
    pub fn new(world: u16) -> Self {
        Self {
            world,
            records: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
        }
    }

    /// Allocate a fresh index (from the free list if possible), bump its
    /// generation, and return the new entity ID. The caller is responsible
    /// for installing a record before the entity is considered live.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(index) = self.free_list.pop() {
            let generation = self.generations[index as usize];
            EntityId::new(self.world, generation, index)
        } else {
            let index = self.records.len() as u32;
            self.records.push(None);
            self.generations.push(1);
            EntityId::new(self.world, 1, index)
        }
    }

    pub fn install(&mut self, id: EntityId, record: EntityRecord) {
        self.records[id.index() as usize] = Some(record);
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        if id.is_invalid() || id.world() != self.world {
            return false;
        }
        let index = id.index() as usize;
        index < self.generations.len()
            && self.generations[index] == id.generation()
            && id.generation() != 0
    }

    pub fn record(&self, id: EntityId) -> Option<EntityRecord> {
        if !self.is_alive(id) {
            return None;
        }
        self.records[id.index() as usize]
    }

    /// Fetch a record without validating liveness. Callers must have
    /// validated `id` earlier in the same scope (`spec.md` §4.4).
    pub fn record_unchecked(&self, id: EntityId) -> Option<EntityRecord> {
        self.records.get(id.index() as usize).copied().flatten()
    }

    pub fn update_location(&mut self, id: EntityId, location: RowLocation) {
        if let Some(record) = self.records[id.index() as usize].as_mut() {
            record.location = location;
        }
    }

    /// Destroy `id`: bumps its generation (wrapping), clears its record,
    /// and frees its index for reuse. No-op (returns `false`) if the id is
    /// already dead.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        if !self.is_alive(id) {
            return false;
        }
        let index = id.index() as usize;
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.records[index] = None;
        self.free_list.push(index as u32);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destroy_then_recreate_bumps_generation() {
        let mut dir = EntityDirectory::new(0);
        let e0 = dir.allocate();
        dir.install(
            e0,
            EntityRecord {
                archetype: 0,
                location: RowLocation { chunk: 0, row: 0 },
            },
        );
        assert!(dir.is_alive(e0));
        assert!(dir.destroy(e0));
        assert!(!dir.is_alive(e0));

        let e1 = dir.allocate();
        assert_eq!(e1.index(), e0.index());
        assert_ne!(e1.generation(), e0.generation());
    }

    #[test]
    fn destroying_dead_entity_is_noop() {
        let mut dir = EntityDirectory::new(0);
        let e0 = dir.allocate();
        assert!(dir.destroy(e0));
        assert!(!dir.destroy(e0));
    }
}
