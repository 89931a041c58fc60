//! The ECS world: component registry, archetype registry, entity directory
//! (`spec.md` §4.4).

use crate::containers::HashTable;
use crate::ecs::archetype::Archetype;
use crate::ecs::component::{ComponentRegistry, Signature};
use crate::ecs::directory::{EntityDirectory, EntityRecord};
use crate::ecs::entity::EntityId;
use crate::error::{EngineError, Result};

pub struct World {
    world_id: u16,
    registry: ComponentRegistry,
    archetypes: Vec<Archetype>,
    archetype_index: HashTable<Signature, usize>,
    directory: EntityDirectory,
}

impl World {
    pub fn new(world_id: u16) -> Self {
        let registry = ComponentRegistry::new();
        let empty = Archetype::new(Vec::new(), &registry);
        let mut archetype_index = HashTable::new();
        archetype_index.insert(empty.signature, 0).expect("fresh hashtable insert cannot fail");
        Self {
            world_id,
            registry,
            archetypes: vec![empty],
            archetype_index,
            directory: EntityDirectory::new(world_id),
        }
    }

    pub fn register_component(&mut self, name: &str, size: usize, align: usize) -> Result<u16> {
        self.registry.register_component(name, size, align)
    }

    pub fn register_component_once(&mut self, name: &str, size: usize, align: usize) -> Result<u16> {
        self.registry.register_component_once(name, size, align)
    }

    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    fn validate_type_ids(&self, type_ids: &[u16]) -> Result<()> {
        for &type_id in type_ids {
            if self.registry.info(type_id).is_none() {
                log::warn!("archetype lookup rejected: component type {type_id} is not registered");
                return Err(EngineError::InvalidParameter(format!(
                    "component type {type_id} is not registered"
                )));
            }
        }
        Ok(())
    }

    fn find_or_create_archetype(&mut self, mut type_ids: Vec<u16>) -> Result<usize> {
        type_ids.sort_unstable();
        type_ids.dedup();
        self.validate_type_ids(&type_ids)?;

        let mut signature = Signature::new();
        for &t in &type_ids {
            signature.set(t as usize);
        }
        if let Some(&index) = self.archetype_index.get(&signature) {
            return Ok(index);
        }
        let archetype = Archetype::new(type_ids, &self.registry);
        let index = self.archetypes.len();
        self.archetypes.push(archetype);
        self.archetype_index.insert(signature, index)?;
        Ok(index)
    }

    fn two_archetypes_mut(&mut self, a: usize, b: usize) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b);
        if a < b {
            let (left, right) = self.archetypes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }

    pub fn create_entity(&mut self) -> EntityId {
        let id = self.directory.allocate();
        let location = self.archetypes[0].allocate_row(id);
        self.directory.install(
            id,
            EntityRecord {
                archetype: 0,
                location,
            },
        );
        id
    }

    /// Create an entity directly in the archetype for `types`, writing
    /// `init_data[i]` into column `types[i]` (zero-filled when absent).
    pub fn create_entity_with_components(
        &mut self,
        types: &[u16],
        init_data: &[Option<&[u8]>],
    ) -> Result<EntityId> {
        if types.len() != init_data.len() {
            log::warn!(
                "create_entity_with_components rejected: types.len() {} != init_data.len() {}",
                types.len(),
                init_data.len()
            );
            return Err(EngineError::InvalidParameter(
                "types and init_data must be the same length".into(),
            ));
        }
        let archetype_index = self.find_or_create_archetype(types.to_vec())?;
        let id = self.directory.allocate();
        let location = self.archetypes[archetype_index].allocate_row(id);
        for (&type_id, &data) in types.iter().zip(init_data.iter()) {
            if let Some(bytes) = data {
                let col = self.archetypes[archetype_index]
                    .column_of(type_id)
                    .expect("type_id is part of this archetype by construction");
                self.archetypes[archetype_index]
                    .chunk_mut(location.chunk)
                    .write_column(col, location.row, bytes);
            }
        }
        self.directory.install(
            id,
            EntityRecord {
                archetype: archetype_index,
                location,
            },
        );
        Ok(id)
    }

    pub fn destroy_entity(&mut self, id: EntityId) -> bool {
        let record = match self.directory.record(id) {
            Some(r) => r,
            None => return false,
        };
        let archetype = &mut self.archetypes[record.archetype];
        if let Some((displaced, location)) = archetype.remove_row(record.location) {
            self.directory.update_location(displaced, location);
        }
        self.directory.destroy(id)
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.directory.is_alive(id)
    }

    pub fn has_component(&self, id: EntityId, type_id: u16) -> bool {
        match self.directory.record(id) {
            Some(record) => self.archetypes[record.archetype].column_of(type_id).is_some(),
            None => false,
        }
    }

    pub fn get_component(&self, id: EntityId, type_id: u16) -> Option<&[u8]> {
        let record = self.directory.record(id)?;
        self.get_component_at(record, type_id)
    }

    /// Skips liveness validation; callers must have validated `id` earlier
    /// in the same scope (`spec.md` §4.4).
    pub fn get_component_unchecked(&self, id: EntityId, type_id: u16) -> Option<&[u8]> {
        let record = self.directory.record_unchecked(id)?;
        self.get_component_at(record, type_id)
    }

    fn get_component_at(&self, record: EntityRecord, type_id: u16) -> Option<&[u8]> {
        let archetype = &self.archetypes[record.archetype];
        let column = archetype.column_of(type_id)?;
        Some(archetype.chunk(record.location.chunk).read_column(column, record.location.row))
    }

    pub fn add_component(&mut self, id: EntityId, type_id: u16, init: Option<&[u8]>) -> Result<bool> {
        let record = match self.directory.record(id) {
            Some(r) => r,
            None => return Ok(false),
        };
        let old_archetype = &self.archetypes[record.archetype];
        if let Some(col) = old_archetype.column_of(type_id) {
            if let Some(data) = init {
                self.archetypes[record.archetype]
                    .chunk_mut(record.location.chunk)
                    .write_column(col, record.location.row, data);
            }
            return Ok(true);
        }
        let mut new_types = old_archetype.type_ids.clone();
        new_types.push(type_id);
        self.transition_entity(id, record, new_types, Some((type_id, init)))
    }

    pub fn remove_component(&mut self, id: EntityId, type_id: u16) -> Result<bool> {
        let record = match self.directory.record(id) {
            Some(r) => r,
            None => return Ok(false),
        };
        let old_archetype = &self.archetypes[record.archetype];
        if old_archetype.column_of(type_id).is_none() {
            return Ok(false);
        }
        let new_types: Vec<u16> = old_archetype
            .type_ids
            .iter()
            .copied()
            .filter(|&t| t != type_id)
            .collect();
        self.transition_entity(id, record, new_types, None)
    }

    fn transition_entity(
        &mut self,
        id: EntityId,
        record: EntityRecord,
        new_type_ids: Vec<u16>,
        new_component: Option<(u16, Option<&[u8]>)>,
    ) -> Result<bool> {
        let new_archetype_index = self.find_or_create_archetype(new_type_ids)?;
        let old_archetype_index = record.archetype;

        if new_archetype_index == old_archetype_index {
            if let Some((type_id, Some(data))) = new_component {
                if let Some(col) = self.archetypes[old_archetype_index].column_of(type_id) {
                    self.archetypes[old_archetype_index]
                        .chunk_mut(record.location.chunk)
                        .write_column(col, record.location.row, data);
                }
            }
            return Ok(true);
        }

        let (old_archetype, new_archetype) =
            self.two_archetypes_mut(old_archetype_index, new_archetype_index);
        let new_location = new_archetype.allocate_row(id);
        let new_type_ids = new_archetype.type_ids.clone();

        for type_id in new_type_ids {
            if let (Some(old_col), Some(new_col)) = (
                old_archetype.column_of(type_id),
                new_archetype.column_of(type_id),
            ) {
                let source_chunk = old_archetype.chunk(record.location.chunk);
                new_archetype.chunk_mut(new_location.chunk).copy_column_from(
                    new_col,
                    new_location.row,
                    source_chunk,
                    old_col,
                    record.location.row,
                );
            } else if let Some((added_type, Some(data))) = new_component {
                if added_type == type_id {
                    if let Some(new_col) = new_archetype.column_of(type_id) {
                        new_archetype
                            .chunk_mut(new_location.chunk)
                            .write_column(new_col, new_location.row, data);
                    }
                }
            }
        }

        if let Some((displaced, location)) = old_archetype.remove_row(record.location) {
            self.directory.update_location(displaced, location);
        }

        self.directory.install(
            id,
            EntityRecord {
                archetype: new_archetype_index,
                location: new_location,
            },
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_2_ecs_add_remove() {
        let mut world = World::new(0);
        let a = world.register_component("A", 4, 4).unwrap();
        let b = world.register_component("B", 8, 8).unwrap();

        let a_val: u32 = 0x1111_1111;
        let entity = world
            .create_entity_with_components(&[a], &[Some(&a_val.to_ne_bytes())])
            .unwrap();

        let b_val: u64 = 0x2222_2222_2222_2222;
        world.add_component(entity, b, Some(&b_val.to_ne_bytes())).unwrap();

        assert_eq!(
            u32::from_ne_bytes(world.get_component(entity, a).unwrap().try_into().unwrap()),
            a_val
        );
        assert_eq!(
            u64::from_ne_bytes(world.get_component(entity, b).unwrap().try_into().unwrap()),
            b_val
        );

        world.remove_component(entity, a).unwrap();
        assert!(!world.has_component(entity, a));
        assert_eq!(
            u64::from_ne_bytes(world.get_component(entity, b).unwrap().try_into().unwrap()),
            b_val
        );

        assert!(world.destroy_entity(entity));
        assert!(!world.is_alive(entity));

        let recreated = world.create_entity();
        assert_eq!(recreated.index(), entity.index());
        assert_ne!(recreated.generation(), entity.generation());
    }

    #[test]
    fn destroy_dead_entity_is_noop() {
        let mut world = World::new(0);
        let e = world.create_entity();
        assert!(world.destroy_entity(e));
        assert!(!world.destroy_entity(e));
    }

    #[test]
    fn component_ops_on_dead_entity_return_false() {
        let mut world = World::new(0);
        let a = world.register_component("A", 4, 4).unwrap();
        let e = world.create_entity();
        world.destroy_entity(e);
        assert!(!world.add_component(e, a, None).unwrap());
        assert!(!world.remove_component(e, a).unwrap());
        assert!(world.get_component(e, a).is_none());
    }

    #[test]
    fn registration_overflow_returns_error() {
        let mut world = World::new(0);
        for i in 0..256 {
            world.register_component(&format!("c{i}"), 4, 4).unwrap();
        }
        assert!(world.register_component("overflow", 4, 4).is_err());
    }
}
