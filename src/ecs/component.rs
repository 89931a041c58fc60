//! Component registration and signatures (`spec.md` §3, "Component").

use std::collections::HashMap;

use crate::containers::Bitset;
use crate::error::{EngineError, Result};

/// Maximum distinct component types a single world can register.
pub const MAX_COMPONENTS: usize = 256;

/// 256-bit set of component type IDs an archetype contains.
pub type Signature = Bitset<4>;

#[derive(Debug, Clone)]
pub struct ComponentInfo {
    pub name: String,
    pub size: usize,
    pub align: usize,
}

#[derive(Default)]
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    name_to_id: HashMap<String, u16>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn info(&self, type_id: u16) -> Option<&ComponentInfo> {
        self.infos.get(type_id as usize)
    }

    /// Register a new component. Fails if `name` is already registered or
    /// the registry is at `MAX_COMPONENTS`.
    pub fn register_component(&mut self, name: &str, size: usize, align: usize) -> Result<u16> {
        if self.name_to_id.contains_key(name) {
            log::warn!("component registration rejected: '{name}' already registered");
            return Err(EngineError::InvalidParameter(format!(
                "component '{name}' already registered"
            )));
        }
        if self.infos.len() >= MAX_COMPONENTS {
            log::warn!("component registration rejected: registry is full at {MAX_COMPONENTS}");
            return Err(EngineError::ResourceCreationFailed(
                "component registry is full".into(),
            ));
        }
        let type_id = self.infos.len() as u16;
        self.infos.push(ComponentInfo {
            name: name.to_string(),
            size,
            align,
        });
        self.name_to_id.insert(name.to_string(), type_id);
        Ok(type_id)
    }

    /// Register `name`, or return the existing type ID if it is already
    /// registered with matching `size`/`align`. Returns an error if the
    /// name exists with a different layout.
    pub fn register_component_once(&mut self, name: &str, size: usize, align: usize) -> Result<u16> {
        if let Some(&type_id) = self.name_to_id.get(name) {
            let info = &self.infos[type_id as usize];
            if info.size == size && info.align == align {
                return Ok(type_id);
            }
            log::warn!("component registration rejected: '{name}' already registered with a different layout");
            return Err(EngineError::InvalidParameter(format!(
                "component '{name}' already registered with a different layout"
            )));
        }
        self.register_component(name, size, align)
    }

    pub fn type_id_of(&self, name: &str) -> Option<u16> {
        self.name_to_id.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_rejected() {
        let mut reg = ComponentRegistry::new();
        reg.register_component("position", 12, 4).unwrap();
        assert!(reg.register_component("position", 12, 4).is_err());
    }

    #[test]
    fn register_once_returns_existing_on_match() {
        let mut reg = ComponentRegistry::new();
        let a = reg.register_component("velocity", 8, 4).unwrap();
        let b = reg.register_component_once("velocity", 8, 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn register_once_rejects_layout_mismatch() {
        let mut reg = ComponentRegistry::new();
        reg.register_component("velocity", 8, 4).unwrap();
        assert!(reg.register_component_once("velocity", 16, 8).is_err());
    }
}
