//! # Entity Management
//!
//! Entities are identified by a plain `u32`, unique for the lifetime of the
//! scene, and own an ordered map of components.

use std::collections::BTreeMap;
use std::fmt;

use super::component::{Component, ComponentId};

/// Unique identifier for an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Null/invalid entity ID.
    pub const NULL: Self = Self(0);

    /// Checks if this entity ID is null/invalid.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An entity and its components.
#[derive(Clone, Debug)]
pub struct Entity {
    /// The unique identifier for this entity.
    pub id: EntityId,
    /// Local entities exist only in this process and are never replicated.
    pub local: bool,
    components: BTreeMap<ComponentId, Component>,
    next_component_id: u32,
}

impl Entity {
    /// Creates an empty entity.
    #[must_use]
    pub fn new(id: EntityId, local: bool) -> Self {
        Self {
            id,
            local,
            components: BTreeMap::new(),
            next_component_id: 1,
        }
    }

    /// Returns a component by id.
    #[inline]
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Returns a mutable component by id.
    #[inline]
    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(&id)
    }

    /// Iterates over components in id order.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Number of components.
    #[inline]
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// Allocates the next free component id.
    pub(crate) fn allocate_component_id(&mut self) -> ComponentId {
        loop {
            let id = ComponentId(self.next_component_id);
            self.next_component_id = self.next_component_id.wrapping_add(1).max(1);
            if !self.components.contains_key(&id) {
                return id;
            }
        }
    }

    pub(crate) fn insert_component(&mut self, component: Component) {
        if component.id.0 >= self.next_component_id {
            self.next_component_id = component.id.0.wrapping_add(1).max(1);
        }
        self.components.insert(component.id, component);
    }

    pub(crate) fn remove_component(&mut self, id: ComponentId) -> Option<Component> {
        self.components.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ComponentTypeId;

    #[test]
    fn test_component_ids_skip_taken() {
        let mut entity = Entity::new(EntityId(1), false);
        entity.insert_component(Component::new(ComponentId(1), ComponentTypeId(7), Vec::new()));
        entity.insert_component(Component::new(ComponentId(2), ComponentTypeId(7), Vec::new()));

        let next = entity.allocate_component_id();
        assert_eq!(next, ComponentId(3));
    }

    #[test]
    fn test_null_entity() {
        assert!(EntityId::default().is_null());
        assert!(!EntityId(5).is_null());
    }
}
