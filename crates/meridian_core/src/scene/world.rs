//! # Scene
//!
//! The central container for all entities and components, and the only
//! place where they are mutated.
//!
//! Every mutation stamps a monotonically increasing change counter and, unless
//! the origin is [`ChangeOrigin::Disconnected`], pushes one [`SceneEvent`] to
//! every subscriber before returning.

use std::collections::BTreeMap;

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::attribute::{Attribute, AttributeKey, AttributeValue};
use super::component::{Component, ComponentId, ComponentRegistry, ComponentTypeId};
use super::entity::{Entity, EntityId};
use super::events::{ChangeOrigin, ExecType, SceneEvent};
use crate::error::{SceneError, SceneResult};

/// The scene graph.
///
/// # Example
///
/// ```rust,ignore
/// let mut scene = Scene::new();
/// let entity = scene.create_entity(ChangeOrigin::Local);
/// let comp = scene.add_component(entity, PLACEABLE, ChangeOrigin::Local)?;
/// scene.set_attribute(entity, comp, AttributeKey::Static(0), AttributeValue::Bool(false), ChangeOrigin::Local)?;
/// ```
#[derive(Debug, Default)]
pub struct Scene {
    entities: BTreeMap<EntityId, Entity>,
    registry: ComponentRegistry,
    next_entity_id: u32,
    change_counter: u64,
    subscribers: Vec<Sender<SceneEvent>>,
}

impl Scene {
    /// Creates an empty scene with an empty component registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(ComponentRegistry::new())
    }

    /// Creates an empty scene using the given component types.
    #[must_use]
    pub fn with_registry(registry: ComponentRegistry) -> Self {
        Self {
            entities: BTreeMap::new(),
            registry,
            next_entity_id: 1,
            change_counter: 0,
            subscribers: Vec::new(),
        }
    }

    /// Returns the component registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Returns the component registry for registration.
    #[inline]
    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Subscribes to mutation notifications.
    ///
    /// Events are delivered in mutation order. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&mut self) -> Receiver<SceneEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Returns the current change counter.
    #[inline]
    #[must_use]
    pub const fn change_counter(&self) -> u64 {
        self.change_counter
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Returns an entity by id.
    #[inline]
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Returns true if the entity exists.
    #[inline]
    #[must_use]
    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Returns a component by entity and component id.
    #[must_use]
    pub fn component(&self, entity: EntityId, component: ComponentId) -> Option<&Component> {
        self.entities.get(&entity)?.component(component)
    }

    /// Iterates over entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Number of entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates a replicated entity with the next free id.
    pub fn create_entity(&mut self, origin: ChangeOrigin) -> EntityId {
        self.spawn(false, origin)
    }

    /// Creates an entity that is never replicated.
    pub fn create_local_entity(&mut self, origin: ChangeOrigin) -> EntityId {
        self.spawn(true, origin)
    }

    fn spawn(&mut self, local: bool, origin: ChangeOrigin) -> EntityId {
        let id = self.allocate_entity_id();
        self.entities.insert(id, Entity::new(id, local));
        self.emit(SceneEvent::EntityCreated { entity: id, origin });
        id
    }

    /// Creates a replicated entity with a caller-chosen id.
    pub fn create_entity_with_id(&mut self, id: EntityId, origin: ChangeOrigin) -> SceneResult<()> {
        if id.is_null() || self.entities.contains_key(&id) {
            return Err(SceneError::EntityExists(id));
        }
        if id.0 >= self.next_entity_id {
            self.next_entity_id = id.0.saturating_add(1);
        }
        self.entities.insert(id, Entity::new(id, false));
        self.emit(SceneEvent::EntityCreated { entity: id, origin });
        Ok(())
    }

    /// Removes an entity with all of its components.
    pub fn remove_entity(&mut self, id: EntityId, origin: ChangeOrigin) -> SceneResult<()> {
        self.entities.remove(&id).ok_or(SceneError::EntityNotFound(id))?;
        self.emit(SceneEvent::EntityRemoved { entity: id, origin });
        Ok(())
    }

    fn allocate_entity_id(&mut self) -> EntityId {
        loop {
            let id = EntityId(self.next_entity_id);
            self.next_entity_id = self.next_entity_id.wrapping_add(1).max(1);
            if !id.is_null() && !self.entities.contains_key(&id) {
                return id;
            }
        }
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Adds a registered component type to an entity.
    pub fn add_component(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
        origin: ChangeOrigin,
    ) -> SceneResult<ComponentId> {
        self.add_component_inner(entity, type_id, true, origin)
    }

    /// Adds a component that is never replicated.
    pub fn add_local_component(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
        origin: ChangeOrigin,
    ) -> SceneResult<ComponentId> {
        self.add_component_inner(entity, type_id, false, origin)
    }

    fn add_component_inner(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
        replicated: bool,
        origin: ChangeOrigin,
    ) -> SceneResult<ComponentId> {
        let target = self.entities.get_mut(&entity).ok_or(SceneError::EntityNotFound(entity))?;
        let id = target.allocate_component_id();
        let mut component = self.registry.instantiate(type_id, id)?;
        component.replicated = replicated;
        target.insert_component(component);
        self.emit(SceneEvent::ComponentAdded { entity, component: id, origin });
        Ok(id)
    }

    /// Adds a fully built component, keeping its id.
    pub fn insert_component(
        &mut self,
        entity: EntityId,
        component: Component,
        origin: ChangeOrigin,
    ) -> SceneResult<()> {
        let target = self.entities.get_mut(&entity).ok_or(SceneError::EntityNotFound(entity))?;
        let id = component.id;
        if target.component(id).is_some() {
            return Err(SceneError::ComponentExists { entity, component: id });
        }
        target.insert_component(component);
        self.emit(SceneEvent::ComponentAdded { entity, component: id, origin });
        Ok(())
    }

    /// Removes a component from an entity.
    pub fn remove_component(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        origin: ChangeOrigin,
    ) -> SceneResult<()> {
        let target = self.entities.get_mut(&entity).ok_or(SceneError::EntityNotFound(entity))?;
        target
            .remove_component(component)
            .ok_or(SceneError::ComponentNotFound { entity, component })?;
        self.emit(SceneEvent::ComponentRemoved { entity, component, origin });
        Ok(())
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Writes an attribute value.
    pub fn set_attribute(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        attribute: AttributeKey,
        value: AttributeValue,
        origin: ChangeOrigin,
    ) -> SceneResult<()> {
        let change_flag = self.change_counter + 1;
        self.component_mut(entity, component)?
            .write(attribute, value, change_flag)?;
        self.change_counter = change_flag;
        self.emit(SceneEvent::AttributeChanged { entity, component, attribute, origin });
        Ok(())
    }

    /// Adds a dynamic attribute with the lowest free id.
    pub fn add_dynamic_attribute(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        name: &str,
        value: AttributeValue,
        origin: ChangeOrigin,
    ) -> SceneResult<u8> {
        let id = self.component_mut(entity, component)?.free_dynamic_id()?;
        self.add_dynamic_attribute_with_id(entity, component, id, name, value, origin)?;
        Ok(id)
    }

    /// Adds a dynamic attribute with a caller-chosen id, replacing any
    /// attribute that already uses it.
    ///
    /// A new id on a full table fails with
    /// [`SceneError::DynamicAttributesFull`] and emits nothing.
    pub fn add_dynamic_attribute_with_id(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        id: u8,
        name: &str,
        value: AttributeValue,
        origin: ChangeOrigin,
    ) -> SceneResult<()> {
        let change_flag = self.change_counter + 1;
        let mut attribute = Attribute::new(name, value);
        attribute.change_flag = change_flag;
        self.component_mut(entity, component)?.insert_dynamic(id, attribute)?;
        self.change_counter = change_flag;
        self.emit(SceneEvent::AttributeAdded { entity, component, attribute: id, origin });
        Ok(())
    }

    /// Removes a dynamic attribute.
    pub fn remove_dynamic_attribute(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        id: u8,
        origin: ChangeOrigin,
    ) -> SceneResult<()> {
        self.component_mut(entity, component)?
            .remove_dynamic(id)
            .ok_or_else(|| SceneError::AttributeNotFound(format!("Dynamic({id})")))?;
        self.emit(SceneEvent::AttributeRemoved { entity, component, attribute: id, origin });
        Ok(())
    }

    fn component_mut(&mut self, entity: EntityId, component: ComponentId) -> SceneResult<&mut Component> {
        self.entities
            .get_mut(&entity)
            .ok_or(SceneError::EntityNotFound(entity))?
            .component_mut(component)
            .ok_or(SceneError::ComponentNotFound { entity, component })
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Triggers an entity action.
    ///
    /// Handlers are external: they observe [`SceneEvent::ActionTriggered`].
    pub fn trigger_action(
        &mut self,
        entity: EntityId,
        action: &str,
        params: Vec<String>,
        exec: ExecType,
        origin: ChangeOrigin,
    ) -> SceneResult<()> {
        if !self.entities.contains_key(&entity) {
            return Err(SceneError::EntityNotFound(entity));
        }
        self.emit(SceneEvent::ActionTriggered {
            entity,
            action: action.to_owned(),
            params,
            exec,
            origin,
        });
        Ok(())
    }

    fn emit(&mut self, event: SceneEvent) {
        if matches!(event.origin(), ChangeOrigin::Disconnected) {
            return;
        }
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
