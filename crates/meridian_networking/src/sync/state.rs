//! # Scene Sync State
//!
//! Per-connection replication bookkeeping.
//!
//! ## Object States
//!
//! ```text
//!   untracked ──created──► new ──flushed──► known ──removed──► removed
//!       ▲                   │                 ▲                   │
//!       └──────removed──────┘                 └──changed/dirty    └─flushed─► untracked
//! ```
//!
//! An object is *new* while the connection has never been told about it;
//! every change to a new object folds into its eventual full creation.
//! Removing a new object erases it without a trace. An attribute snapshot
//! exists exactly when the connection holds that attribute.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use meridian_core::{AttributeKey, AttributeValue, Component, ComponentId, EntityId};

use crate::protocol::{ComponentData, EntityAction, SyncMessage};
use crate::snapshot::AttributeSnapshot;

/// Sync state of one component for one connection.
#[derive(Clone, Debug, Default)]
pub struct ComponentSyncState {
    pub(crate) is_new: bool,
    pub(crate) removed: bool,
    pub(crate) dirty_static: BTreeSet<u8>,
    pub(crate) dirty_dynamic: BTreeSet<u8>,
    pub(crate) new_dynamic: BTreeSet<u8>,
    pub(crate) removed_dynamic: BTreeSet<u8>,
    pub(crate) snapshots: HashMap<AttributeKey, AttributeSnapshot>,
}

impl ComponentSyncState {
    fn new_unsent() -> Self {
        Self {
            is_new: true,
            ..Self::default()
        }
    }

    /// State of a component whose full contents the connection holds.
    fn known_from(data: &ComponentData) -> Self {
        let mut state = Self::default();
        for (index, value) in data.static_values.iter().enumerate() {
            if let Ok(index) = u8::try_from(index) {
                state.snapshots.insert(AttributeKey::Static(index), AttributeSnapshot::capture(value));
            }
        }
        for attr in &data.dynamic {
            state
                .snapshots
                .insert(AttributeKey::Dynamic(attr.id), AttributeSnapshot::capture(&attr.value));
        }
        state
    }

    /// True until the connection has received the full component.
    #[inline]
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    /// True once the component is queued for removal.
    #[inline]
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    /// Attributes with pending edits, statics first.
    pub fn dirty_attributes(&self) -> impl Iterator<Item = AttributeKey> + '_ {
        self.dirty_static
            .iter()
            .map(|index| AttributeKey::Static(*index))
            .chain(self.dirty_dynamic.iter().map(|id| AttributeKey::Dynamic(*id)))
    }

    /// Last value sent for an attribute.
    #[must_use]
    pub fn snapshot(&self, key: AttributeKey) -> Option<&AttributeSnapshot> {
        self.snapshots.get(&key)
    }

    fn clear_dirt(&mut self) {
        self.dirty_static.clear();
        self.dirty_dynamic.clear();
        self.new_dynamic.clear();
        self.removed_dynamic.clear();
    }
}

/// Sync state of one entity for one connection.
#[derive(Clone, Debug, Default)]
pub struct EntitySyncState {
    pub(crate) is_new: bool,
    pub(crate) removed: bool,
    /// The connection still holds an older entity with this id.
    pub(crate) replaces: bool,
    pub(crate) components: BTreeMap<ComponentId, ComponentSyncState>,
    pub(crate) dirty_components: BTreeSet<ComponentId>,
}

impl EntitySyncState {
    /// True until the connection has received the entity.
    #[inline]
    #[must_use]
    pub const fn is_new(&self) -> bool {
        self.is_new
    }

    /// True once the entity is queued for removal.
    #[inline]
    #[must_use]
    pub const fn is_removed(&self) -> bool {
        self.removed
    }

    /// Returns a tracked component.
    #[must_use]
    pub fn component(&self, id: ComponentId) -> Option<&ComponentSyncState> {
        self.components.get(&id)
    }

    /// Components with pending work.
    pub fn dirty_components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.dirty_components.iter().copied()
    }
}

/// Replication bookkeeping for one connection.
#[derive(Clone, Debug, Default)]
pub struct SceneSyncState {
    entities: BTreeMap<EntityId, EntitySyncState>,
    dirty_entities: BTreeSet<EntityId>,
    pending_actions: VecDeque<EntityAction>,
}

impl SceneSyncState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a tracked entity.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> Option<&EntitySyncState> {
        self.entities.get(&id)
    }

    /// Iterates over tracked entity ids.
    pub fn tracked_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    /// Entities with pending work, in id order.
    pub fn dirty_entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.dirty_entities.iter().copied()
    }

    /// True if anything is waiting to be sent.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.dirty_entities.is_empty() || !self.pending_actions.is_empty()
    }

    /// Number of queued actions.
    #[inline]
    #[must_use]
    pub fn pending_action_count(&self) -> usize {
        self.pending_actions.len()
    }

    /// Stops tracking an entity without telling the connection.
    ///
    /// Meant for interest policies restricting a fresh state. A forgotten
    /// entity is reintroduced as new by its next change.
    pub fn forget_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
        self.dirty_entities.remove(&id);
    }

    // =========================================================================
    // Dirty marks
    // =========================================================================

    /// Entity created, or owed a full creation.
    pub fn mark_entity_dirty(&mut self, id: EntityId) {
        let state = self.entities.entry(id).or_insert_with(|| EntitySyncState {
            is_new: true,
            ..EntitySyncState::default()
        });
        if state.removed {
            // Re-created before the removal went out: the full creation
            // replaces whatever the connection still holds.
            state.removed = false;
            state.is_new = true;
            state.replaces = true;
        }
        self.dirty_entities.insert(id);
    }

    /// Entity removed from the scene.
    pub fn mark_entity_removed(&mut self, id: EntityId) {
        let Some(state) = self.entities.get_mut(&id) else {
            return;
        };
        if state.is_new && !state.replaces {
            self.entities.remove(&id);
            self.dirty_entities.remove(&id);
            return;
        }
        state.is_new = false;
        state.replaces = false;
        state.removed = true;
        state.components.clear();
        state.dirty_components.clear();
        self.dirty_entities.insert(id);
    }

    /// Returns the entity state if it accepts incremental marks.
    ///
    /// Untracked entities become new; new or removed ones swallow the mark.
    fn incremental_entity(&mut self, id: EntityId) -> Option<&mut EntitySyncState> {
        if !self.entities.contains_key(&id) {
            self.mark_entity_dirty(id);
            return None;
        }
        let state = self.entities.get_mut(&id)?;
        if state.is_new || state.removed {
            return None;
        }
        Some(state)
    }

    /// Component added, or owed a full creation.
    pub fn mark_component_dirty(&mut self, entity: EntityId, component: ComponentId) {
        let Some(state) = self.incremental_entity(entity) else {
            return;
        };
        let comp = state.components.entry(component).or_insert_with(ComponentSyncState::new_unsent);
        if !comp.is_new {
            // Removed-then-added, or replaced in place.
            *comp = ComponentSyncState {
                snapshots: std::mem::take(&mut comp.snapshots),
                ..ComponentSyncState::new_unsent()
            };
        }
        state.dirty_components.insert(component);
        self.dirty_entities.insert(entity);
    }

    /// Component removed from its entity.
    pub fn mark_component_removed(&mut self, entity: EntityId, component: ComponentId) {
        let Some(state) = self.entities.get_mut(&entity) else {
            return;
        };
        if state.is_new || state.removed {
            return;
        }
        let Some(comp) = state.components.get_mut(&component) else {
            return;
        };
        if comp.is_new && comp.snapshots.is_empty() {
            state.components.remove(&component);
            state.dirty_components.remove(&component);
            return;
        }
        comp.removed = true;
        comp.is_new = false;
        comp.clear_dirt();
        state.dirty_components.insert(component);
        self.dirty_entities.insert(entity);
    }

    /// Returns the component state if it accepts attribute marks.
    fn incremental_component(
        &mut self,
        entity: EntityId,
        component: ComponentId,
    ) -> Option<(&mut ComponentSyncState, bool)> {
        let missing = !self.incremental_entity(entity)?.components.contains_key(&component);
        if missing {
            self.mark_component_dirty(entity, component);
            return None;
        }
        let state = self.entities.get_mut(&entity)?;
        let comp = state.components.get_mut(&component)?;
        if comp.is_new || comp.removed {
            return None;
        }
        let newly_dirty = state.dirty_components.insert(component);
        Some((comp, newly_dirty))
    }

    /// Attribute value changed.
    pub fn mark_attribute_dirty(&mut self, entity: EntityId, component: ComponentId, key: AttributeKey) {
        let Some((comp, _)) = self.incremental_component(entity, component) else {
            return;
        };
        match key {
            AttributeKey::Static(index) => {
                comp.dirty_static.insert(index);
            }
            AttributeKey::Dynamic(id) => {
                if !comp.new_dynamic.contains(&id) {
                    comp.dirty_dynamic.insert(id);
                }
            }
        }
        self.dirty_entities.insert(entity);
    }

    /// Dynamic attribute added (or replaced).
    pub fn mark_attribute_created(&mut self, entity: EntityId, component: ComponentId, id: u8) {
        let Some((comp, _)) = self.incremental_component(entity, component) else {
            return;
        };
        comp.removed_dynamic.remove(&id);
        comp.dirty_dynamic.remove(&id);
        comp.new_dynamic.insert(id);
        self.dirty_entities.insert(entity);
    }

    /// Dynamic attribute removed.
    pub fn mark_attribute_removed(&mut self, entity: EntityId, component: ComponentId, id: u8) {
        let Some((comp, newly_dirty)) = self.incremental_component(entity, component) else {
            return;
        };
        comp.new_dynamic.remove(&id);
        comp.dirty_dynamic.remove(&id);
        if comp.snapshots.contains_key(&AttributeKey::Dynamic(id)) {
            comp.removed_dynamic.insert(id);
            self.dirty_entities.insert(entity);
        } else if newly_dirty {
            // Nothing owed after all.
            if let Some(state) = self.entities.get_mut(&entity) {
                state.dirty_components.remove(&component);
            }
        }
    }

    /// Queues an action for this connection.
    pub fn queue_action(&mut self, action: EntityAction) {
        self.pending_actions.push_back(action);
    }

    pub(crate) fn front_action(&self) -> Option<&EntityAction> {
        self.pending_actions.front()
    }

    pub(crate) fn pop_action(&mut self) {
        self.pending_actions.pop_front();
    }

    // =========================================================================
    // Processed marks (changes that came from this connection)
    // =========================================================================

    /// The connection created this entity itself.
    pub fn mark_entity_processed(&mut self, id: EntityId) {
        self.entities.insert(id, EntitySyncState::default());
        self.dirty_entities.remove(&id);
    }

    /// The connection removed this entity itself.
    pub fn mark_entity_removal_processed(&mut self, id: EntityId) {
        self.forget_entity(id);
    }

    /// The connection created this component itself.
    pub fn mark_component_processed(&mut self, entity: EntityId, component: &Component) {
        let state = self.entities.entry(entity).or_default();
        if state.is_new || state.removed {
            return;
        }
        state
            .components
            .insert(component.id, ComponentSyncState::known_from(&ComponentData::from_component(component)));
        state.dirty_components.remove(&component.id);
    }

    /// The connection removed this component itself.
    pub fn mark_component_removal_processed(&mut self, entity: EntityId, component: ComponentId) {
        if let Some(state) = self.entities.get_mut(&entity) {
            state.components.remove(&component);
            state.dirty_components.remove(&component);
        }
    }

    /// The connection wrote (or created) this attribute value itself.
    pub fn mark_attribute_processed(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        key: AttributeKey,
        value: &AttributeValue,
    ) {
        let Some(comp) = self.known_component_mut(entity, component) else {
            return;
        };
        comp.snapshots.insert(key, AttributeSnapshot::capture(value));
        match key {
            AttributeKey::Static(index) => {
                comp.dirty_static.remove(&index);
            }
            AttributeKey::Dynamic(id) => {
                comp.dirty_dynamic.remove(&id);
                comp.new_dynamic.remove(&id);
                comp.removed_dynamic.remove(&id);
            }
        }
    }

    /// The connection removed this dynamic attribute itself.
    pub fn mark_attribute_removal_processed(&mut self, entity: EntityId, component: ComponentId, id: u8) {
        let Some(comp) = self.known_component_mut(entity, component) else {
            return;
        };
        comp.snapshots.remove(&AttributeKey::Dynamic(id));
        comp.dirty_dynamic.remove(&id);
        comp.new_dynamic.remove(&id);
        comp.removed_dynamic.remove(&id);
    }

    fn known_component_mut(&mut self, entity: EntityId, component: ComponentId) -> Option<&mut ComponentSyncState> {
        let state = self.entities.get_mut(&entity)?;
        if state.is_new || state.removed {
            return None;
        }
        state.components.get_mut(&component).filter(|comp| !comp.is_new && !comp.removed)
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Records that a message reached the transport.
    pub(crate) fn record_sent(&mut self, message: &SyncMessage) {
        match message {
            SyncMessage::CreateEntity(m) => {
                let state = self.entities.entry(m.entity).or_default();
                state.is_new = false;
                state.removed = false;
                state.replaces = false;
                state.components = m
                    .components
                    .iter()
                    .map(|data| (data.id, ComponentSyncState::known_from(data)))
                    .collect();
            }
            SyncMessage::CreateComponents(m) => {
                if let Some(state) = self.entities.get_mut(&m.entity) {
                    for data in &m.components {
                        state.components.insert(data.id, ComponentSyncState::known_from(data));
                    }
                }
            }
            SyncMessage::CreateAttributes(m) => {
                if let Some(comp) = self.component_mut(m.entity, m.component) {
                    for attr in &m.attributes {
                        comp.snapshots
                            .insert(AttributeKey::Dynamic(attr.id), AttributeSnapshot::capture(&attr.value));
                    }
                }
            }
            SyncMessage::EditAttributes(m) => {
                if let Some(comp) = self.component_mut(m.entity, m.component) {
                    for (index, value) in &m.static_edits {
                        comp.snapshots.insert(AttributeKey::Static(*index), AttributeSnapshot::capture(value));
                    }
                    for (id, value) in &m.dynamic_edits {
                        comp.snapshots.insert(AttributeKey::Dynamic(*id), AttributeSnapshot::capture(value));
                    }
                }
            }
            SyncMessage::RemoveAttributes(m) => {
                if let Some(comp) = self.component_mut(m.entity, m.component) {
                    for id in &m.attributes {
                        comp.snapshots.remove(&AttributeKey::Dynamic(*id));
                    }
                }
            }
            SyncMessage::RemoveComponents(m) => {
                if let Some(state) = self.entities.get_mut(&m.entity) {
                    for id in &m.components {
                        state.components.remove(id);
                    }
                }
            }
            SyncMessage::RemoveEntity(m) => {
                self.entities.remove(&m.entity);
            }
            SyncMessage::EntityAction(_) => {}
        }
    }

    fn component_mut(&mut self, entity: EntityId, component: ComponentId) -> Option<&mut ComponentSyncState> {
        self.entities.get_mut(&entity)?.components.get_mut(&component)
    }

    /// Clears the dirt of an entity whose planned messages were all sent.
    ///
    /// Components still flagged new were not sent and are dropped.
    pub(crate) fn clear_entity(&mut self, id: EntityId) {
        self.dirty_entities.remove(&id);
        let Some(state) = self.entities.get_mut(&id) else {
            return;
        };
        if state.is_new || state.removed {
            // Nothing reached the connection.
            self.entities.remove(&id);
            return;
        }
        let dirty = std::mem::take(&mut state.dirty_components);
        for component in dirty {
            let Some(comp) = state.components.get_mut(&component) else {
                continue;
            };
            if comp.is_new || comp.removed {
                state.components.remove(&component);
            } else {
                comp.clear_dirt();
            }
        }
    }
}
