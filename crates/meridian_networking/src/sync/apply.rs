//! # Inbound Apply
//!
//! Replays decoded structural messages against the scene through its
//! mutation API, tagging every change with the sender's origin.
//!
//! A message naming an entity or component that no longer exists is a
//! stale reference: it is skipped, not an error.

use meridian_core::{
    Attribute, AttributeKey, ChangeOrigin, Component, EntityId, Scene, SceneError, SceneResult,
};
use tracing::warn;

use crate::protocol::{ComponentData, SyncMessage};

/// Result of applying one message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ApplyOutcome {
    /// Every reference resolved.
    Applied,
    /// Some target no longer exists; the rest was applied.
    Stale,
}

struct Applier<'a> {
    scene: &'a mut Scene,
    origin: ChangeOrigin,
    stale: bool,
    removing: bool,
}

impl Applier<'_> {
    /// Folds a scene result into the outcome.
    fn check(&mut self, result: SceneResult<()>) {
        match result {
            Ok(()) => {}
            Err(SceneError::EntityNotFound(_) | SceneError::ComponentNotFound { .. }) => self.stale = true,
            Err(SceneError::AttributeNotFound(_)) if self.removing => self.stale = true,
            Err(error) => warn!(%error, "inbound change rejected by scene"),
        }
    }
}

/// Applies a structural message. Entity actions are not handled here.
pub(crate) fn apply_message(scene: &mut Scene, message: SyncMessage, origin: ChangeOrigin) -> ApplyOutcome {
    let mut applier = Applier {
        scene,
        origin,
        stale: false,
        removing: false,
    };
    match message {
        SyncMessage::CreateEntity(m) => applier.create_entity(m.entity, m.components),
        SyncMessage::CreateComponents(m) => {
            if applier.scene.contains_entity(m.entity) {
                for data in m.components {
                    applier.apply_component(m.entity, data);
                }
            } else {
                applier.stale = true;
            }
        }
        SyncMessage::CreateAttributes(m) => {
            for attr in m.attributes {
                let result = applier.scene.add_dynamic_attribute_with_id(
                    m.entity,
                    m.component,
                    attr.id,
                    &attr.name,
                    attr.value,
                    origin,
                );
                applier.check(result);
            }
        }
        SyncMessage::EditAttributes(m) => {
            let edits = m
                .static_edits
                .into_iter()
                .map(|(index, value)| (AttributeKey::Static(index), value))
                .chain(m.dynamic_edits.into_iter().map(|(id, value)| (AttributeKey::Dynamic(id), value)));
            for (key, value) in edits {
                let result = applier.scene.set_attribute(m.entity, m.component, key, value, origin);
                applier.check(result);
            }
        }
        SyncMessage::RemoveAttributes(m) => {
            applier.removing = true;
            for id in m.attributes {
                let result = applier.scene.remove_dynamic_attribute(m.entity, m.component, id, origin);
                applier.check(result);
            }
        }
        SyncMessage::RemoveComponents(m) => {
            for component in m.components {
                let result = applier.scene.remove_component(m.entity, component, origin);
                applier.check(result);
            }
        }
        SyncMessage::RemoveEntity(m) => {
            let result = applier.scene.remove_entity(m.entity, origin);
            applier.check(result);
        }
        SyncMessage::EntityAction(_) => {}
    }
    if applier.stale {
        ApplyOutcome::Stale
    } else {
        ApplyOutcome::Applied
    }
}

impl Applier<'_> {
    /// Creates the entity, or brings an existing one to exactly the sent
    /// component set.
    fn create_entity(&mut self, entity: EntityId, components: Vec<ComponentData>) {
        if let Some(existing) = self.scene.entity(entity) {
            let stale: Vec<_> = existing
                .components()
                .filter(|c| c.replicated && !components.iter().any(|data| data.id == c.id))
                .map(|c| c.id)
                .collect();
            for component in stale {
                let result = self.scene.remove_component(entity, component, self.origin);
                self.check(result);
            }
        } else if let Err(error) = self.scene.create_entity_with_id(entity, self.origin) {
            warn!(%entity, %error, "cannot create replicated entity");
            return;
        }
        for data in components {
            self.apply_component(entity, data);
        }
    }

    /// Adds a component, or overwrites an existing one in place.
    fn apply_component(&mut self, entity: EntityId, data: ComponentData) {
        let Some(existing) = self.scene.component(entity, data.id) else {
            self.insert_component(entity, data);
            return;
        };
        if existing.type_id != data.type_id {
            let result = self.scene.remove_component(entity, data.id, self.origin);
            self.check(result);
            self.insert_component(entity, data);
            return;
        }

        let mut writes = Vec::new();
        for (index, value) in data.static_values.into_iter().enumerate() {
            let Ok(index) = u8::try_from(index) else {
                break;
            };
            let key = AttributeKey::Static(index);
            if existing.attribute(key).is_some_and(|attr| attr.value != value) {
                writes.push((key, value));
            }
        }
        let removed: Vec<u8> = existing
            .dynamic_attributes()
            .filter(|(id, _)| !data.dynamic.iter().any(|attr| attr.id == *id))
            .map(|(id, _)| id)
            .collect();
        let mut added = Vec::new();
        for attr in data.dynamic {
            match existing.attribute(AttributeKey::Dynamic(attr.id)) {
                Some(current) if current.name == attr.name && current.attribute_type() == attr.value.attribute_type() => {
                    if current.value != attr.value {
                        writes.push((AttributeKey::Dynamic(attr.id), attr.value));
                    }
                }
                _ => added.push(attr),
            }
        }

        for id in removed {
            let result = self.scene.remove_dynamic_attribute(entity, data.id, id, self.origin);
            self.check(result);
        }
        for attr in added {
            let result =
                self.scene
                    .add_dynamic_attribute_with_id(entity, data.id, attr.id, &attr.name, attr.value, self.origin);
            self.check(result);
        }
        for (key, value) in writes {
            let result = self.scene.set_attribute(entity, data.id, key, value, self.origin);
            self.check(result);
        }
    }

    fn insert_component(&mut self, entity: EntityId, data: ComponentData) {
        let mut component: Component = match self.scene.registry().instantiate(data.type_id, data.id) {
            Ok(component) => component,
            Err(error) => {
                warn!(%entity, component = %data.id, %error, "skipping component of unknown type");
                return;
            }
        };
        for (index, value) in data.static_values.into_iter().enumerate() {
            let Ok(index) = u8::try_from(index) else {
                break;
            };
            if let Err(error) = component.set_value(AttributeKey::Static(index), value) {
                warn!(%entity, component = %data.id, index, %error, "ignoring static value");
            }
        }
        for attr in data.dynamic {
            if let Err(error) = component.insert_dynamic(attr.id, Attribute::new(attr.name, attr.value)) {
                warn!(%entity, component = %data.id, %error, "ignoring dynamic attribute");
            }
        }
        let result = self.scene.insert_component(entity, component, self.origin);
        self.check(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        CreateComponents, CreateEntity, DynamicAttributeData, EditAttributes, RemoveEntity,
    };
    use meridian_core::{AttributeValue, ComponentId, ComponentSchema, ComponentTypeId, ConnectionId};

    const PLACEABLE: ComponentTypeId = ComponentTypeId(20);
    const ORIGIN: ChangeOrigin = ChangeOrigin::Replicated(ConnectionId(1));

    fn scene() -> Scene {
        let mut scene = Scene::new();
        scene.registry_mut().register(
            PLACEABLE,
            ComponentSchema::new("Placeable", vec![("a", AttributeValue::Int(0))]),
        );
        scene
    }

    fn data(id: u32, a: i32) -> ComponentData {
        ComponentData {
            type_id: PLACEABLE,
            id: ComponentId(id),
            static_values: vec![AttributeValue::Int(a)],
            dynamic: vec![DynamicAttributeData {
                id: 2,
                name: "speed".to_owned(),
                value: AttributeValue::Real(1.0),
            }],
        }
    }

    #[test]
    fn test_create_entity_with_sent_ids() {
        let mut scene = scene();
        let message = SyncMessage::CreateEntity(CreateEntity {
            entity: EntityId(40),
            components: vec![data(3, 5)],
        });
        assert_eq!(apply_message(&mut scene, message, ORIGIN), ApplyOutcome::Applied);

        let component = scene.component(EntityId(40), ComponentId(3)).unwrap();
        assert_eq!(component.attribute(AttributeKey::Static(0)).unwrap().value, AttributeValue::Int(5));
        assert_eq!(
            component.attribute(AttributeKey::Dynamic(2)).unwrap().value,
            AttributeValue::Real(1.0)
        );
    }

    #[test]
    fn test_create_entity_replaces_component_set() {
        let mut scene = scene();
        let first = SyncMessage::CreateEntity(CreateEntity {
            entity: EntityId(1),
            components: vec![data(1, 1), data(2, 2)],
        });
        apply_message(&mut scene, first, ORIGIN);
        let second = SyncMessage::CreateEntity(CreateEntity {
            entity: EntityId(1),
            components: vec![data(2, 9)],
        });
        apply_message(&mut scene, second, ORIGIN);

        let entity = scene.entity(EntityId(1)).unwrap();
        assert_eq!(entity.component_count(), 1);
        assert_eq!(
            entity.component(ComponentId(2)).unwrap().attribute(AttributeKey::Static(0)).unwrap().value,
            AttributeValue::Int(9)
        );
    }

    #[test]
    fn test_stale_references_are_no_ops() {
        let mut scene = scene();
        let edit = SyncMessage::EditAttributes(EditAttributes {
            entity: EntityId(5),
            component: ComponentId(1),
            static_edits: vec![(0, AttributeValue::Int(1))],
            dynamic_edits: Vec::new(),
        });
        assert_eq!(apply_message(&mut scene, edit, ORIGIN), ApplyOutcome::Stale);

        let create = SyncMessage::CreateComponents(CreateComponents {
            entity: EntityId(5),
            components: vec![data(1, 1)],
        });
        assert_eq!(apply_message(&mut scene, create, ORIGIN), ApplyOutcome::Stale);

        let remove = SyncMessage::RemoveEntity(RemoveEntity { entity: EntityId(5) });
        assert_eq!(apply_message(&mut scene, remove, ORIGIN), ApplyOutcome::Stale);
        assert_eq!(scene.entity_count(), 0);
    }

    #[test]
    fn test_unknown_component_type_is_skipped() {
        let mut scene = scene();
        let mut unknown = data(1, 1);
        unknown.type_id = ComponentTypeId(99);
        let message = SyncMessage::CreateEntity(CreateEntity {
            entity: EntityId(1),
            components: vec![unknown, data(2, 2)],
        });
        apply_message(&mut scene, message, ORIGIN);
        assert_eq!(scene.entity(EntityId(1)).unwrap().component_count(), 1);
    }
}
