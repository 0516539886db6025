//! # Flush Planning
//!
//! Turns one entity's pending state into the minimal list of messages.
//!
//! ## Per-object order
//!
//! ```text
//! removed entity  -> RemoveEntity (nothing else)
//! new entity      -> CreateEntity [+ CreateComponents overflow]
//! known entity    -> CreateComponents
//!                    -> CreateAttributes -> RemoveAttributes -> EditAttributes   (per component)
//!                    -> RemoveComponents
//! ```
//!
//! Messages are split by the byte cap and the per-message edit cap. Objects
//! that cannot fit in any message are logged and skipped.

use meridian_core::{AttributeKey, Component, ComponentId, EntityId, Scene};
use tracing::warn;

use super::state::{ComponentSyncState, SceneSyncState};
use crate::config::SyncConfig;
use crate::protocol::{
    encoded_component_len, encoded_dynamic_len, encoded_value_len, varint_len, ComponentData,
    CreateAttributes, CreateComponents, CreateEntity, DynamicAttributeData, EditAttributes,
    RemoveAttributes, RemoveComponents, RemoveEntity, SyncMessage,
};
use crate::snapshot::diff;

/// Worst case of a varint count prefix.
const COUNT_PREFIX: usize = 5;

/// Largest static bitmask, in bytes.
const MAX_BITMASK_LEN: usize = 32;

/// Plans every message owed to one connection for one entity.
pub(crate) fn plan_entity(
    state: &SceneSyncState,
    scene: &Scene,
    id: EntityId,
    config: &SyncConfig,
) -> Vec<SyncMessage> {
    let mut out = Vec::new();
    let Some(entity_state) = state.entity(id) else {
        return out;
    };
    if entity_state.is_removed() {
        out.push(SyncMessage::RemoveEntity(RemoveEntity { entity: id }));
        return out;
    }
    let Some(entity) = scene.entity(id) else {
        return out;
    };
    if entity.local {
        return out;
    }

    if entity_state.is_new() {
        let components = entity
            .components()
            .filter(|c| c.replicated)
            .map(ComponentData::from_component)
            .collect();
        let mut batches = pack_components(id, components, config.max_message_size).into_iter();
        out.push(SyncMessage::CreateEntity(CreateEntity {
            entity: id,
            components: batches.next().unwrap_or_default(),
        }));
        out.extend(batches.map(|components| {
            SyncMessage::CreateComponents(CreateComponents { entity: id, components })
        }));
        return out;
    }

    let mut created = Vec::new();
    let mut incremental = Vec::new();
    let mut removed = Vec::new();
    for component_id in entity_state.dirty_components() {
        let Some(comp_state) = entity_state.component(component_id) else {
            continue;
        };
        if comp_state.is_removed() {
            removed.push(component_id);
            continue;
        }
        let Some(component) = entity.component(component_id) else {
            continue;
        };
        if !component.replicated {
            continue;
        }
        if comp_state.is_new() {
            created.push(ComponentData::from_component(component));
        } else {
            plan_component(id, component, comp_state, config, &mut incremental);
        }
    }

    out.extend(
        pack_components(id, created, config.max_message_size)
            .into_iter()
            .filter(|batch| !batch.is_empty())
            .map(|components| SyncMessage::CreateComponents(CreateComponents { entity: id, components })),
    );
    out.append(&mut incremental);

    let per_message = (config.max_message_size.saturating_sub(varint_len(id.0) + COUNT_PREFIX) / COUNT_PREFIX).max(1);
    out.extend(removed.chunks(per_message).map(|chunk| {
        SyncMessage::RemoveComponents(RemoveComponents {
            entity: id,
            components: chunk.to_vec(),
        })
    }));
    out
}

/// Groups full component states into messages that fit the byte cap.
///
/// Always returns at least one (possibly empty) batch.
fn pack_components(entity: EntityId, components: Vec<ComponentData>, limit: usize) -> Vec<Vec<ComponentData>> {
    let room = limit.saturating_sub(varint_len(entity.0) + COUNT_PREFIX);
    let mut batches = vec![Vec::new()];
    let mut used = 0;
    for data in components {
        let len = encoded_component_len(&data);
        if len > room {
            warn!(
                %entity,
                component = %data.id,
                bytes = len,
                limit,
                "component does not fit in any message, skipping"
            );
            continue;
        }
        if used + len > room {
            batches.push(Vec::new());
            used = 0;
        }
        used += len;
        if let Some(batch) = batches.last_mut() {
            batch.push(data);
        }
    }
    batches
}

fn plan_component(
    entity: EntityId,
    component: &Component,
    state: &ComponentSyncState,
    config: &SyncConfig,
    out: &mut Vec<SyncMessage>,
) {
    let header = varint_len(entity.0) + varint_len(component.id.0);
    let limit = config.max_message_size;

    // New dynamic attributes go first so the edit below finds them.
    let created: Vec<DynamicAttributeData> = state
        .new_dynamic
        .iter()
        .filter_map(|id| {
            component.attribute(AttributeKey::Dynamic(*id)).map(|attr| DynamicAttributeData {
                id: *id,
                name: attr.name.clone(),
                value: attr.value.clone(),
            })
        })
        .collect();
    let room = limit.saturating_sub(header + 1);
    let mut batch: Vec<DynamicAttributeData> = Vec::new();
    let mut used = 0;
    for attr in created {
        let len = encoded_dynamic_len(&attr);
        if len > room {
            warn!(%entity, component = %component.id, attribute = attr.id, bytes = len, "dynamic attribute too large, skipping");
            continue;
        }
        if used + len > room {
            out.push(create_attributes(entity, component.id, std::mem::take(&mut batch)));
            used = 0;
        }
        used += len;
        batch.push(attr);
    }
    if !batch.is_empty() {
        out.push(create_attributes(entity, component.id, batch));
    }

    if !state.removed_dynamic.is_empty() {
        out.push(SyncMessage::RemoveAttributes(RemoveAttributes {
            entity,
            component: component.id,
            attributes: state.removed_dynamic.iter().copied().collect(),
        }));
    }

    plan_edits(entity, component, state, config, out);
}

fn create_attributes(entity: EntityId, component: ComponentId, attributes: Vec<DynamicAttributeData>) -> SyncMessage {
    SyncMessage::CreateAttributes(CreateAttributes { entity, component, attributes })
}

fn plan_edits(
    entity: EntityId,
    component: &Component,
    state: &ComponentSyncState,
    config: &SyncConfig,
    out: &mut Vec<SyncMessage>,
) {
    let header = varint_len(entity.0) + varint_len(component.id.0) + 1 + MAX_BITMASK_LEN + 1;
    let room = config.max_message_size.saturating_sub(header);

    let mut current = empty_edit(entity, component.id);
    let mut used = 0;
    for key in state.dirty_attributes() {
        let Some(attr) = component.attribute(key) else {
            continue;
        };
        if diff(state.snapshot(key), &attr.value).is_none() {
            continue;
        }
        let len = match key {
            AttributeKey::Static(_) => encoded_value_len(&attr.value),
            AttributeKey::Dynamic(_) => 1 + encoded_value_len(&attr.value),
        };
        if len > room {
            warn!(%entity, component = %component.id, attribute = ?key, bytes = len, "attribute value too large, skipping");
            continue;
        }
        let count = current.static_edits.len() + current.dynamic_edits.len();
        if count >= config.max_edits_per_message || used + len > room {
            out.push(SyncMessage::EditAttributes(std::mem::replace(
                &mut current,
                empty_edit(entity, component.id),
            )));
            used = 0;
        }
        used += len;
        match key {
            AttributeKey::Static(index) => current.static_edits.push((index, attr.value.clone())),
            AttributeKey::Dynamic(id) => current.dynamic_edits.push((id, attr.value.clone())),
        }
    }
    if !current.static_edits.is_empty() || !current.dynamic_edits.is_empty() {
        out.push(SyncMessage::EditAttributes(current));
    }
}

fn empty_edit(entity: EntityId, component: ComponentId) -> EditAttributes {
    EditAttributes {
        entity,
        component,
        static_edits: Vec::new(),
        dynamic_edits: Vec::new(),
    }
}
