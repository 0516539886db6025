//! # Message Definitions
//!
//! Every sync message names its own entity (and component where relevant),
//! so a receiver can apply messages for different objects independently.

use meridian_core::{AttributeValue, Component, ComponentId, ComponentTypeId, EntityId, ExecType};

/// Wire identifiers of the sync messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageId {
    /// Full creation of an entity with all its components.
    CreateEntity = 110,
    /// Full creation of components on a known entity.
    CreateComponents = 111,
    /// Creation of dynamic attributes on a known component.
    CreateAttributes = 112,
    /// Changed attribute values of a known component.
    EditAttributes = 113,
    /// Removal of dynamic attributes.
    RemoveAttributes = 114,
    /// Removal of components.
    RemoveComponents = 115,
    /// Removal of an entity.
    RemoveEntity = 116,
    /// Entity action invocation.
    EntityAction = 120,
}

impl MessageId {
    /// Every sync message id.
    pub const ALL: [Self; 8] = [
        Self::CreateEntity,
        Self::CreateComponents,
        Self::CreateAttributes,
        Self::EditAttributes,
        Self::RemoveAttributes,
        Self::RemoveComponents,
        Self::RemoveEntity,
        Self::EntityAction,
    ];

    /// Parses a wire id.
    #[must_use]
    pub const fn from_u8(id: u8) -> Option<Self> {
        Some(match id {
            110 => Self::CreateEntity,
            111 => Self::CreateComponents,
            112 => Self::CreateAttributes,
            113 => Self::EditAttributes,
            114 => Self::RemoveAttributes,
            115 => Self::RemoveComponents,
            116 => Self::RemoveEntity,
            120 => Self::EntityAction,
            _ => return None,
        })
    }

    /// Dense index, for per-kind counters.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::CreateEntity => 0,
            Self::CreateComponents => 1,
            Self::CreateAttributes => 2,
            Self::EditAttributes => 3,
            Self::RemoveAttributes => 4,
            Self::RemoveComponents => 5,
            Self::RemoveEntity => 6,
            Self::EntityAction => 7,
        }
    }

    /// Whether the transport must deliver this message.
    #[inline]
    #[must_use]
    pub const fn is_reliable(self) -> bool {
        true
    }

    /// Whether the transport must keep this message in order.
    #[inline]
    #[must_use]
    pub const fn is_ordered(self) -> bool {
        true
    }
}

/// A dynamic attribute with its metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicAttributeData {
    /// Runtime id within the component.
    pub id: u8,
    /// Attribute name.
    pub name: String,
    /// Value; its tag is the attribute type.
    pub value: AttributeValue,
}

/// Full state of one component.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentData {
    /// Component type.
    pub type_id: ComponentTypeId,
    /// Instance id within the entity.
    pub id: ComponentId,
    /// Static attribute values in fixed order.
    pub static_values: Vec<AttributeValue>,
    /// Dynamic attributes.
    pub dynamic: Vec<DynamicAttributeData>,
}

impl ComponentData {
    /// Captures the full state of a component.
    #[must_use]
    pub fn from_component(component: &Component) -> Self {
        Self {
            type_id: component.type_id,
            id: component.id,
            static_values: component
                .static_attributes()
                .iter()
                .map(|attr| attr.value.clone())
                .collect(),
            dynamic: component
                .dynamic_attributes()
                .map(|(id, attr)| DynamicAttributeData {
                    id,
                    name: attr.name.clone(),
                    value: attr.value.clone(),
                })
                .collect(),
        }
    }
}

/// `CreateEntity{entityId, components}`.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateEntity {
    /// Entity.
    pub entity: EntityId,
    /// Full component states.
    pub components: Vec<ComponentData>,
}

/// `CreateComponents{entityId, components}`.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateComponents {
    /// Entity.
    pub entity: EntityId,
    /// Full component states.
    pub components: Vec<ComponentData>,
}

/// `CreateAttributes{entityId, componentId, attrs}`.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateAttributes {
    /// Entity.
    pub entity: EntityId,
    /// Component.
    pub component: ComponentId,
    /// New dynamic attributes.
    pub attributes: Vec<DynamicAttributeData>,
}

/// `EditAttributes{entityId, componentId, staticBitmask, staticValues, dynamicEdits}`.
///
/// Static edits travel as a bitmask over static indices followed by the
/// values in index order; they are held here as sorted `(index, value)` pairs.
#[derive(Clone, Debug, PartialEq)]
pub struct EditAttributes {
    /// Entity.
    pub entity: EntityId,
    /// Component.
    pub component: ComponentId,
    /// Changed static attributes, sorted by index.
    pub static_edits: Vec<(u8, AttributeValue)>,
    /// Changed dynamic attributes.
    pub dynamic_edits: Vec<(u8, AttributeValue)>,
}

/// `RemoveAttributes{entityId, componentId, attrIds}`.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoveAttributes {
    /// Entity.
    pub entity: EntityId,
    /// Component.
    pub component: ComponentId,
    /// Removed dynamic attribute ids.
    pub attributes: Vec<u8>,
}

/// `RemoveComponents{entityId, componentIds}`.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoveComponents {
    /// Entity.
    pub entity: EntityId,
    /// Removed components.
    pub components: Vec<ComponentId>,
}

/// `RemoveEntity{entityId}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemoveEntity {
    /// Entity.
    pub entity: EntityId,
}

/// `EntityAction{entityId, actionName, params, execType}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityAction {
    /// Target entity.
    pub entity: EntityId,
    /// Action name.
    pub action: String,
    /// Parameters.
    pub params: Vec<String>,
    /// Where to execute.
    pub exec: ExecType,
}

/// Any sync message.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncMessage {
    /// See [`CreateEntity`].
    CreateEntity(CreateEntity),
    /// See [`CreateComponents`].
    CreateComponents(CreateComponents),
    /// See [`CreateAttributes`].
    CreateAttributes(CreateAttributes),
    /// See [`EditAttributes`].
    EditAttributes(EditAttributes),
    /// See [`RemoveAttributes`].
    RemoveAttributes(RemoveAttributes),
    /// See [`RemoveComponents`].
    RemoveComponents(RemoveComponents),
    /// See [`RemoveEntity`].
    RemoveEntity(RemoveEntity),
    /// See [`EntityAction`].
    EntityAction(EntityAction),
}

impl SyncMessage {
    /// Wire id of this message.
    #[must_use]
    pub const fn id(&self) -> MessageId {
        match self {
            Self::CreateEntity(_) => MessageId::CreateEntity,
            Self::CreateComponents(_) => MessageId::CreateComponents,
            Self::CreateAttributes(_) => MessageId::CreateAttributes,
            Self::EditAttributes(_) => MessageId::EditAttributes,
            Self::RemoveAttributes(_) => MessageId::RemoveAttributes,
            Self::RemoveComponents(_) => MessageId::RemoveComponents,
            Self::RemoveEntity(_) => MessageId::RemoveEntity,
            Self::EntityAction(_) => MessageId::EntityAction,
        }
    }

    /// Entity the message refers to.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::CreateEntity(m) => m.entity,
            Self::CreateComponents(m) => m.entity,
            Self::CreateAttributes(m) => m.entity,
            Self::EditAttributes(m) => m.entity,
            Self::RemoveAttributes(m) => m.entity,
            Self::RemoveComponents(m) => m.entity,
            Self::RemoveEntity(m) => m.entity,
            Self::EntityAction(m) => m.entity,
        }
    }
}
