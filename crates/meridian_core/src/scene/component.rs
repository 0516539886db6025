//! # Component System
//!
//! Components are typed bundles of attributes attached to one entity.
//!
//! The set and order of *static* attributes is fixed by the component type
//! and described by a [`ComponentSchema`] in the [`ComponentRegistry`].
//! *Dynamic* attributes carry their own name and type and can be added or
//! removed at runtime.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use tracing::warn;

use super::attribute::{Attribute, AttributeKey, AttributeType, AttributeValue};
use crate::error::{SceneError, SceneResult};
use crate::{MAX_DYNAMIC_ATTRIBUTES, MAX_STATIC_ATTRIBUTES};

/// Component instance id, unique within its entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentId(pub u32);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Component type identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ComponentTypeId(pub u32);

impl fmt::Display for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A component instance.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    /// Instance id within the owning entity.
    pub id: ComponentId,
    /// Component type.
    pub type_id: ComponentTypeId,
    /// Non-replicated components stay in this process.
    pub replicated: bool,
    static_attributes: Vec<Attribute>,
    dynamic_attributes: BTreeMap<u8, Attribute>,
}

impl Component {
    /// Creates a replicated component with the given static attributes.
    #[must_use]
    pub fn new(id: ComponentId, type_id: ComponentTypeId, static_attributes: Vec<Attribute>) -> Self {
        Self {
            id,
            type_id,
            replicated: true,
            static_attributes,
            dynamic_attributes: BTreeMap::new(),
        }
    }

    /// Static attributes in their fixed order.
    #[inline]
    #[must_use]
    pub fn static_attributes(&self) -> &[Attribute] {
        &self.static_attributes
    }

    /// Dynamic attributes in id order.
    pub fn dynamic_attributes(&self) -> impl Iterator<Item = (u8, &Attribute)> {
        self.dynamic_attributes.iter().map(|(id, attr)| (*id, attr))
    }

    /// Number of dynamic attributes.
    #[inline]
    #[must_use]
    pub fn dynamic_count(&self) -> usize {
        self.dynamic_attributes.len()
    }

    /// Looks up an attribute by key.
    #[must_use]
    pub fn attribute(&self, key: AttributeKey) -> Option<&Attribute> {
        match key {
            AttributeKey::Static(index) => self.static_attributes.get(usize::from(index)),
            AttributeKey::Dynamic(id) => self.dynamic_attributes.get(&id),
        }
    }

    /// Writes an attribute value, checking its type.
    pub(crate) fn write(&mut self, key: AttributeKey, value: AttributeValue, change_flag: u64) -> SceneResult<()> {
        let attribute = match key {
            AttributeKey::Static(index) => self.static_attributes.get_mut(usize::from(index)),
            AttributeKey::Dynamic(id) => self.dynamic_attributes.get_mut(&id),
        }
        .ok_or_else(|| SceneError::AttributeNotFound(format!("{key:?}")))?;

        if attribute.attribute_type() != value.attribute_type() {
            return Err(SceneError::TypeMismatch {
                expected: attribute.attribute_type(),
                actual: value.attribute_type(),
            });
        }
        attribute.value = value;
        attribute.change_flag = change_flag;
        Ok(())
    }

    /// Returns the lowest unused dynamic attribute id.
    pub(crate) fn free_dynamic_id(&self) -> SceneResult<u8> {
        if self.dynamic_attributes.len() >= MAX_DYNAMIC_ATTRIBUTES {
            return Err(SceneError::DynamicAttributesFull(self.id));
        }
        (0..=u8::MAX)
            .find(|id| !self.dynamic_attributes.contains_key(id))
            .ok_or(SceneError::DynamicAttributesFull(self.id))
    }

    /// Sets a value on a component that is not yet part of a scene.
    ///
    /// Type-checked like a scene write, but leaves the change flag alone.
    pub fn set_value(&mut self, key: AttributeKey, value: AttributeValue) -> SceneResult<()> {
        let change_flag = self.attribute(key).map_or(0, |attr| attr.change_flag);
        self.write(key, value, change_flag)
    }

    /// Inserts or replaces a dynamic attribute.
    ///
    /// Fails if `id` is new and the table already holds
    /// [`MAX_DYNAMIC_ATTRIBUTES`] entries.
    pub fn insert_dynamic(&mut self, id: u8, attribute: Attribute) -> SceneResult<()> {
        if self.dynamic_attributes.len() >= MAX_DYNAMIC_ATTRIBUTES && !self.dynamic_attributes.contains_key(&id) {
            return Err(SceneError::DynamicAttributesFull(self.id));
        }
        self.dynamic_attributes.insert(id, attribute);
        Ok(())
    }

    pub(crate) fn remove_dynamic(&mut self, id: u8) -> Option<Attribute> {
        self.dynamic_attributes.remove(&id)
    }
}

/// Static attribute layout of a component type.
#[derive(Clone, Debug, PartialEq)]
pub struct ComponentSchema {
    /// Human readable type name.
    pub name: String,
    /// Static attributes with their default values, in fixed order.
    pub attributes: Vec<Attribute>,
}

impl ComponentSchema {
    /// Creates a schema from `(name, default)` pairs.
    #[must_use]
    pub fn new(name: impl Into<String>, attributes: Vec<(&str, AttributeValue)>) -> Self {
        Self {
            name: name.into(),
            attributes: attributes
                .into_iter()
                .map(|(name, value)| Attribute::new(name, value))
                .collect(),
        }
    }

    /// Type of the static attribute at `index`.
    #[must_use]
    pub fn attribute_type(&self, index: usize) -> Option<AttributeType> {
        self.attributes.get(index).map(Attribute::attribute_type)
    }
}

/// Registry of component types known to the scene.
#[derive(Clone, Debug, Default)]
pub struct ComponentRegistry {
    schemas: HashMap<ComponentTypeId, ComponentSchema>,
}

impl ComponentRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a component type.
    ///
    /// Static attributes beyond [`MAX_STATIC_ATTRIBUTES`] cannot be addressed
    /// and are dropped.
    pub fn register(&mut self, type_id: ComponentTypeId, mut schema: ComponentSchema) {
        if schema.attributes.len() > MAX_STATIC_ATTRIBUTES {
            warn!(
                type_id = type_id.0,
                name = %schema.name,
                count = schema.attributes.len(),
                "component type declares too many static attributes, truncating"
            );
            schema.attributes.truncate(MAX_STATIC_ATTRIBUTES);
        }
        self.schemas.insert(type_id, schema);
    }

    /// Returns the schema of a type.
    #[must_use]
    pub fn schema(&self, type_id: ComponentTypeId) -> Option<&ComponentSchema> {
        self.schemas.get(&type_id)
    }

    /// Creates a component with every static attribute at its default.
    pub fn instantiate(&self, type_id: ComponentTypeId, id: ComponentId) -> SceneResult<Component> {
        let schema = self
            .schemas
            .get(&type_id)
            .ok_or(SceneError::UnknownComponentType(type_id))?;
        Ok(Component::new(id, type_id, schema.attributes.clone()))
    }
}
