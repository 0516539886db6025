//! # Scene Error Types
//!
//! All errors the scene mutation API can report.

use thiserror::Error;

use crate::scene::{AttributeType, ComponentId, ComponentTypeId, EntityId};

/// Errors that can occur while mutating the scene.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The entity does not exist (or no longer exists).
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),

    /// An entity with this id already exists.
    #[error("entity {0} already exists")]
    EntityExists(EntityId),

    /// The component does not exist on the entity.
    #[error("component {component} not found on entity {entity}")]
    ComponentNotFound {
        /// Owning entity.
        entity: EntityId,
        /// Missing component.
        component: ComponentId,
    },

    /// A component with this id already exists on the entity.
    #[error("component {component} already exists on entity {entity}")]
    ComponentExists {
        /// Owning entity.
        entity: EntityId,
        /// Duplicate component.
        component: ComponentId,
    },

    /// The component type was never registered.
    #[error("unknown component type {0}")]
    UnknownComponentType(ComponentTypeId),

    /// No static attribute at this index, or no dynamic attribute with this id.
    #[error("attribute {0} not found")]
    AttributeNotFound(String),

    /// The written value does not match the attribute's type.
    #[error("attribute type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Type of the attribute slot.
        expected: AttributeType,
        /// Type of the written value.
        actual: AttributeType,
    },

    /// Every dynamic attribute id of the component is taken.
    #[error("component {0} has no free dynamic attribute id")]
    DynamicAttributesFull(ComponentId),
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
