//! # Scene Graph
//!
//! Entities own components; components own attributes.
//!
//! ## Design Philosophy
//!
//! - Ids are plain integers, never recycled while the scene lives
//! - Ordered maps everywhere so iteration order is deterministic
//! - The scene knows nothing about connections beyond the origin tag

mod attribute;
mod component;
mod entity;
mod events;
mod world;

pub use attribute::{Attribute, AttributeKey, AttributeType, AttributeValue, Quat, Vec3};
pub use component::{Component, ComponentId, ComponentRegistry, ComponentSchema, ComponentTypeId};
pub use entity::{Entity, EntityId};
pub use events::{ChangeOrigin, ConnectionId, ExecType, SceneEvent};
pub use world::Scene;
