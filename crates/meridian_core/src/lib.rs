//! # MERIDIAN Core
//!
//! The server-authoritative scene graph that the replication engine observes.
//!
//! ## Model
//!
//! - **Entity**: process-wide id, ordered collection of components
//! - **Component**: type id + instance id unique within its entity, holding
//!   a fixed set of *static* attributes and a variable set of *dynamic* ones
//! - **Attribute**: typed value slot, stamped with a monotonically increasing
//!   change flag on every write
//!
//! Every mutation takes a [`ChangeOrigin`]. Mutations with a visible origin
//! are reported, in order and on the calling thread, to every channel
//! returned by [`Scene::subscribe`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use meridian_core::{Scene, ChangeOrigin, AttributeKey, AttributeValue};
//!
//! let mut scene = Scene::new();
//! let events = scene.subscribe();
//! let entity = scene.create_entity(ChangeOrigin::Local);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod scene;

pub use error::{SceneError, SceneResult};
pub use scene::{
    Attribute, AttributeKey, AttributeType, AttributeValue, ChangeOrigin, Component,
    ComponentId, ComponentRegistry, ComponentSchema, ComponentTypeId, ConnectionId, Entity,
    EntityId, ExecType, Quat, Scene, SceneEvent, Vec3,
};

/// Maximum number of dynamic attributes a single component may hold.
///
/// Dynamic attribute ids travel as one byte on the wire.
pub const MAX_DYNAMIC_ATTRIBUTES: usize = 255;

/// Maximum number of static attributes a component type may declare.
pub const MAX_STATIC_ATTRIBUTES: usize = 255;
