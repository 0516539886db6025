//! # Scene Events
//!
//! Notifications emitted by the scene for every visible mutation.
//!
//! ## Event Flow
//! ```text
//! 1. Caller: Scene::set_attribute(.., ChangeOrigin::Local)
//! 2. Scene:  write value, bump change counter
//! 3. Scene:  SceneEvent::AttributeChanged -> every subscriber channel
//! 4. Sync:   drain channel, mark dirty per connection
//! ```

use std::fmt;

use super::attribute::AttributeKey;
use super::component::ComponentId;
use super::entity::EntityId;

/// Identifies a network connection as the source of a replicated change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u32);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

/// Where a change came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeOrigin {
    /// Made by this process; replicated to every connection.
    Local,
    /// Replayed from the network; never echoed back to its source.
    Replicated(ConnectionId),
    /// Applied silently; no notification is emitted at all.
    Disconnected,
}

impl ChangeOrigin {
    /// Returns the source connection of a replicated change.
    #[inline]
    #[must_use]
    pub const fn source(self) -> Option<ConnectionId> {
        match self {
            Self::Replicated(source) => Some(source),
            Self::Local | Self::Disconnected => None,
        }
    }
}

/// Where an entity action should run.
///
/// Bit set of [`ExecType::LOCAL`], [`ExecType::SERVER`] and [`ExecType::PEERS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct ExecType(pub u8);

impl ExecType {
    /// Execute in the process that triggered it.
    pub const LOCAL: Self = Self(1 << 0);
    /// Execute on the server.
    pub const SERVER: Self = Self(1 << 1);
    /// Execute on every other peer.
    pub const PEERS: Self = Self(1 << 2);

    /// Returns true if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns the union of both sets.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl std::ops::BitOr for ExecType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A scene mutation notification.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneEvent {
    /// An entity was created.
    EntityCreated {
        /// New entity.
        entity: EntityId,
        /// Change origin.
        origin: ChangeOrigin,
    },
    /// An entity and all of its components were removed.
    EntityRemoved {
        /// Removed entity.
        entity: EntityId,
        /// Change origin.
        origin: ChangeOrigin,
    },
    /// A component was added to an entity.
    ComponentAdded {
        /// Owning entity.
        entity: EntityId,
        /// New component.
        component: ComponentId,
        /// Change origin.
        origin: ChangeOrigin,
    },
    /// A component was removed from an entity.
    ComponentRemoved {
        /// Owning entity.
        entity: EntityId,
        /// Removed component.
        component: ComponentId,
        /// Change origin.
        origin: ChangeOrigin,
    },
    /// A dynamic attribute was added (or replaced).
    AttributeAdded {
        /// Owning entity.
        entity: EntityId,
        /// Owning component.
        component: ComponentId,
        /// Dynamic attribute id.
        attribute: u8,
        /// Change origin.
        origin: ChangeOrigin,
    },
    /// A dynamic attribute was removed.
    AttributeRemoved {
        /// Owning entity.
        entity: EntityId,
        /// Owning component.
        component: ComponentId,
        /// Dynamic attribute id.
        attribute: u8,
        /// Change origin.
        origin: ChangeOrigin,
    },
    /// An attribute value was written.
    AttributeChanged {
        /// Owning entity.
        entity: EntityId,
        /// Owning component.
        component: ComponentId,
        /// Written attribute.
        attribute: AttributeKey,
        /// Change origin.
        origin: ChangeOrigin,
    },
    /// An entity action was triggered.
    ActionTriggered {
        /// Target entity.
        entity: EntityId,
        /// Action name.
        action: String,
        /// Action parameters.
        params: Vec<String>,
        /// Where the action should run.
        exec: ExecType,
        /// Change origin.
        origin: ChangeOrigin,
    },
}

impl SceneEvent {
    /// Origin of the change that produced this event.
    #[must_use]
    pub const fn origin(&self) -> ChangeOrigin {
        match self {
            Self::EntityCreated { origin, .. }
            | Self::EntityRemoved { origin, .. }
            | Self::ComponentAdded { origin, .. }
            | Self::ComponentRemoved { origin, .. }
            | Self::AttributeAdded { origin, .. }
            | Self::AttributeRemoved { origin, .. }
            | Self::AttributeChanged { origin, .. }
            | Self::ActionTriggered { origin, .. } => *origin,
        }
    }

    /// Entity the event refers to.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        match self {
            Self::EntityCreated { entity, .. }
            | Self::EntityRemoved { entity, .. }
            | Self::ComponentAdded { entity, .. }
            | Self::ComponentRemoved { entity, .. }
            | Self::AttributeAdded { entity, .. }
            | Self::AttributeRemoved { entity, .. }
            | Self::AttributeChanged { entity, .. }
            | Self::ActionTriggered { entity, .. } => *entity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_type_bits() {
        let exec = ExecType::SERVER | ExecType::PEERS;
        assert!(exec.contains(ExecType::SERVER));
        assert!(exec.contains(ExecType::PEERS));
        assert!(!exec.contains(ExecType::LOCAL));
    }

    #[test]
    fn test_origin_source() {
        assert_eq!(ChangeOrigin::Replicated(ConnectionId(4)).source(), Some(ConnectionId(4)));
        assert_eq!(ChangeOrigin::Local.source(), None);
    }
}
