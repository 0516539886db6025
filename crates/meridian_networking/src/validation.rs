//! # Action Validation
//!
//! Decides whether an inbound message may mutate the scene.
//!
//! ## Default Policy
//!
//! ```text
//! EntityAction            -> allowed if the entity exists
//! structural / attribute  -> denied unless the authorization hook grants it
//! from the server link    -> always allowed (client role)
//! ```
//!
//! Denials are silent towards the peer; the manager only logs them.

use meridian_core::{ComponentId, ConnectionId, EntityId, Scene};

use crate::protocol::MessageId;

/// Pluggable authorization for structural edits.
pub trait AuthorizationHook: Send {
    /// Returns true if `connection` may apply `message` to the target.
    fn authorize(
        &self,
        connection: ConnectionId,
        message: MessageId,
        entity: EntityId,
        component: Option<ComponentId>,
    ) -> bool;
}

impl<F> AuthorizationHook for F
where
    F: Fn(ConnectionId, MessageId, EntityId, Option<ComponentId>) -> bool + Send,
{
    fn authorize(
        &self,
        connection: ConnectionId,
        message: MessageId,
        entity: EntityId,
        component: Option<ComponentId>,
    ) -> bool {
        self(connection, message, entity, component)
    }
}

/// Guard for inbound messages.
#[derive(Default)]
pub struct ActionValidator {
    hook: Option<Box<dyn AuthorizationHook>>,
}

impl std::fmt::Debug for ActionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionValidator")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl ActionValidator {
    /// Creates a validator with the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs (or removes) the authorization hook.
    pub fn set_hook(&mut self, hook: Option<Box<dyn AuthorizationHook>>) {
        self.hook = hook;
    }

    /// Returns true if a hook is installed.
    #[must_use]
    pub fn has_hook(&self) -> bool {
        self.hook.is_some()
    }

    /// Decides whether a client message may be applied.
    #[must_use]
    pub fn validate(
        &self,
        scene: &Scene,
        connection: ConnectionId,
        message: MessageId,
        entity: EntityId,
        component: Option<ComponentId>,
    ) -> bool {
        match message {
            MessageId::EntityAction => scene.contains_entity(entity),
            _ => self
                .hook
                .as_ref()
                .is_some_and(|hook| hook.authorize(connection, message, entity, component)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::ChangeOrigin;

    #[test]
    fn test_actions_need_existing_entity() {
        let mut scene = Scene::new();
        let entity = scene.create_entity(ChangeOrigin::Local);
        let validator = ActionValidator::new();

        assert!(validator.validate(&scene, ConnectionId(1), MessageId::EntityAction, entity, None));
        assert!(!validator.validate(&scene, ConnectionId(1), MessageId::EntityAction, EntityId(99), None));
    }

    #[test]
    fn test_structural_edits_denied_without_hook() {
        let mut scene = Scene::new();
        let entity = scene.create_entity(ChangeOrigin::Local);
        let validator = ActionValidator::new();

        for message in [MessageId::CreateEntity, MessageId::EditAttributes, MessageId::RemoveEntity] {
            assert!(!validator.validate(&scene, ConnectionId(1), message, entity, None));
        }
    }

    #[test]
    fn test_hook_grants_per_connection() {
        let scene = Scene::new();
        let mut validator = ActionValidator::new();
        validator.set_hook(Some(Box::new(
            |connection: ConnectionId, message: MessageId, _: EntityId, _: Option<ComponentId>| {
                connection == ConnectionId(7) && message == MessageId::EditAttributes
            },
        )));

        assert!(validator.validate(&scene, ConnectionId(7), MessageId::EditAttributes, EntityId(1), None));
        assert!(!validator.validate(&scene, ConnectionId(8), MessageId::EditAttributes, EntityId(1), None));
        assert!(!validator.validate(&scene, ConnectionId(7), MessageId::RemoveEntity, EntityId(1), None));
    }
}
