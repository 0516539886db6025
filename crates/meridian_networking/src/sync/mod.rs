//! # Sync Manager
//!
//! Translates scene mutations into per-connection dirty marks, flushes them
//! as wire messages every update period, and applies inbound messages back
//! onto the scene.
//!
//! ## Data Flow
//!
//! ```text
//! ┌───────────┐  SceneEvent   ┌──────────────┐  dirty marks  ┌────────────────┐
//! │   Scene   │──────────────►│  observer    │──────────────►│ SceneSyncState │ (one per connection)
//! └───────────┘   (channel)   └──────────────┘               └───────┬────────┘
//!       ▲                                                             │ tick
//!       │ Replicated(conn)    ┌──────────────┐   plan + encode        ▼
//!       └─────────────────────│ apply        │◄─ handle_message  ┌───────────┐
//!                             └──────────────┘                   │ Transport │
//!                                                                └───────────┘
//! ```
//!
//! ## No-Echo Rule
//!
//! A change that arrived from connection C is recorded as already known in
//! C's own state (a *processed* mark) and as dirty in every other state.
//!
//! Scene notifications are queued on a channel and drained before every
//! flush and around every inbound apply, so marks are always taken in
//! mutation order against the scene they describe.

mod apply;
mod connection;
mod flush;
mod state;
mod stats;
mod tick;

pub use connection::{ConnectionStats, PeerRole, UserConnection};
pub use state::{ComponentSyncState, EntitySyncState, SceneSyncState};
pub use stats::SyncStats;
pub use tick::UpdateTimer;

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use tracing::{debug, info, trace, warn};

use meridian_core::{
    AttributeKey, ChangeOrigin, Component, ComponentId, ConnectionId, EntityId, ExecType, Scene,
    SceneEvent,
};

use crate::config::SyncConfig;
use crate::error::{DecodeError, TransportError};
use crate::protocol::{decode_message, encode_message, EntityAction, MessageId, MessageWriter, SyncMessage};
use crate::transport::Transport;
use crate::validation::{ActionValidator, AuthorizationHook};

use apply::{apply_message, ApplyOutcome};
use flush::plan_entity;

/// Undrained [`SyncEvent`]s kept before the oldest is dropped.
pub const SYNC_EVENT_CAPACITY: usize = 1024;

/// Shared handle to the scene a manager serves.
pub type SceneHandle = Arc<RwLock<Scene>>;

/// Which side of the replication link this manager runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncRole {
    /// Authoritative: seeds and serves clients.
    Server,
    /// Mirror: applies the server's messages and forwards local changes.
    Client,
}

/// Notifications for code outside the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncEvent {
    /// A fresh, fully seeded state was created for a connection.
    ///
    /// Interest policies may restrict it through
    /// [`SyncManager::scene_state_mut`] before the next flush.
    SceneStateCreated(ConnectionId),
}

/// The replication engine.
pub struct SyncManager<T: Transport> {
    role: SyncRole,
    config: SyncConfig,
    timer: UpdateTimer,
    scene: Option<Weak<RwLock<Scene>>>,
    scene_events: Option<Receiver<SceneEvent>>,
    connections: BTreeMap<ConnectionId, UserConnection>,
    validator: ActionValidator,
    transport: T,
    writer: MessageWriter,
    events_tx: Sender<SyncEvent>,
    events_rx: Receiver<SyncEvent>,
    stats: SyncStats,
}

impl<T: Transport> std::fmt::Debug for SyncManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("role", &self.role)
            .field("config", &self.config)
            .field("connections", &self.connections.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SyncManager<T> {
    /// Creates a manager.
    ///
    /// An out-of-range configuration is replaced by the default one.
    #[must_use]
    pub fn new(role: SyncRole, config: SyncConfig, transport: T) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(error) => {
                warn!(%error, "invalid sync configuration, using defaults");
                SyncConfig::default()
            }
        };
        let (events_tx, events_rx) = bounded(SYNC_EVENT_CAPACITY);
        Self {
            role,
            timer: UpdateTimer::new(config.update_period),
            writer: MessageWriter::new(config.max_message_size),
            config,
            scene: None,
            scene_events: None,
            connections: BTreeMap::new(),
            validator: ActionValidator::new(),
            transport,
            events_tx,
            events_rx,
            stats: SyncStats::default(),
        }
    }

    /// Creates a server-role manager with the default configuration.
    #[must_use]
    pub fn server(transport: T) -> Self {
        Self::new(SyncRole::Server, SyncConfig::default(), transport)
    }

    /// Creates a client-role manager with the default configuration.
    #[must_use]
    pub fn client(transport: T) -> Self {
        Self::new(SyncRole::Client, SyncConfig::default(), transport)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Subscribes to a scene.
    ///
    /// A manager serves at most one scene; further calls are ignored while
    /// the first scene is alive.
    pub fn register_scene(&mut self, scene: &SceneHandle) {
        if self.registered_scene().is_some() {
            warn!("a scene is already registered, ignoring");
            return;
        }
        self.scene_events = Some(scene.write().subscribe());
        self.scene = Some(Arc::downgrade(scene));
        info!(role = ?self.role, "scene registered");
    }

    /// The registered scene, if it is still alive.
    #[must_use]
    pub fn registered_scene(&self) -> Option<SceneHandle> {
        self.scene.as_ref().and_then(Weak::upgrade)
    }

    /// Side of the link.
    #[inline]
    #[must_use]
    pub const fn role(&self) -> SyncRole {
        self.role
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Changes the update period, in seconds.
    pub fn set_update_period(&mut self, period_secs: f32) {
        self.timer.set_period(period_secs);
        self.config.update_period = self.timer.period_secs();
    }

    /// Update period, in seconds.
    #[must_use]
    pub fn update_period(&self) -> f32 {
        self.timer.period_secs()
    }

    /// Installs (or removes) the hook that authorizes structural edits from
    /// clients.
    pub fn set_authorization_hook(&mut self, hook: Option<Box<dyn AuthorizationHook>>) {
        self.validator.set_hook(hook);
    }

    /// Receiver for [`SyncEvent`]s. Every clone sees a share of the events.
    ///
    /// At most [`SYNC_EVENT_CAPACITY`] events are held; older ones are
    /// dropped when nobody drains them.
    #[must_use]
    pub fn events(&self) -> Receiver<SyncEvent> {
        self.events_rx.clone()
    }

    /// The transport.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably.
    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Manager counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &SyncStats {
        &self.stats
    }

    // =========================================================================
    // Connections
    // =========================================================================

    /// Accepts a client and seeds its state with every replicated entity.
    ///
    /// Calling it again for a live connection starts over from a fresh state.
    pub fn on_user_connected(&mut self, connection: ConnectionId) {
        self.process_scene_events();
        let mut user = UserConnection::new(connection, PeerRole::Client);
        let mut seeded = 0usize;
        if let Some(handle) = self.registered_scene() {
            let scene = handle.read();
            for entity in scene.entities().filter(|entity| !entity.local) {
                user.sync_state_mut().mark_entity_dirty(entity.id);
                seeded += 1;
            }
        }
        if self.connections.insert(connection, user).is_some() {
            debug!(%connection, "replacing existing sync state");
        }
        info!(%connection, entities = seeded, "user connected");
        self.publish(SyncEvent::SceneStateCreated(connection));
    }

    /// Queues a notification, evicting the oldest one when nobody drains
    /// the channel.
    fn publish(&self, mut event: SyncEvent) {
        loop {
            match self.events_tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(evicted) = self.events_rx.try_recv() {
                        debug!(?evicted, "sync event queue full, dropping oldest");
                    }
                    event = rejected;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    /// Registers the link to the authoritative server. Nothing is seeded.
    pub fn on_server_connected(&mut self, connection: ConnectionId) {
        self.process_scene_events();
        self.connections
            .insert(connection, UserConnection::new(connection, PeerRole::Server));
        info!(%connection, "server link registered");
    }

    /// Drops a connection together with everything still owed to it.
    pub fn on_user_disconnected(&mut self, connection: ConnectionId) {
        if self.connections.remove(&connection).is_some() {
            info!(%connection, "user disconnected");
        }
    }

    /// A connection record.
    #[must_use]
    pub fn connection(&self, connection: ConnectionId) -> Option<&UserConnection> {
        self.connections.get(&connection)
    }

    /// Ids of every registered connection.
    pub fn connection_ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Replication state of a connection.
    #[must_use]
    pub fn scene_state(&self, connection: ConnectionId) -> Option<&SceneSyncState> {
        self.connections.get(&connection).map(UserConnection::sync_state)
    }

    /// Replication state of a connection, mutably.
    ///
    /// Pending scene notifications are folded in first.
    pub fn scene_state_mut(&mut self, connection: ConnectionId) -> Option<&mut SceneSyncState> {
        self.process_scene_events();
        self.connections
            .get_mut(&connection)
            .map(UserConnection::sync_state_mut)
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    /// Advances the update timer and flushes when a period has elapsed.
    ///
    /// Returns true if a flush ran.
    pub fn tick(&mut self, delta_secs: f32) -> bool {
        if !self.timer.advance(delta_secs) {
            return false;
        }
        self.flush();
        true
    }

    /// Sends everything owed to every connection right now.
    ///
    /// A connection whose transport is saturated keeps its remaining marks
    /// for the next flush.
    pub fn flush(&mut self) {
        self.process_scene_events();
        let handle = self.registered_scene();
        let scene = handle.as_ref().map(|handle| handle.read());
        let mut out = Outbound {
            transport: &mut self.transport,
            writer: &mut self.writer,
            stats: &mut self.stats,
        };
        for connection in self.connections.values_mut() {
            if let Some(scene) = scene.as_deref() {
                if !flush_entities(&mut out, connection, scene, &self.config) {
                    continue;
                }
            }
            flush_actions(&mut out, connection);
        }
        self.stats.flushes += 1;
    }

    /// Queues an action for a single connection.
    ///
    /// Returns false if the connection is unknown.
    pub fn send_action_to(
        &mut self,
        connection: ConnectionId,
        entity: EntityId,
        action: &str,
        params: Vec<String>,
    ) -> bool {
        let Some(target) = self.connections.get_mut(&connection) else {
            return false;
        };
        target.sync_state_mut().queue_action(EntityAction {
            entity,
            action: action.to_owned(),
            params,
            exec: ExecType::LOCAL,
        });
        true
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    /// Decodes and applies one inbound message.
    ///
    /// Malformed or unknown messages are logged and dropped.
    pub fn handle_message(&mut self, connection: ConnectionId, message_id: u8, payload: &[u8]) {
        let Some(source) = self.connections.get_mut(&connection) else {
            warn!(%connection, message_id, "message from unknown connection");
            return;
        };
        let message = match decode_message(message_id, payload) {
            Ok(message) => message,
            Err(DecodeError::UnknownMessage(id)) => {
                debug!(%connection, message_id = id, "ignoring unknown message");
                self.stats.dropped_unknown += 1;
                return;
            }
            Err(error) => {
                warn!(%connection, message_id, %error, "dropping malformed message");
                self.stats.dropped_malformed += 1;
                return;
            }
        };
        source.record_receive();
        let trusted = source.is_server_link();
        self.stats.messages_received += 1;
        trace!(%connection, kind = ?message.id(), entity = %message.entity(), "received");

        match message {
            SyncMessage::EntityAction(action) => self.on_client_action(connection, action),
            message => self.apply_structural(connection, trusted, message),
        }
    }

    /// Validates and runs an action invoked by a peer.
    ///
    /// On the server, an action with [`ExecType::SERVER`] runs on the scene
    /// and one with [`ExecType::PEERS`] is queued to every other client with
    /// its execution type rewritten to local. Actions from the server link
    /// always run.
    pub fn on_client_action(&mut self, connection: ConnectionId, action: EntityAction) {
        let Some(trusted) = self.connections.get(&connection).map(UserConnection::is_server_link) else {
            warn!(%connection, "action from unknown connection");
            return;
        };
        let Some(handle) = self.registered_scene() else {
            debug!(%connection, "no scene registered, dropping action");
            return;
        };
        self.process_scene_events();

        if !trusted
            && !self
                .validator
                .validate(&handle.read(), connection, MessageId::EntityAction, action.entity, None)
        {
            warn!(%connection, entity = %action.entity, action = %action.action, "action denied");
            self.stats.dropped_denied += 1;
            return;
        }

        if trusted || action.exec.contains(ExecType::SERVER) {
            let result = handle.write().trigger_action(
                action.entity,
                &action.action,
                action.params.clone(),
                ExecType::LOCAL,
                ChangeOrigin::Replicated(connection),
            );
            if let Err(error) = result {
                debug!(%connection, %error, "stale action");
                self.stats.dropped_stale += 1;
            }
        }

        if !trusted && action.exec.contains(ExecType::PEERS) {
            let forwarded = EntityAction {
                exec: ExecType::LOCAL,
                ..action
            };
            for (id, peer) in &mut self.connections {
                if *id != connection && !peer.is_server_link() {
                    peer.sync_state_mut().queue_action(forwarded.clone());
                }
            }
        }

        self.process_scene_events();
    }

    fn apply_structural(&mut self, connection: ConnectionId, trusted: bool, message: SyncMessage) {
        let Some(handle) = self.registered_scene() else {
            debug!(%connection, "no scene registered, dropping message");
            return;
        };
        let kind = message.id();
        let entity = message.entity();

        if !trusted {
            let component = target_component(&message);
            if !self.validator.validate(&handle.read(), connection, kind, entity, component) {
                warn!(%connection, ?kind, %entity, "structural edit denied");
                self.stats.dropped_denied += 1;
                return;
            }
            if kind == MessageId::CreateEntity && handle.read().contains_entity(entity) {
                warn!(%connection, %entity, "client entity id already in use, dropping creation");
                self.stats.dropped_denied += 1;
                return;
            }
        }

        self.process_scene_events();
        let outcome = apply_message(&mut handle.write(), message, ChangeOrigin::Replicated(connection));
        if outcome == ApplyOutcome::Stale {
            debug!(%connection, ?kind, %entity, "message referenced removed objects");
            self.stats.dropped_stale += 1;
        }
        self.process_scene_events();
    }

    // =========================================================================
    // Scene observer
    // =========================================================================

    /// Folds queued scene notifications into every connection's state.
    fn process_scene_events(&mut self) {
        let Some(events) = self.scene_events.as_ref() else {
            return;
        };
        let pending: Vec<SceneEvent> = events.try_iter().collect();
        if pending.is_empty() {
            return;
        }
        let Some(handle) = self.registered_scene() else {
            return;
        };
        let scene = handle.read();
        for event in pending {
            self.observe(&scene, event);
        }
    }

    fn observe(&mut self, scene: &Scene, event: SceneEvent) {
        let source = event.origin().source();
        match event {
            SceneEvent::EntityCreated { entity, .. } => {
                if !scene.entity(entity).is_some_and(|e| !e.local) {
                    return;
                }
                self.mark(
                    source,
                    |state| state.mark_entity_dirty(entity),
                    |state| state.mark_entity_processed(entity),
                );
            }
            SceneEvent::EntityRemoved { entity, .. } => self.mark(
                source,
                |state| state.mark_entity_removed(entity),
                |state| state.mark_entity_removal_processed(entity),
            ),
            SceneEvent::ComponentAdded { entity, component, .. } => {
                let Some(added) = replicated_component(scene, entity, component) else {
                    return;
                };
                self.mark(
                    source,
                    |state| state.mark_component_dirty(entity, component),
                    |state| state.mark_component_processed(entity, added),
                );
            }
            SceneEvent::ComponentRemoved { entity, component, .. } => {
                if scene.entity(entity).is_some_and(|e| e.local) {
                    return;
                }
                self.mark(
                    source,
                    |state| state.mark_component_removed(entity, component),
                    |state| state.mark_component_removal_processed(entity, component),
                );
            }
            SceneEvent::AttributeAdded {
                entity,
                component,
                attribute,
                ..
            } => {
                let key = AttributeKey::Dynamic(attribute);
                let Some(added) = replicated_component(scene, entity, component).and_then(|c| c.attribute(key)) else {
                    return;
                };
                self.mark(
                    source,
                    |state| state.mark_attribute_created(entity, component, attribute),
                    |state| state.mark_attribute_processed(entity, component, key, &added.value),
                );
            }
            SceneEvent::AttributeRemoved {
                entity,
                component,
                attribute,
                ..
            } => {
                if replicated_component(scene, entity, component).is_none() {
                    return;
                }
                self.mark(
                    source,
                    |state| state.mark_attribute_removed(entity, component, attribute),
                    |state| state.mark_attribute_removal_processed(entity, component, attribute),
                );
            }
            SceneEvent::AttributeChanged {
                entity,
                component,
                attribute,
                ..
            } => {
                let Some(changed) =
                    replicated_component(scene, entity, component).and_then(|c| c.attribute(attribute))
                else {
                    return;
                };
                self.mark(
                    source,
                    |state| state.mark_attribute_dirty(entity, component, attribute),
                    |state| state.mark_attribute_processed(entity, component, attribute, &changed.value),
                );
            }
            SceneEvent::ActionTriggered {
                entity,
                action,
                params,
                exec,
                origin,
            } => {
                if origin != ChangeOrigin::Local || !scene.entity(entity).is_some_and(|e| !e.local) {
                    return;
                }
                self.route_local_action(EntityAction {
                    entity,
                    action,
                    params,
                    exec,
                });
            }
        }
    }

    /// Applies `processed` to the source connection's state and `dirty` to
    /// every other state.
    fn mark(
        &mut self,
        source: Option<ConnectionId>,
        dirty: impl Fn(&mut SceneSyncState),
        processed: impl Fn(&mut SceneSyncState),
    ) {
        for (id, connection) in &mut self.connections {
            if Some(*id) == source {
                processed(connection.sync_state_mut());
            } else {
                dirty(connection.sync_state_mut());
            }
        }
    }

    /// Queues an action triggered on this side to the peers that should run it.
    fn route_local_action(&mut self, action: EntityAction) {
        match self.role {
            SyncRole::Server => {
                if !action.exec.contains(ExecType::PEERS) {
                    return;
                }
                let forwarded = EntityAction {
                    exec: ExecType::LOCAL,
                    ..action
                };
                for connection in self.connections.values_mut().filter(|c| !c.is_server_link()) {
                    connection.sync_state_mut().queue_action(forwarded.clone());
                }
            }
            SyncRole::Client => {
                let remote = ExecType(action.exec.0 & !ExecType::LOCAL.0);
                if remote.0 == 0 {
                    return;
                }
                let forwarded = EntityAction { exec: remote, ..action };
                for connection in self.connections.values_mut().filter(|c| c.is_server_link()) {
                    connection.sync_state_mut().queue_action(forwarded.clone());
                }
            }
        }
    }
}

fn replicated_component(scene: &Scene, entity: EntityId, component: ComponentId) -> Option<&Component> {
    scene
        .entity(entity)
        .filter(|e| !e.local)?
        .component(component)
        .filter(|c| c.replicated)
}

fn target_component(message: &SyncMessage) -> Option<ComponentId> {
    match message {
        SyncMessage::CreateAttributes(m) => Some(m.component),
        SyncMessage::EditAttributes(m) => Some(m.component),
        SyncMessage::RemoveAttributes(m) => Some(m.component),
        _ => None,
    }
}

// =============================================================================
// Flush
// =============================================================================

/// Borrowed outbound path: encoder, transport and counters.
struct Outbound<'a, T> {
    transport: &'a mut T,
    writer: &'a mut MessageWriter,
    stats: &'a mut SyncStats,
}

impl<T: Transport> Outbound<'_, T> {
    /// Encodes and hands one message to the transport.
    ///
    /// Returns `Ok(false)` if the message could not be encoded and was
    /// dropped.
    fn send(&mut self, connection: &mut UserConnection, message: &SyncMessage) -> Result<bool, TransportError> {
        let kind = message.id();
        let len = match encode_message(self.writer, message) {
            Ok(len) => len,
            Err(error) => {
                warn!(connection = %connection.id, ?kind, entity = %message.entity(), %error, "dropping unencodable message");
                self.stats.encode_failures += 1;
                return Ok(false);
            }
        };
        match self
            .transport
            .send(connection.id, kind, kind.is_reliable(), kind.is_ordered(), self.writer.as_slice())
        {
            Ok(()) => {
                connection.record_send(len);
                self.stats.record_send(kind, len);
                trace!(connection = %connection.id, ?kind, bytes = len, "sent");
                Ok(true)
            }
            Err(error) => {
                match error {
                    TransportError::Saturated(_) => {
                        connection.record_saturated();
                        self.stats.saturated += 1;
                        debug!(connection = %connection.id, "transport saturated, retrying next period");
                    }
                    TransportError::Closed(_) => {
                        warn!(connection = %connection.id, "transport closed");
                    }
                }
                Err(error)
            }
        }
    }
}

/// Sends every dirty entity of one connection.
///
/// Every accepted message is committed at once. Returns false if the
/// transport refused a message; the entity being sent and every later one
/// keep their marks.
fn flush_entities<T: Transport>(
    out: &mut Outbound<'_, T>,
    connection: &mut UserConnection,
    scene: &Scene,
    config: &SyncConfig,
) -> bool {
    let dirty: Vec<EntityId> = connection.sync_state().dirty_entities().collect();
    for id in dirty {
        let mut messages = plan_entity(connection.sync_state(), scene, id, config).into_iter();
        while let Some(message) = messages.next() {
            match out.send(connection, &message) {
                Ok(true) => connection.sync_state_mut().record_sent(&message),
                Ok(false) => {}
                Err(_) => {
                    // Components of an unsent creation are owed again.
                    let state = connection.sync_state_mut();
                    for unsent in std::iter::once(message).chain(messages) {
                        if let SyncMessage::CreateComponents(create) = unsent {
                            for data in &create.components {
                                state.mark_component_dirty(id, data.id);
                            }
                        }
                    }
                    return false;
                }
            }
        }
        connection.sync_state_mut().clear_entity(id);
    }
    true
}

/// Sends queued actions in order until the queue is empty or the transport
/// refuses one.
fn flush_actions<T: Transport>(out: &mut Outbound<'_, T>, connection: &mut UserConnection) {
    while let Some(action) = connection.sync_state().front_action().cloned() {
        match out.send(connection, &SyncMessage::EntityAction(action)) {
            Ok(_) => connection.sync_state_mut().pop_action(),
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelTransport, Envelope};
    use meridian_core::{AttributeValue, ComponentSchema, ComponentTypeId};

    const PLACEABLE: ComponentTypeId = ComponentTypeId(20);
    const CLIENT: ConnectionId = ConnectionId(1);

    fn scene() -> SceneHandle {
        let mut scene = Scene::new();
        scene.registry_mut().register(
            PLACEABLE,
            ComponentSchema::new("Placeable", vec![("x", AttributeValue::Int(0)), ("name", AttributeValue::String(String::new()))]),
        );
        Arc::new(RwLock::new(scene))
    }

    fn server_with_client(scene: &SceneHandle) -> (SyncManager<ChannelTransport>, Receiver<Envelope>) {
        let mut transport = ChannelTransport::new();
        let rx = transport.open(CLIENT, 64);
        let mut manager = SyncManager::server(transport);
        manager.register_scene(scene);
        manager.on_user_connected(CLIENT);
        (manager, rx)
    }

    fn kinds(rx: &Receiver<Envelope>) -> Vec<MessageId> {
        rx.try_iter().filter_map(|e| MessageId::from_u8(e.message)).collect()
    }

    #[test]
    fn test_register_scene_twice_is_ignored() {
        let first = scene();
        let second = scene();
        let mut manager = SyncManager::server(ChannelTransport::new());
        manager.register_scene(&first);
        manager.register_scene(&second);
        assert!(Arc::ptr_eq(&manager.registered_scene().unwrap(), &first));
    }

    #[test]
    fn test_connect_seeds_existing_entities() {
        let scene = scene();
        let entity = scene.write().create_entity(ChangeOrigin::Local);
        scene.write().create_local_entity(ChangeOrigin::Local);

        let (mut manager, rx) = server_with_client(&scene);
        let events = manager.events();
        assert_eq!(events.try_recv().unwrap(), SyncEvent::SceneStateCreated(CLIENT));
        assert_eq!(manager.scene_state(CLIENT).unwrap().dirty_entities().collect::<Vec<_>>(), vec![entity]);

        manager.flush();
        assert_eq!(kinds(&rx), vec![MessageId::CreateEntity]);
    }

    #[test]
    fn test_full_dynamic_table_still_replicates() {
        let scene = scene();
        let (entity, component) = {
            let mut scene = scene.write();
            let entity = scene.create_entity(ChangeOrigin::Local);
            let component = scene.add_component(entity, PLACEABLE, ChangeOrigin::Local).unwrap();
            for id in 0..=254u8 {
                scene
                    .add_dynamic_attribute_with_id(entity, component, id, "d", AttributeValue::Int(0), ChangeOrigin::Local)
                    .unwrap();
            }
            let overflow = scene.add_dynamic_attribute_with_id(
                entity,
                component,
                255,
                "d",
                AttributeValue::Int(0),
                ChangeOrigin::Local,
            );
            assert!(overflow.is_err());
            (entity, component)
        };

        let (mut manager, rx) = server_with_client(&scene);
        manager.flush();
        let sent: Vec<Envelope> = rx.try_iter().collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(manager.stats().encode_failures, 0);
        let SyncMessage::CreateEntity(create) = decode_message(sent[0].message, &sent[0].payload).unwrap() else {
            panic!("expected a creation");
        };
        assert_eq!(create.entity, entity);
        assert_eq!(create.components[0].id, component);
        assert_eq!(create.components[0].dynamic.len(), 255);
    }

    #[test]
    fn test_undrained_sync_events_stay_bounded() {
        let scene = scene();
        let mut manager = SyncManager::server(ChannelTransport::new());
        manager.register_scene(&scene);
        let events = manager.events();
        let total = u32::try_from(SYNC_EVENT_CAPACITY).unwrap() + 10;
        for id in 0..total {
            manager.on_user_connected(ConnectionId(id));
        }
        assert_eq!(events.len(), SYNC_EVENT_CAPACITY);
        // The oldest notifications make room for the newest.
        assert_eq!(events.try_recv().unwrap(), SyncEvent::SceneStateCreated(ConnectionId(10)));
    }

    #[test]
    fn test_tick_waits_for_update_period() {
        let scene = scene();
        scene.write().create_entity(ChangeOrigin::Local);
        let (mut manager, rx) = server_with_client(&scene);
        manager.set_update_period(0.1);

        assert!(!manager.tick(0.05));
        assert!(rx.is_empty());
        assert!(manager.tick(0.06));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_edit_after_creation_is_incremental() {
        let scene = scene();
        let (mut manager, rx) = server_with_client(&scene);
        let entity = scene.write().create_entity(ChangeOrigin::Local);
        let component = scene.write().add_component(entity, PLACEABLE, ChangeOrigin::Local).unwrap();
        manager.flush();
        assert_eq!(kinds(&rx), vec![MessageId::CreateEntity]);

        scene
            .write()
            .set_attribute(entity, component, AttributeKey::Static(0), AttributeValue::Int(4), ChangeOrigin::Local)
            .unwrap();
        manager.flush();
        assert_eq!(kinds(&rx), vec![MessageId::EditAttributes]);

        manager.flush();
        assert!(rx.is_empty());
    }

    #[test]
    fn test_create_then_remove_sends_nothing() {
        let scene = scene();
        let (mut manager, rx) = server_with_client(&scene);
        let entity = scene.write().create_entity(ChangeOrigin::Local);
        scene.write().add_component(entity, PLACEABLE, ChangeOrigin::Local).unwrap();
        scene.write().remove_entity(entity, ChangeOrigin::Local).unwrap();

        manager.flush();
        assert!(rx.is_empty());
        assert_eq!(manager.stats().total_sent(), 0);
    }

    #[test]
    fn test_saturated_transport_retries() {
        let scene = scene();
        let mut transport = ChannelTransport::new();
        let rx = transport.open(CLIENT, 1);
        let mut manager = SyncManager::server(transport);
        manager.register_scene(&scene);
        manager.on_user_connected(CLIENT);
        scene.write().create_entity(ChangeOrigin::Local);
        scene.write().create_entity(ChangeOrigin::Local);

        manager.flush();
        assert_eq!(rx.len(), 1);
        assert_eq!(manager.stats().saturated, 1);
        assert!(manager.scene_state(CLIENT).unwrap().has_pending());

        rx.try_recv().unwrap();
        manager.flush();
        assert_eq!(rx.len(), 1);
        assert!(!manager.scene_state(CLIENT).unwrap().has_pending());
    }

    #[test]
    fn test_client_edits_are_denied_by_default() {
        let scene = scene();
        let (mut manager, rx) = server_with_client(&scene);
        let entity = scene.write().create_entity(ChangeOrigin::Local);
        manager.flush();
        rx.try_iter().for_each(drop);

        let mut writer = MessageWriter::new(crate::MAX_MESSAGE_SIZE);
        let remove = SyncMessage::RemoveEntity(crate::protocol::RemoveEntity { entity });
        encode_message(&mut writer, &remove).unwrap();
        manager.handle_message(CLIENT, MessageId::RemoveEntity as u8, writer.as_slice());

        assert!(scene.read().contains_entity(entity));
        assert_eq!(manager.stats().dropped_denied, 1);
    }

    #[test]
    fn test_authorized_edit_is_not_echoed() {
        let scene = scene();
        let (mut manager, rx) = server_with_client(&scene);
        manager.set_authorization_hook(Some(Box::new(
            |_: ConnectionId, kind: MessageId, _: EntityId, _: Option<ComponentId>| kind == MessageId::EditAttributes,
        )));
        let entity = scene.write().create_entity(ChangeOrigin::Local);
        let component = scene.write().add_component(entity, PLACEABLE, ChangeOrigin::Local).unwrap();
        manager.flush();
        rx.try_iter().for_each(drop);

        let edit = SyncMessage::EditAttributes(crate::protocol::EditAttributes {
            entity,
            component,
            static_edits: vec![(0, AttributeValue::Int(9))],
            dynamic_edits: Vec::new(),
        });
        let mut writer = MessageWriter::new(crate::MAX_MESSAGE_SIZE);
        encode_message(&mut writer, &edit).unwrap();
        manager.handle_message(CLIENT, MessageId::EditAttributes as u8, writer.as_slice());

        let value = scene.read().component(entity, component).unwrap().attribute(AttributeKey::Static(0)).unwrap().value.clone();
        assert_eq!(value, AttributeValue::Int(9));
        manager.flush();
        assert!(rx.is_empty());
    }

    #[test]
    fn test_malformed_and_unknown_messages_are_dropped() {
        let scene = scene();
        let (mut manager, _rx) = server_with_client(&scene);
        manager.handle_message(CLIENT, MessageId::EditAttributes as u8, &[0x80]);
        manager.handle_message(CLIENT, 42, &[1, 2, 3]);
        manager.handle_message(ConnectionId(99), MessageId::RemoveEntity as u8, &[1]);

        assert_eq!(manager.stats().dropped_malformed, 1);
        assert_eq!(manager.stats().dropped_unknown, 1);
        assert_eq!(manager.stats().messages_received, 0);
    }

    #[test]
    fn test_local_entities_are_never_sent() {
        let scene = scene();
        let (mut manager, rx) = server_with_client(&scene);
        let local = scene.write().create_local_entity(ChangeOrigin::Local);
        scene.write().add_component(local, PLACEABLE, ChangeOrigin::Local).unwrap();
        let entity = scene.write().create_entity(ChangeOrigin::Local);
        scene.write().add_local_component(entity, PLACEABLE, ChangeOrigin::Local).unwrap();

        manager.flush();
        let sent: Vec<_> = rx.try_iter().collect();
        assert_eq!(sent.len(), 1);
        let SyncMessage::CreateEntity(create) = decode_message(sent[0].message, &sent[0].payload).unwrap() else {
            panic!("expected a creation");
        };
        assert_eq!(create.entity, entity);
        assert!(create.components.is_empty());
    }

    #[test]
    fn test_targeted_action() {
        let scene = scene();
        let (mut manager, rx) = server_with_client(&scene);
        let entity = scene.write().create_entity(ChangeOrigin::Local);
        manager.flush();
        rx.try_iter().for_each(drop);

        assert!(manager.send_action_to(CLIENT, entity, "Ping", vec!["1".to_owned()]));
        assert!(!manager.send_action_to(ConnectionId(5), entity, "Ping", Vec::new()));
        manager.flush();
        assert_eq!(kinds(&rx), vec![MessageId::EntityAction]);
    }

    #[test]
    fn test_disconnect_drops_state() {
        let scene = scene();
        let (mut manager, _rx) = server_with_client(&scene);
        manager.on_user_disconnected(CLIENT);
        assert!(manager.scene_state(CLIENT).is_none());
        assert_eq!(manager.connection_count(), 0);
    }
}
