//! # MERIDIAN Networking - The Replication Engine
//!
//! Keeps a server-authoritative scene consistent across every connected
//! client.
//!
//! ## Architecture
//!
//! - **Sync state**: one [`SceneSyncState`] per connection records what that
//!   peer is owed (new, dirty, removed) down to single attributes
//! - **Sync manager**: observes the scene, flushes dirty state as messages
//!   every update period and applies inbound messages back onto the scene
//! - **Protocol**: compact binary messages that each name their own entity
//!   and component, split under [`MAX_MESSAGE_SIZE`]
//! - **Validation**: clients invoke actions; structural edits need an
//!   authorization hook
//!
//! ## Delivery Model
//!
//! ```text
//! SERVER                                CLIENT
//!   |  scene change -> dirty mark           |
//!   |  ... update period ...                |
//!   |--- CreateEntity / EditAttributes ---->|  apply (origin: Replicated)
//!   |                                       |
//!   |<-- EntityAction ----------------------|  validate, run, re-broadcast
//! ```
//!
//! A refused send leaves the marks in place; the next period rebuilds the
//! message from the current scene.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use parking_lot::RwLock;
//! use meridian_core::{ConnectionId, Scene};
//! use meridian_networking::{ChannelTransport, SyncManager};
//!
//! let scene = Arc::new(RwLock::new(Scene::new()));
//! let mut transport = ChannelTransport::new();
//! let inbox = transport.open(ConnectionId(1), 256);
//!
//! let mut manager = SyncManager::server(transport);
//! manager.register_scene(&scene);
//! manager.on_user_connected(ConnectionId(1));
//! manager.tick(1.0 / 30.0);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod snapshot;
pub mod sync;
pub mod transport;
pub mod validation;

// Re-exports for convenience
pub use config::SyncConfig;
pub use error::{ConfigError, DecodeError, EncodeError, TransportError};
pub use protocol::{decode_message, encode_message, MessageId, MessageWriter, SyncMessage};
pub use snapshot::AttributeSnapshot;
pub use sync::{
    PeerRole, SceneHandle, SceneSyncState, SyncEvent, SyncManager, SyncRole, SyncStats, SYNC_EVENT_CAPACITY,
    UserConnection,
};
pub use transport::{ChannelTransport, Envelope, Transport};
pub use validation::{ActionValidator, AuthorizationHook};

/// Hard cap on the encoded size of one message, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Default time between flushes, in seconds.
///
/// At 30Hz, each period is ~33.3ms.
pub const DEFAULT_UPDATE_PERIOD: f32 = 1.0 / 30.0;
