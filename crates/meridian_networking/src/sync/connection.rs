//! # User Connections
//!
//! One record per connected peer. The record owns its [`SceneSyncState`];
//! the manager looks records up by [`ConnectionId`] and drops them on
//! disconnect.

use meridian_core::ConnectionId;

use super::state::SceneSyncState;

/// Role of the peer on the other end of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerRole {
    /// A client served by this process.
    Client,
    /// The authoritative server this process mirrors.
    Server,
}

/// Per-connection message counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Messages handed to the transport.
    pub messages_sent: u64,
    /// Payload bytes handed to the transport.
    pub bytes_sent: u64,
    /// Inbound messages accepted.
    pub messages_received: u64,
    /// Flushes cut short by a saturated transport.
    pub saturated_flushes: u64,
}

/// A connected peer.
#[derive(Debug)]
pub struct UserConnection {
    /// Connection ID.
    pub id: ConnectionId,
    /// What the peer is.
    pub role: PeerRole,
    sync_state: SceneSyncState,
    stats: ConnectionStats,
}

impl UserConnection {
    /// Creates a connection with an empty sync state.
    #[must_use]
    pub fn new(id: ConnectionId, role: PeerRole) -> Self {
        Self {
            id,
            role,
            sync_state: SceneSyncState::new(),
            stats: ConnectionStats::default(),
        }
    }

    /// Returns true if this is the link to the authoritative server.
    #[inline]
    #[must_use]
    pub fn is_server_link(&self) -> bool {
        self.role == PeerRole::Server
    }

    /// Replication state owed to this peer.
    #[inline]
    #[must_use]
    pub fn sync_state(&self) -> &SceneSyncState {
        &self.sync_state
    }

    /// Mutable replication state.
    #[inline]
    pub fn sync_state_mut(&mut self) -> &mut SceneSyncState {
        &mut self.sync_state
    }

    /// Returns connection statistics.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub(crate) fn record_send(&mut self, bytes: usize) {
        self.stats.messages_sent += 1;
        self.stats.bytes_sent += bytes as u64;
    }

    pub(crate) fn record_receive(&mut self) {
        self.stats.messages_received += 1;
    }

    pub(crate) fn record_saturated(&mut self) {
        self.stats.saturated_flushes += 1;
    }
}
