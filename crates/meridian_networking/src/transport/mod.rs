//! # Transport Layer
//!
//! The sync manager only needs one operation from the network: hand a framed
//! payload to a connection. Framing, fragmentation and the actual channels
//! live behind the [`Transport`] trait.
//!
//! ## Contract
//!
//! - `Ok(())` means the transport accepted the message and, for reliable
//!   messages, will deliver it.
//! - [`TransportError::Saturated`] means nothing was queued; the manager
//!   keeps the state dirty and retries next period.
//! - Inbound messages are passed to `SyncManager::handle_message` by the
//!   host, on the thread that owns the scene.

use std::collections::HashMap;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::debug;

use meridian_core::ConnectionId;

use crate::error::TransportError;
use crate::protocol::MessageId;

/// Outbound side of the network.
pub trait Transport {
    /// Queues one message for a connection.
    fn send(
        &mut self,
        connection: ConnectionId,
        message: MessageId,
        reliable: bool,
        in_order: bool,
        payload: &[u8],
    ) -> Result<(), TransportError>;
}

/// A framed message as queued by [`ChannelTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Wire message id.
    pub message: u8,
    /// Delivery must be guaranteed.
    pub reliable: bool,
    /// Delivery must preserve order.
    pub in_order: bool,
    /// Encoded body.
    pub payload: Vec<u8>,
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Messages accepted.
    pub messages_sent: u64,
    /// Payload bytes accepted.
    pub bytes_sent: u64,
    /// Sends refused because a channel was full.
    pub saturated: u64,
    /// Sends to unknown or closed connections.
    pub closed: u64,
}

/// In-process transport backed by one bounded channel per connection.
///
/// The receiving end of each channel is handed out by [`ChannelTransport::open`];
/// whoever holds it plays the remote peer.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    links: HashMap<ConnectionId, Sender<Envelope>>,
    stats: TransportStats,
}

impl ChannelTransport {
    /// Creates a transport with no connections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a link holding at most `capacity` undelivered messages.
    ///
    /// Reopening an id replaces the previous link.
    pub fn open(&mut self, connection: ConnectionId, capacity: usize) -> Receiver<Envelope> {
        let (tx, rx) = bounded(capacity);
        self.links.insert(connection, tx);
        rx
    }

    /// Closes a link; later sends fail with [`TransportError::Closed`].
    pub fn close(&mut self, connection: ConnectionId) {
        self.links.remove(&connection);
    }

    /// Returns true if the link exists.
    #[must_use]
    pub fn is_open(&self, connection: ConnectionId) -> bool {
        self.links.contains_key(&connection)
    }

    /// Returns statistics.
    #[must_use]
    pub const fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TransportStats::default();
    }
}

impl Transport for ChannelTransport {
    fn send(
        &mut self,
        connection: ConnectionId,
        message: MessageId,
        reliable: bool,
        in_order: bool,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let Some(link) = self.links.get(&connection) else {
            self.stats.closed += 1;
            return Err(TransportError::Closed(connection));
        };
        let envelope = Envelope {
            message: message as u8,
            reliable,
            in_order,
            payload: payload.to_vec(),
        };
        match link.try_send(envelope) {
            Ok(()) => {
                self.stats.messages_sent += 1;
                self.stats.bytes_sent += payload.len() as u64;
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.stats.saturated += 1;
                Err(TransportError::Saturated(connection))
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!(%connection, "peer dropped its receiver, closing link");
                self.links.remove(&connection);
                self.stats.closed += 1;
                Err(TransportError::Closed(connection))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_receive() {
        let mut transport = ChannelTransport::new();
        let rx = transport.open(ConnectionId(1), 4);
        transport
            .send(ConnectionId(1), MessageId::RemoveEntity, true, true, &[7])
            .unwrap();

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.message, MessageId::RemoveEntity as u8);
        assert!(envelope.reliable && envelope.in_order);
        assert_eq!(envelope.payload, vec![7]);
        assert_eq!(transport.stats().bytes_sent, 1);
    }

    #[test]
    fn test_full_channel_saturates() {
        let mut transport = ChannelTransport::new();
        let _rx = transport.open(ConnectionId(1), 1);
        transport
            .send(ConnectionId(1), MessageId::RemoveEntity, true, true, &[1])
            .unwrap();
        assert_eq!(
            transport.send(ConnectionId(1), MessageId::RemoveEntity, true, true, &[2]),
            Err(TransportError::Saturated(ConnectionId(1)))
        );
        assert_eq!(transport.stats().saturated, 1);
    }

    #[test]
    fn test_unknown_and_dropped_links_are_closed() {
        let mut transport = ChannelTransport::new();
        assert_eq!(
            transport.send(ConnectionId(9), MessageId::RemoveEntity, true, true, &[]),
            Err(TransportError::Closed(ConnectionId(9)))
        );

        let rx = transport.open(ConnectionId(2), 1);
        drop(rx);
        assert_eq!(
            transport.send(ConnectionId(2), MessageId::RemoveEntity, true, true, &[]),
            Err(TransportError::Closed(ConnectionId(2)))
        );
        assert!(!transport.is_open(ConnectionId(2)));
    }
}
