//! Manager-wide counters.

use crate::protocol::MessageId;

/// Counters kept by the sync manager.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Messages handed to the transport, per kind (see [`MessageId::index`]).
    pub messages_sent: [u64; 8],
    /// Payload bytes handed to the transport, per kind.
    pub bytes_sent: [u64; 8],
    /// Inbound messages decoded.
    pub messages_received: u64,
    /// Inbound messages dropped because they failed to decode.
    pub dropped_malformed: u64,
    /// Inbound messages with an id this engine does not handle.
    pub dropped_unknown: u64,
    /// Inbound messages refused by the validator.
    pub dropped_denied: u64,
    /// Inbound messages that referenced objects no longer in the scene.
    pub dropped_stale: u64,
    /// Outbound messages that could not be encoded.
    pub encode_failures: u64,
    /// Sends refused by a saturated transport.
    pub saturated: u64,
    /// Flushes run.
    pub flushes: u64,
}

impl SyncStats {
    /// Messages of one kind sent so far.
    #[inline]
    #[must_use]
    pub const fn sent(&self, kind: MessageId) -> u64 {
        self.messages_sent[kind.index()]
    }

    /// Messages of every kind sent so far.
    #[must_use]
    pub fn total_sent(&self) -> u64 {
        self.messages_sent.iter().sum()
    }

    /// Payload bytes of every kind sent so far.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.bytes_sent.iter().sum()
    }

    pub(crate) fn record_send(&mut self, kind: MessageId, bytes: usize) {
        self.messages_sent[kind.index()] += 1;
        self.bytes_sent[kind.index()] += bytes as u64;
    }
}
