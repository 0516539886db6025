//! # Attribute Snapshots
//!
//! Per-connection record of the last value sent for each attribute.
//!
//! ## Diff
//!
//! ```text
//! last sent:  [tag][payload]  (bytes, per connection)
//! current:    [tag][payload]  (encoded on demand)
//!                  │
//!          equal ──┴── different
//!            │              │
//!        drop edit      send, replace snapshot
//! ```
//!
//! Comparison is byte-exact on the wire encoding, so `-0.0` and `0.0` are
//! different values while two equal strings always match.

use meridian_core::AttributeValue;

use crate::protocol::append_value;

/// Encoded bytes of an attribute value as last sent to one connection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeSnapshot {
    bytes: Vec<u8>,
}

impl AttributeSnapshot {
    /// Captures the current encoding of a value.
    #[must_use]
    pub fn capture(value: &AttributeValue) -> Self {
        let mut bytes = Vec::with_capacity(8);
        append_value(&mut bytes, value);
        Self { bytes }
    }

    /// Returns true if `value` encodes to exactly the captured bytes.
    #[must_use]
    pub fn matches(&self, value: &AttributeValue) -> bool {
        let mut scratch = Vec::with_capacity(self.bytes.len());
        append_value(&mut scratch, value);
        scratch == self.bytes
    }

    /// The captured bytes.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Computes the delta between the last sent snapshot and a current value.
///
/// Returns the new snapshot to record when the value must be sent, or
/// `None` when the connection already holds exactly this value.
#[must_use]
pub fn diff(last: Option<&AttributeSnapshot>, current: &AttributeValue) -> Option<AttributeSnapshot> {
    let next = AttributeSnapshot::capture(current);
    match last {
        Some(last) if *last == next => None,
        _ => Some(next),
    }
}
