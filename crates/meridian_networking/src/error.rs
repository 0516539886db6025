//! # Networking Error Types
//!
//! None of these are fatal: the sync manager logs them and moves on.

use thiserror::Error;

use meridian_core::ConnectionId;

/// Errors raised while encoding an outbound message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The message would exceed the writer's hard size cap.
    #[error("message exceeds size cap: {required} bytes needed, limit {limit}")]
    Overflow {
        /// Bytes the message would need.
        required: usize,
        /// Hard cap.
        limit: usize,
    },

    /// A collection has more elements than its length prefix can express.
    #[error("too many {what}: {count} (max {max})")]
    TooMany {
        /// What was being counted.
        what: &'static str,
        /// Element count.
        count: usize,
        /// Maximum.
        max: usize,
    },
}

/// Errors raised while decoding an inbound message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload ended before the message did.
    #[error("truncated payload: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Read position.
        offset: usize,
        /// Bytes required.
        needed: usize,
    },

    /// A value carried an unknown type tag.
    #[error("unknown attribute type tag {0}")]
    UnknownTypeTag(u8),

    /// A string was not valid UTF-8.
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    /// A variable-length integer did not terminate within five bytes.
    #[error("malformed varint at offset {0}")]
    MalformedVarint(usize),

    /// The payload had bytes left after the message ended.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// A count field promised more elements than the payload can hold.
    #[error("count {count} exceeds remaining payload {remaining}")]
    CountTooLarge {
        /// Declared count.
        count: usize,
        /// Bytes left.
        remaining: usize,
    },

    /// A static edit mask addressed attributes past the last static index.
    #[error("static edit mask of {0} bytes exceeds 32 bytes")]
    MaskTooLong(usize),

    /// The message id is not a sync message.
    #[error("unknown message id {0}")]
    UnknownMessage(u8),
}

/// Errors reported by a transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The outbound buffer is full; try again next period.
    #[error("outbound buffer saturated for {0}")]
    Saturated(ConnectionId),

    /// The connection is unknown or already closed.
    #[error("connection {0} closed")]
    Closed(ConnectionId),
}

/// Errors raised while loading configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The TOML text could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(String),

    /// A value is out of range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for encoding.
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Result type for decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;
