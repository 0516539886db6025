//! # Sync Protocol
//!
//! Binary message definitions for scene replication.
//!
//! ## Message Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Message id (1 byte, carried by the transport)                │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Entity id (varint) │ Component id (varint, where relevant)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Body (variable, at most MAX_MESSAGE_SIZE bytes in total)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every message is sent reliable and in order.

mod messages;
mod serialization;

pub use messages::{
    ComponentData, CreateAttributes, CreateComponents, CreateEntity, DynamicAttributeData,
    EditAttributes, EntityAction, MessageId, RemoveAttributes, RemoveComponents, RemoveEntity,
    SyncMessage,
};
pub use serialization::{
    append_value, decode_message, encode_message, encoded_component_len, encoded_dynamic_len,
    encoded_value_len, varint_len, MessageReader, MessageWriter,
};
