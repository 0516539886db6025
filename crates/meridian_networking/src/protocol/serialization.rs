//! # Message Serialization
//!
//! Compact binary encoding for sync messages.
//!
//! ## Layout
//!
//! - Multi-byte fixed fields are little-endian.
//! - Entity ids, component ids, type ids and lengths are LEB128 varints.
//! - Attribute counts and dynamic attribute ids are single bytes.
//! - A value is its type tag followed by the payload; vectors are copied
//!   directly as `Pod` structs.
//!
//! The writer enforces a hard size cap; decoders never trust a count field
//! beyond the bytes that remain.

use bytemuck::{bytes_of, Pod};

use meridian_core::{AttributeType, AttributeValue, ComponentId, ComponentTypeId, EntityId, ExecType};

use super::messages::{
    ComponentData, CreateAttributes, CreateComponents, CreateEntity, DynamicAttributeData,
    EditAttributes, EntityAction, MessageId, RemoveAttributes, RemoveComponents, RemoveEntity,
    SyncMessage,
};
use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult};

/// Longest LEB128 encoding of a `u32`.
const MAX_VARINT_LEN: usize = 5;

/// Bitmask bytes needed to address every static attribute index.
const STATIC_MASK_BYTES: usize = 32;

/// Number of bytes `value` takes as a varint.
#[inline]
#[must_use]
pub const fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x001F_FFFF => 3,
        0x0020_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

#[inline]
fn len_prefix(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

/// Number of bytes a value takes on the wire, tag included.
#[must_use]
pub fn encoded_value_len(value: &AttributeValue) -> usize {
    1 + match value {
        AttributeValue::Bool(_) => 1,
        AttributeValue::Int(_) | AttributeValue::UInt(_) | AttributeValue::Real(_) | AttributeValue::Enum(_) => 4,
        AttributeValue::Float3(v) => bytes_of(v).len(),
        AttributeValue::Quat(q) => bytes_of(q).len(),
        AttributeValue::String(s) | AttributeValue::AssetRef(s) => varint_len(len_prefix(s.len())) + s.len(),
        AttributeValue::Binary(b) => varint_len(len_prefix(b.len())) + b.len(),
        AttributeValue::EntityRef(id) => varint_len(id.0),
    }
}

/// Number of bytes one dynamic attribute takes, id and name included.
#[must_use]
pub fn encoded_dynamic_len(attr: &DynamicAttributeData) -> usize {
    1 + varint_len(len_prefix(attr.name.len())) + attr.name.len() + encoded_value_len(&attr.value)
}

/// Number of bytes one component takes inside a create message.
#[must_use]
pub fn encoded_component_len(component: &ComponentData) -> usize {
    varint_len(component.type_id.0)
        + varint_len(component.id.0)
        + 1
        + component.static_values.iter().map(encoded_value_len).sum::<usize>()
        + 1
        + component.dynamic.iter().map(encoded_dynamic_len).sum::<usize>()
}

/// Appends a value without any size cap.
///
/// Used for attribute snapshots, which never go on the wire.
pub fn append_value(buffer: &mut Vec<u8>, value: &AttributeValue) {
    buffer.push(value.attribute_type() as u8);
    match value {
        AttributeValue::Bool(b) => buffer.push(u8::from(*b)),
        AttributeValue::Int(v) => buffer.extend_from_slice(&v.to_le_bytes()),
        AttributeValue::UInt(v) | AttributeValue::Enum(v) => buffer.extend_from_slice(&v.to_le_bytes()),
        AttributeValue::Real(v) => buffer.extend_from_slice(&v.to_le_bytes()),
        AttributeValue::Float3(v) => buffer.extend_from_slice(bytes_of(v)),
        AttributeValue::Quat(q) => buffer.extend_from_slice(bytes_of(q)),
        AttributeValue::String(s) | AttributeValue::AssetRef(s) => {
            append_varint(buffer, len_prefix(s.len()));
            buffer.extend_from_slice(s.as_bytes());
        }
        AttributeValue::Binary(b) => {
            append_varint(buffer, len_prefix(b.len()));
            buffer.extend_from_slice(b);
        }
        AttributeValue::EntityRef(id) => append_varint(buffer, id.0),
    }
}

fn append_varint(buffer: &mut Vec<u8>, mut value: u32) {
    while value >= 0x80 {
        // Low seven bits with the continuation flag.
        buffer.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    buffer.push(value as u8);
}

// =============================================================================
// Writer
// =============================================================================

/// Message writer with a hard size cap.
///
/// Reused across messages; [`encode_message`] resets it first.
#[derive(Debug)]
pub struct MessageWriter {
    buffer: Vec<u8>,
    limit: usize,
}

impl MessageWriter {
    /// Creates a writer that refuses to grow past `limit` bytes.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// Clears the buffer for reuse.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Size cap in bytes.
    #[inline]
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// The written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    fn reserve(&self, additional: usize) -> EncodeResult<()> {
        let required = self.buffer.len() + additional;
        if required > self.limit {
            return Err(EncodeError::Overflow { required, limit: self.limit });
        }
        Ok(())
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> EncodeResult<()> {
        self.reserve(1)?;
        self.buffer.push(value);
        Ok(())
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> EncodeResult<()> {
        self.reserve(2)?;
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) -> EncodeResult<()> {
        self.reserve(4)?;
        self.buffer.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) -> EncodeResult<()> {
        self.write_u32(value.to_bits())
    }

    /// Writes a LEB128 varint.
    #[inline]
    pub fn write_varint(&mut self, value: u32) -> EncodeResult<()> {
        self.reserve(varint_len(value))?;
        append_varint(&mut self.buffer, value);
        Ok(())
    }

    /// Writes a Pod type directly.
    #[inline]
    pub fn write_pod<T: Pod>(&mut self, value: &T) -> EncodeResult<()> {
        let bytes = bytes_of(value);
        self.reserve(bytes.len())?;
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes a length-prefixed byte string.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> EncodeResult<()> {
        let len = u32::try_from(bytes.len()).map_err(|_| EncodeError::TooMany {
            what: "bytes",
            count: bytes.len(),
            max: u32::MAX as usize,
        })?;
        self.reserve(varint_len(len) + bytes.len())?;
        append_varint(&mut self.buffer, len);
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes a length-prefixed UTF-8 string.
    #[inline]
    pub fn write_string(&mut self, value: &str) -> EncodeResult<()> {
        self.write_bytes(value.as_bytes())
    }

    /// Writes a one-byte element count.
    pub fn write_count(&mut self, what: &'static str, count: usize) -> EncodeResult<()> {
        let count = u8::try_from(count).map_err(|_| EncodeError::TooMany {
            what,
            count,
            max: usize::from(u8::MAX),
        })?;
        self.write_u8(count)
    }

    /// Writes a varint element count.
    pub fn write_varint_count(&mut self, what: &'static str, count: usize) -> EncodeResult<()> {
        let count = u32::try_from(count).map_err(|_| EncodeError::TooMany {
            what,
            count,
            max: u32::MAX as usize,
        })?;
        self.write_varint(count)
    }

    /// Writes a tagged attribute value.
    pub fn write_value(&mut self, value: &AttributeValue) -> EncodeResult<()> {
        self.reserve(encoded_value_len(value))?;
        append_value(&mut self.buffer, value);
        Ok(())
    }

    fn write_component(&mut self, component: &ComponentData) -> EncodeResult<()> {
        self.write_varint(component.type_id.0)?;
        self.write_varint(component.id.0)?;
        self.write_count("static attributes", component.static_values.len())?;
        for value in &component.static_values {
            self.write_value(value)?;
        }
        self.write_count("dynamic attributes", component.dynamic.len())?;
        for attr in &component.dynamic {
            self.write_dynamic(attr)?;
        }
        Ok(())
    }

    fn write_dynamic(&mut self, attr: &DynamicAttributeData) -> EncodeResult<()> {
        self.write_u8(attr.id)?;
        self.write_string(&attr.name)?;
        self.write_value(&attr.value)
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Bounds-checked reader over a received payload.
#[derive(Debug)]
pub struct MessageReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> MessageReader<'a> {
    /// Creates a reader over a payload.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take(&mut self, needed: usize) -> DecodeResult<&'a [u8]> {
        if needed > self.remaining() {
            return Err(DecodeError::Truncated { offset: self.position, needed });
        }
        let slice = &self.buffer[self.position..self.position + needed];
        self.position += needed;
        Ok(slice)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.take(1)?[0])
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads an i32 in little-endian format.
    #[inline]
    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        self.read_u32().map(|bits| i32::from_le_bytes(bits.to_le_bytes()))
    }

    /// Reads a f32 in little-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> DecodeResult<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a LEB128 varint.
    pub fn read_varint(&mut self) -> DecodeResult<u32> {
        let start = self.position;
        let mut value = 0u32;
        for index in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            let bits = u32::from(byte & 0x7F);
            // The fifth byte may only carry the top four bits.
            if index == MAX_VARINT_LEN - 1 && (byte & 0xF0) != 0 {
                return Err(DecodeError::MalformedVarint(start));
            }
            value |= bits << (7 * index);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::MalformedVarint(start))
    }

    /// Reads a Pod type directly.
    pub fn read_pod<T: Pod>(&mut self) -> DecodeResult<T> {
        let size = std::mem::size_of::<T>();
        let offset = self.position;
        let slice = self.take(size)?;
        bytemuck::try_pod_read_unaligned(slice).map_err(|_| DecodeError::Truncated { offset, needed: size })
    }

    /// Reads a length-prefixed byte string.
    pub fn read_bytes(&mut self) -> DecodeResult<&'a [u8]> {
        let len = self.read_varint()? as usize;
        self.take(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> DecodeResult<String> {
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }

    fn check_count(&self, count: usize) -> DecodeResult<usize> {
        if count > self.remaining() {
            return Err(DecodeError::CountTooLarge { count, remaining: self.remaining() });
        }
        Ok(count)
    }

    /// Reads a one-byte element count.
    pub fn read_count(&mut self) -> DecodeResult<usize> {
        let count = usize::from(self.read_u8()?);
        self.check_count(count)
    }

    /// Reads a varint element count.
    pub fn read_varint_count(&mut self) -> DecodeResult<usize> {
        let count = self.read_varint()? as usize;
        self.check_count(count)
    }

    /// Reads a tagged attribute value.
    pub fn read_value(&mut self) -> DecodeResult<AttributeValue> {
        let tag = self.read_u8()?;
        let attribute_type = AttributeType::from_u8(tag).ok_or(DecodeError::UnknownTypeTag(tag))?;
        Ok(match attribute_type {
            AttributeType::Bool => AttributeValue::Bool(self.read_u8()? != 0),
            AttributeType::Int => AttributeValue::Int(self.read_i32()?),
            AttributeType::UInt => AttributeValue::UInt(self.read_u32()?),
            AttributeType::Real => AttributeValue::Real(self.read_f32()?),
            AttributeType::Float3 => AttributeValue::Float3(self.read_pod()?),
            AttributeType::Quat => AttributeValue::Quat(self.read_pod()?),
            AttributeType::String => AttributeValue::String(self.read_string()?),
            AttributeType::Binary => AttributeValue::Binary(self.read_bytes()?.to_vec()),
            AttributeType::Enum => AttributeValue::Enum(self.read_u32()?),
            AttributeType::EntityRef => AttributeValue::EntityRef(EntityId(self.read_varint()?)),
            AttributeType::AssetRef => AttributeValue::AssetRef(self.read_string()?),
        })
    }

    fn read_entity(&mut self) -> DecodeResult<EntityId> {
        self.read_varint().map(EntityId)
    }

    fn read_component_id(&mut self) -> DecodeResult<ComponentId> {
        self.read_varint().map(ComponentId)
    }

    fn read_component(&mut self) -> DecodeResult<ComponentData> {
        let type_id = ComponentTypeId(self.read_varint()?);
        let id = self.read_component_id()?;
        let static_count = self.read_count()?;
        let mut static_values = Vec::with_capacity(static_count);
        for _ in 0..static_count {
            static_values.push(self.read_value()?);
        }
        let dynamic_count = self.read_count()?;
        let mut dynamic = Vec::with_capacity(dynamic_count);
        for _ in 0..dynamic_count {
            dynamic.push(self.read_dynamic()?);
        }
        Ok(ComponentData { type_id, id, static_values, dynamic })
    }

    fn read_dynamic(&mut self) -> DecodeResult<DynamicAttributeData> {
        let id = self.read_u8()?;
        let name = self.read_string()?;
        let value = self.read_value()?;
        Ok(DynamicAttributeData { id, name, value })
    }

    fn finish(&self) -> DecodeResult<()> {
        match self.remaining() {
            0 => Ok(()),
            trailing => Err(DecodeError::TrailingBytes(trailing)),
        }
    }
}

// =============================================================================
// Messages
// =============================================================================

/// Encodes a message into the writer, returning the payload length.
///
/// The writer is reset first. On error its contents are unspecified.
pub fn encode_message(writer: &mut MessageWriter, message: &SyncMessage) -> EncodeResult<usize> {
    writer.reset();
    match message {
        SyncMessage::CreateEntity(m) => encode_components(writer, m.entity, &m.components)?,
        SyncMessage::CreateComponents(m) => encode_components(writer, m.entity, &m.components)?,
        SyncMessage::CreateAttributes(m) => encode_create_attributes(writer, m)?,
        SyncMessage::EditAttributes(m) => encode_edit_attributes(writer, m)?,
        SyncMessage::RemoveAttributes(m) => {
            writer.write_varint(m.entity.0)?;
            writer.write_varint(m.component.0)?;
            writer.write_count("removed attributes", m.attributes.len())?;
            for id in &m.attributes {
                writer.write_u8(*id)?;
            }
        }
        SyncMessage::RemoveComponents(m) => {
            writer.write_varint(m.entity.0)?;
            writer.write_varint_count("removed components", m.components.len())?;
            for id in &m.components {
                writer.write_varint(id.0)?;
            }
        }
        SyncMessage::RemoveEntity(m) => writer.write_varint(m.entity.0)?,
        SyncMessage::EntityAction(m) => encode_entity_action(writer, m)?,
    }
    Ok(writer.len())
}

fn encode_components(writer: &mut MessageWriter, entity: EntityId, components: &[ComponentData]) -> EncodeResult<()> {
    writer.write_varint(entity.0)?;
    writer.write_varint_count("components", components.len())?;
    for component in components {
        writer.write_component(component)?;
    }
    Ok(())
}

fn encode_create_attributes(writer: &mut MessageWriter, message: &CreateAttributes) -> EncodeResult<()> {
    writer.write_varint(message.entity.0)?;
    writer.write_varint(message.component.0)?;
    writer.write_count("created attributes", message.attributes.len())?;
    for attr in &message.attributes {
        writer.write_dynamic(attr)?;
    }
    Ok(())
}

fn encode_edit_attributes(writer: &mut MessageWriter, message: &EditAttributes) -> EncodeResult<()> {
    writer.write_varint(message.entity.0)?;
    writer.write_varint(message.component.0)?;

    let mut statics: Vec<&(u8, AttributeValue)> = message.static_edits.iter().collect();
    statics.sort_by_key(|(index, _)| *index);
    statics.dedup_by_key(|(index, _)| *index);

    let mask_len = statics.last().map_or(0, |(index, _)| usize::from(*index) / 8 + 1);
    let mut mask = [0u8; STATIC_MASK_BYTES];
    for (index, _) in &statics {
        mask[usize::from(*index) / 8] |= 1u8 << (*index % 8);
    }
    writer.write_count("bitmask bytes", mask_len)?;
    for byte in &mask[..mask_len] {
        writer.write_u8(*byte)?;
    }
    for (_, value) in &statics {
        writer.write_value(value)?;
    }

    writer.write_count("dynamic edits", message.dynamic_edits.len())?;
    for (id, value) in &message.dynamic_edits {
        writer.write_u8(*id)?;
        writer.write_value(value)?;
    }
    Ok(())
}

fn encode_entity_action(writer: &mut MessageWriter, message: &EntityAction) -> EncodeResult<()> {
    writer.write_varint(message.entity.0)?;
    writer.write_string(&message.action)?;
    writer.write_count("action parameters", message.params.len())?;
    for param in &message.params {
        writer.write_string(param)?;
    }
    writer.write_u8(message.exec.0)
}

/// Decodes a payload received under wire id `id`.
pub fn decode_message(id: u8, payload: &[u8]) -> DecodeResult<SyncMessage> {
    let kind = MessageId::from_u8(id).ok_or(DecodeError::UnknownMessage(id))?;
    let mut reader = MessageReader::new(payload);
    let message = match kind {
        MessageId::CreateEntity => {
            let (entity, components) = decode_components(&mut reader)?;
            SyncMessage::CreateEntity(CreateEntity { entity, components })
        }
        MessageId::CreateComponents => {
            let (entity, components) = decode_components(&mut reader)?;
            SyncMessage::CreateComponents(CreateComponents { entity, components })
        }
        MessageId::CreateAttributes => {
            let entity = reader.read_entity()?;
            let component = reader.read_component_id()?;
            let count = reader.read_count()?;
            let mut attributes = Vec::with_capacity(count);
            for _ in 0..count {
                attributes.push(reader.read_dynamic()?);
            }
            SyncMessage::CreateAttributes(CreateAttributes { entity, component, attributes })
        }
        MessageId::EditAttributes => SyncMessage::EditAttributes(decode_edit_attributes(&mut reader)?),
        MessageId::RemoveAttributes => {
            let entity = reader.read_entity()?;
            let component = reader.read_component_id()?;
            let count = reader.read_count()?;
            let mut attributes = Vec::with_capacity(count);
            for _ in 0..count {
                attributes.push(reader.read_u8()?);
            }
            SyncMessage::RemoveAttributes(RemoveAttributes { entity, component, attributes })
        }
        MessageId::RemoveComponents => {
            let entity = reader.read_entity()?;
            let count = reader.read_varint_count()?;
            let mut components = Vec::with_capacity(count);
            for _ in 0..count {
                components.push(reader.read_component_id()?);
            }
            SyncMessage::RemoveComponents(RemoveComponents { entity, components })
        }
        MessageId::RemoveEntity => SyncMessage::RemoveEntity(RemoveEntity { entity: reader.read_entity()? }),
        MessageId::EntityAction => {
            let entity = reader.read_entity()?;
            let action = reader.read_string()?;
            let count = reader.read_count()?;
            let mut params = Vec::with_capacity(count);
            for _ in 0..count {
                params.push(reader.read_string()?);
            }
            let exec = ExecType(reader.read_u8()?);
            SyncMessage::EntityAction(EntityAction { entity, action, params, exec })
        }
    };
    reader.finish()?;
    Ok(message)
}

fn decode_components(reader: &mut MessageReader<'_>) -> DecodeResult<(EntityId, Vec<ComponentData>)> {
    let entity = reader.read_entity()?;
    let count = reader.read_varint_count()?;
    let mut components = Vec::with_capacity(count);
    for _ in 0..count {
        components.push(reader.read_component()?);
    }
    Ok((entity, components))
}

fn decode_edit_attributes(reader: &mut MessageReader<'_>) -> DecodeResult<EditAttributes> {
    let entity = reader.read_entity()?;
    let component = reader.read_component_id()?;

    let mask_len = reader.read_count()?;
    if mask_len > STATIC_MASK_BYTES {
        return Err(DecodeError::MaskTooLong(mask_len));
    }
    let mut indices = Vec::new();
    for byte_index in 0..mask_len {
        let byte = reader.read_u8()?;
        for bit in 0..8u8 {
            if byte & (1u8 << bit) != 0 {
                let index = u8::try_from(byte_index * 8 + usize::from(bit))
                    .map_err(|_| DecodeError::MaskTooLong(mask_len))?;
                indices.push(index);
            }
        }
    }
    let mut static_edits = Vec::with_capacity(indices.len());
    for index in indices {
        static_edits.push((index, reader.read_value()?));
    }

    let count = reader.read_count()?;
    let mut dynamic_edits = Vec::with_capacity(count);
    for _ in 0..count {
        let id = reader.read_u8()?;
        dynamic_edits.push((id, reader.read_value()?));
    }
    Ok(EditAttributes { entity, component, static_edits, dynamic_edits })
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_core::{Quat, Vec3};

    fn round_trip(message: &SyncMessage) -> SyncMessage {
        let mut writer = MessageWriter::new(crate::MAX_MESSAGE_SIZE);
        let len = encode_message(&mut writer, message).unwrap();
        assert_eq!(len, writer.len());
        decode_message(message.id() as u8, writer.as_slice()).unwrap()
    }

    fn sample_component() -> ComponentData {
        ComponentData {
            type_id: ComponentTypeId(20),
            id: ComponentId(300),
            static_values: vec![
                AttributeValue::Bool(true),
                AttributeValue::Int(-5),
                AttributeValue::Float3(Vec3::new(1.0, 2.0, 3.0)),
                AttributeValue::Quat(Quat::IDENTITY),
                AttributeValue::String("héllo".to_owned()),
                AttributeValue::EntityRef(EntityId(70_000)),
            ],
            dynamic: vec![DynamicAttributeData {
                id: 3,
                name: "speed".to_owned(),
                value: AttributeValue::Real(1.5),
            }],
        }
    }

    #[test]
    fn test_varint_boundaries() {
        let mut writer = MessageWriter::new(64);
        for value in [0, 0x7F, 0x80, 0x3FFF, 0x4000, u32::MAX] {
            writer.reset();
            writer.write_varint(value).unwrap();
            assert_eq!(writer.len(), varint_len(value));
            let mut reader = MessageReader::new(writer.as_slice());
            assert_eq!(reader.read_varint().unwrap(), value);
        }
    }

    #[test]
    fn test_malformed_varint() {
        let mut reader = MessageReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert_eq!(reader.read_varint(), Err(DecodeError::MalformedVarint(0)));
    }

    #[test]
    fn test_create_entity_round_trip() {
        let message = SyncMessage::CreateEntity(CreateEntity {
            entity: EntityId(42),
            components: vec![sample_component()],
        });
        assert_eq!(round_trip(&message), message);
    }

    #[test]
    fn test_component_length_matches_encoding() {
        let component = sample_component();
        let message = SyncMessage::CreateComponents(CreateComponents {
            entity: EntityId(1),
            components: vec![component.clone()],
        });
        let mut writer = MessageWriter::new(crate::MAX_MESSAGE_SIZE);
        let len = encode_message(&mut writer, &message).unwrap();
        assert_eq!(len, varint_len(1) + varint_len(1) + encoded_component_len(&component));
    }

    #[test]
    fn test_edit_bitmask_sorts_static_edits() {
        let message = SyncMessage::EditAttributes(EditAttributes {
            entity: EntityId(5),
            component: ComponentId(1),
            static_edits: vec![(9, AttributeValue::UInt(9)), (0, AttributeValue::Bool(true))],
            dynamic_edits: vec![(2, AttributeValue::Enum(4))],
        });
        let SyncMessage::EditAttributes(decoded) = round_trip(&message) else {
            panic!("expected EditAttributes");
        };
        assert_eq!(
            decoded.static_edits,
            vec![(0, AttributeValue::Bool(true)), (9, AttributeValue::UInt(9))]
        );
        assert_eq!(decoded.dynamic_edits, vec![(2, AttributeValue::Enum(4))]);
    }

    #[test]
    fn test_entity_action_round_trip() {
        let message = SyncMessage::EntityAction(EntityAction {
            entity: EntityId(8),
            action: "Open".to_owned(),
            params: vec!["fast".to_owned(), String::new()],
            exec: ExecType::SERVER | ExecType::PEERS,
        });
        assert_eq!(round_trip(&message), message);
    }

    #[test]
    fn test_overflow_is_reported() {
        let message = SyncMessage::CreateAttributes(CreateAttributes {
            entity: EntityId(1),
            component: ComponentId(1),
            attributes: vec![DynamicAttributeData {
                id: 0,
                name: "blob".to_owned(),
                value: AttributeValue::Binary(vec![0; 200]),
            }],
        });
        let mut writer = MessageWriter::new(100);
        assert!(matches!(
            encode_message(&mut writer, &message),
            Err(EncodeError::Overflow { limit: 100, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_payloads() {
        let message = SyncMessage::RemoveEntity(RemoveEntity { entity: EntityId(3) });
        let mut writer = MessageWriter::new(64);
        encode_message(&mut writer, &message).unwrap();

        let mut padded = writer.as_slice().to_vec();
        padded.push(0);
        assert_eq!(
            decode_message(MessageId::RemoveEntity as u8, &padded),
            Err(DecodeError::TrailingBytes(1))
        );
        assert_eq!(decode_message(99, writer.as_slice()), Err(DecodeError::UnknownMessage(99)));
        assert!(matches!(
            decode_message(MessageId::CreateEntity as u8, &[]),
            Err(DecodeError::Truncated { .. })
        ));
        // Claims 200 components in a 2-byte payload.
        assert!(matches!(
            decode_message(MessageId::CreateEntity as u8, &[1, 0xC8, 0x01]),
            Err(DecodeError::CountTooLarge { count: 200, .. })
        ));
    }

    #[test]
    fn test_edit_mask_past_last_static_index_is_rejected() {
        // entity 1, component 1, 33 mask bytes with bit 256 set, no dynamics
        let mut payload = vec![1, 1, 33];
        payload.extend_from_slice(&[0; 32]);
        payload.extend_from_slice(&[0x01, 0]);
        assert_eq!(
            decode_message(MessageId::EditAttributes as u8, &payload),
            Err(DecodeError::MaskTooLong(33))
        );

        // A full 32-byte mask still addresses index 255.
        let message = SyncMessage::EditAttributes(EditAttributes {
            entity: EntityId(1),
            component: ComponentId(1),
            static_edits: vec![(255, AttributeValue::Bool(true))],
            dynamic_edits: Vec::new(),
        });
        assert_eq!(round_trip(&message), message);
    }

    #[test]
    fn test_unknown_type_tag() {
        let mut reader = MessageReader::new(&[42, 0]);
        assert_eq!(reader.read_value(), Err(DecodeError::UnknownTypeTag(42)));
    }
}
