//! # Attributes
//!
//! Typed value slots held by components.
//!
//! Vector types are `Pod` so the wire codec can copy them directly.

use bytemuck::{Pod, Zeroable};

use super::entity::EntityId;

/// Three-component float vector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vec3 {
    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Rotation quaternion.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Quat {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
    /// W component.
    pub w: f32,
}

impl Quat {
    /// The identity rotation.
    pub const IDENTITY: Self = Self { x: 0.0, y: 0.0, z: 0.0, w: 1.0 };

    /// Creates a new quaternion.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Type tag of an attribute value.
///
/// The discriminant is the tag written on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeType {
    /// `bool`.
    Bool = 0,
    /// `i32`.
    Int = 1,
    /// `u32`.
    UInt = 2,
    /// `f32`.
    Real = 3,
    /// [`Vec3`].
    Float3 = 4,
    /// [`Quat`].
    Quat = 5,
    /// UTF-8 string.
    String = 6,
    /// Opaque byte blob.
    Binary = 7,
    /// Enumerated value.
    Enum = 8,
    /// Reference to another entity.
    EntityRef = 9,
    /// Reference to an asset by name.
    AssetRef = 10,
}

impl AttributeType {
    /// Parses a wire tag.
    #[must_use]
    pub const fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Bool,
            1 => Self::Int,
            2 => Self::UInt,
            3 => Self::Real,
            4 => Self::Float3,
            5 => Self::Quat,
            6 => Self::String,
            7 => Self::Binary,
            8 => Self::Enum,
            9 => Self::EntityRef,
            10 => Self::AssetRef,
            _ => return None,
        })
    }
}

/// A typed attribute value.
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i32),
    /// Unsigned integer.
    UInt(u32),
    /// Float.
    Real(f32),
    /// Vector.
    Float3(Vec3),
    /// Rotation.
    Quat(Quat),
    /// Text.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Enumerated value.
    Enum(u32),
    /// Entity reference.
    EntityRef(EntityId),
    /// Asset reference.
    AssetRef(String),
}

impl AttributeValue {
    /// Returns the type tag of this value.
    #[must_use]
    pub const fn attribute_type(&self) -> AttributeType {
        match self {
            Self::Bool(_) => AttributeType::Bool,
            Self::Int(_) => AttributeType::Int,
            Self::UInt(_) => AttributeType::UInt,
            Self::Real(_) => AttributeType::Real,
            Self::Float3(_) => AttributeType::Float3,
            Self::Quat(_) => AttributeType::Quat,
            Self::String(_) => AttributeType::String,
            Self::Binary(_) => AttributeType::Binary,
            Self::Enum(_) => AttributeType::Enum,
            Self::EntityRef(_) => AttributeType::EntityRef,
            Self::AssetRef(_) => AttributeType::AssetRef,
        }
    }

    /// Returns the default value for a type.
    #[must_use]
    pub fn default_for(attribute_type: AttributeType) -> Self {
        match attribute_type {
            AttributeType::Bool => Self::Bool(false),
            AttributeType::Int => Self::Int(0),
            AttributeType::UInt => Self::UInt(0),
            AttributeType::Real => Self::Real(0.0),
            AttributeType::Float3 => Self::Float3(Vec3::default()),
            AttributeType::Quat => Self::Quat(Quat::IDENTITY),
            AttributeType::String => Self::String(String::new()),
            AttributeType::Binary => Self::Binary(Vec::new()),
            AttributeType::Enum => Self::Enum(0),
            AttributeType::EntityRef => Self::EntityRef(EntityId::NULL),
            AttributeType::AssetRef => Self::AssetRef(String::new()),
        }
    }
}

/// Addresses an attribute within its component.
///
/// Static attributes are addressed by their fixed index, dynamic attributes
/// by their runtime id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeKey {
    /// Index into the component type's static attribute list.
    Static(u8),
    /// Runtime id of a dynamic attribute.
    Dynamic(u8),
}

/// A named attribute slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Current value.
    pub value: AttributeValue,
    /// Scene change counter value at the last write.
    pub change_flag: u64,
}

impl Attribute {
    /// Creates a new attribute that was never written.
    #[must_use]
    pub fn new(name: impl Into<String>, value: AttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
            change_flag: 0,
        }
    }

    /// Returns the attribute's type.
    #[inline]
    #[must_use]
    pub const fn attribute_type(&self) -> AttributeType {
        self.value.attribute_type()
    }
}
