//! Field and rule paths carried by violations.
//!
//! Paths are built inside-out: leaf evaluators produce an empty path (or a
//! subscript-only element), and each enclosing evaluator prepends its own
//! element while the evaluation unwinds.

use std::fmt;

use prost_reflect::{FieldDescriptor, Kind, MapKey};
use prost_types::field_descriptor_proto::Type;

/// Index or map key selecting one element of a repeated or map field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subscript {
    /// Position in a repeated field.
    Index(u64),
    /// Signed integer map key.
    IntKey(i64),
    /// Unsigned integer map key.
    UintKey(u64),
    /// Boolean map key.
    BoolKey(bool),
    /// String map key.
    StringKey(String),
}

impl From<&MapKey> for Subscript {
    fn from(key: &MapKey) -> Self {
        match key {
            MapKey::Bool(v) => Self::BoolKey(*v),
            MapKey::I32(v) => Self::IntKey(i64::from(*v)),
            MapKey::I64(v) => Self::IntKey(*v),
            MapKey::U32(v) => Self::UintKey(u64::from(*v)),
            MapKey::U64(v) => Self::UintKey(*v),
            MapKey::String(v) => Self::StringKey(v.clone()),
        }
    }
}

/// One step of a [`FieldPath`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct FieldPathElement {
    /// Field number, absent for oneof and subscript-only elements.
    pub field_number: Option<u32>,
    /// Field (or oneof) name.
    pub field_name: Option<String>,
    /// Declared field type.
    pub field_type: Option<Type>,
    /// Key type when the element addresses a map entry.
    pub key_type: Option<Type>,
    /// Value type when the element addresses a map entry.
    pub value_type: Option<Type>,
    /// Selected list index or map key.
    pub subscript: Option<Subscript>,
}

impl FieldPathElement {
    /// Element naming a field of a message.
    #[must_use]
    pub fn field(descriptor: &FieldDescriptor) -> Self {
        Self {
            field_number: Some(descriptor.number()),
            field_name: Some(descriptor.name().to_string()),
            field_type: Some(field_type(descriptor)),
            ..Self::default()
        }
    }

    pub(crate) fn oneof(name: &str) -> Self {
        Self {
            field_name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn index(index: usize) -> Self {
        Self {
            subscript: Some(Subscript::Index(u64::try_from(index).unwrap_or(u64::MAX))),
            ..Self::default()
        }
    }

    pub(crate) fn map_entry(key: &MapKey, key_type: Type, value_type: Type) -> Self {
        Self {
            key_type: Some(key_type),
            value_type: Some(value_type),
            subscript: Some(Subscript::from(key)),
            ..Self::default()
        }
    }

    #[must_use]
    pub(crate) fn with_subscript(mut self, subscript: Subscript) -> Self {
        self.subscript = Some(subscript);
        self
    }

    fn is_subscript_only(&self) -> bool {
        self.subscript.is_some()
            && self.field_number.is_none()
            && self.field_name.is_none()
            && self.field_type.is_none()
    }
}

/// Ordered path from the validated root message down to the offending value,
/// or from `FieldRules` down to the violated rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPath {
    elements: Vec<FieldPathElement>,
}

impl FieldPath {
    pub(crate) fn new(elements: Vec<FieldPathElement>) -> Self {
        Self { elements }
    }

    /// Path elements, outermost first.
    #[must_use]
    pub fn elements(&self) -> &[FieldPathElement] {
        &self.elements
    }

    /// True for the path of the validated message itself.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Adds `element` in front. A leading subscript-only element is folded
    /// into an incoming element that has no subscript of its own, so
    /// `repeated_field` + `[3]` becomes the single element `repeated_field[3]`.
    pub(crate) fn prepend(&mut self, mut element: FieldPathElement) {
        if element.subscript.is_none()
            && self
                .elements
                .first()
                .is_some_and(FieldPathElement::is_subscript_only)
        {
            let head = self.elements.remove(0);
            element.subscript = head.subscript;
            element.key_type = head.key_type.or(element.key_type);
            element.value_type = head.value_type.or(element.value_type);
        }
        self.elements.insert(0, element);
    }

    /// Adds every element of `prefix` in front, outermost first.
    pub(crate) fn prepend_all(&mut self, prefix: &FieldPath) {
        for element in prefix.elements.iter().rev() {
            self.prepend(element.clone());
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for element in &self.elements {
            if let Some(name) = element.field_name.as_deref().filter(|n| !n.is_empty()) {
                if !first {
                    f.write_str(".")?;
                }
                f.write_str(name)?;
                first = false;
            }
            if let Some(subscript) = &element.subscript {
                match subscript {
                    Subscript::Index(i) | Subscript::UintKey(i) => write!(f, "[{i}]")?,
                    Subscript::IntKey(i) => write!(f, "[{i}]")?,
                    Subscript::BoolKey(b) => write!(f, "[{b}]")?,
                    Subscript::StringKey(s) => {
                        let encoded =
                            serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string());
                        write!(f, "[{encoded}]")?;
                    }
                }
                first = false;
            }
        }
        Ok(())
    }
}

pub(crate) fn field_type(descriptor: &FieldDescriptor) -> Type {
    if descriptor.is_group() {
        Type::Group
    } else {
        kind_type(&descriptor.kind())
    }
}

pub(crate) fn kind_type(kind: &Kind) -> Type {
    match kind {
        Kind::Double => Type::Double,
        Kind::Float => Type::Float,
        Kind::Int64 => Type::Int64,
        Kind::Uint64 => Type::Uint64,
        Kind::Int32 => Type::Int32,
        Kind::Fixed64 => Type::Fixed64,
        Kind::Fixed32 => Type::Fixed32,
        Kind::Bool => Type::Bool,
        Kind::String => Type::String,
        Kind::Message(_) => Type::Message,
        Kind::Bytes => Type::Bytes,
        Kind::Uint32 => Type::Uint32,
        Kind::Enum(_) => Type::Enum,
        Kind::Sfixed32 => Type::Sfixed32,
        Kind::Sfixed64 => Type::Sfixed64,
        Kind::Sint32 => Type::Sint32,
        Kind::Sint64 => Type::Sint64,
    }
}
