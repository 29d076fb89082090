//! Attribute type model
//!
//! An [`AttributeNode`] is a node in the type tree the compiler works on.
//! Named types live in the [`crate::Schema`] arena and are referenced by
//! [`TypeId`], which lets self-referential and mutually referential types
//! be expressed without ownership cycles.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::ValidationSpec;

/// Index of a named type in the schema arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Boolean,
    Int,
    Int32,
    Int64,
    UInt,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    Bytes,
    Any,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "boolean" | "bool" => Primitive::Boolean,
            "int" => Primitive::Int,
            "int32" => Primitive::Int32,
            "int64" => Primitive::Int64,
            "uint" => Primitive::UInt,
            "uint32" => Primitive::UInt32,
            "uint64" => Primitive::UInt64,
            "float32" => Primitive::Float32,
            "float64" => Primitive::Float64,
            "string" => Primitive::String,
            "bytes" => Primitive::Bytes,
            "any" => Primitive::Any,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Boolean => "boolean",
            Primitive::Int => "int",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::UInt => "uint",
            Primitive::UInt32 => "uint32",
            Primitive::UInt64 => "uint64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::String => "string",
            Primitive::Bytes => "bytes",
            Primitive::Any => "any",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Primitive::Int
                | Primitive::Int32
                | Primitive::Int64
                | Primitive::UInt
                | Primitive::UInt32
                | Primitive::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Primitive::Float32 | Primitive::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Whether a value of `self` can be converted into `other` by a width or
    /// signedness coercion.
    pub fn compatible_with(&self, other: &Primitive) -> bool {
        self == other
            || (self.is_integer() && other.is_integer())
            || (self.is_float() && other.is_float())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub node: AttributeNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    pub node: AttributeNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Kind {
    Primitive(Primitive),
    Array(Box<AttributeNode>),
    Map(Box<AttributeNode>, Box<AttributeNode>),
    Object(Vec<Field>),
    Named(TypeId),
    Union(Vec<Variant>),
}

/// Coarse classification used by the wrap/unwrap rule and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindTag {
    Primitive,
    Array,
    Map,
    Object,
    Union,
}

impl std::fmt::Display for KindTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            KindTag::Primitive => "primitive",
            KindTag::Array => "array",
            KindTag::Map => "map",
            KindTag::Object => "object",
            KindTag::Union => "union",
        };
        f.write_str(label)
    }
}

pub type Validation = ValidationSpec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeNode {
    pub kind: Kind,
    pub required: bool,
    pub default: Option<Value>,
    pub validations: Vec<Validation>,
    pub wire_tag: Option<u32>,
    pub description: Option<String>,
}

impl AttributeNode {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            validations: Vec::new(),
            wire_tag: None,
            description: None,
        }
    }

    pub fn primitive(p: Primitive) -> Self {
        Self::new(Kind::Primitive(p))
    }

    pub fn array(elem: AttributeNode) -> Self {
        Self::new(Kind::Array(Box::new(elem)))
    }

    pub fn map(key: AttributeNode, elem: AttributeNode) -> Self {
        Self::new(Kind::Map(Box::new(key), Box::new(elem)))
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Self::new(Kind::Object(fields))
    }

    pub fn named(id: TypeId) -> Self {
        Self::new(Kind::Named(id))
    }

    pub fn union(variants: Vec<Variant>) -> Self {
        Self::new(Kind::Union(variants))
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.wire_tag = Some(tag);
        self
    }

    pub fn fields(&self) -> Option<&[Field]> {
        match &self.kind {
            Kind::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields()?.iter().find(|f| f.name == name)
    }

    pub fn as_primitive(&self) -> Option<Primitive> {
        match self.kind {
            Kind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn named_id(&self) -> Option<TypeId> {
        match self.kind {
            Kind::Named(id) => Some(id),
            _ => None,
        }
    }

    /// An object without fields, which is what an absent payload becomes.
    pub fn is_empty_object(&self) -> bool {
        matches!(&self.kind, Kind::Object(fields) if fields.is_empty())
    }
}

impl Field {
    pub fn new(name: impl Into<String>, node: AttributeNode) -> Self {
        Self {
            name: name.into(),
            node,
        }
    }
}

impl Variant {
    pub fn new(name: impl Into<String>, node: AttributeNode) -> Self {
        Self {
            name: name.into(),
            node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_names_round_trip() {
        for p in [
            Primitive::Boolean,
            Primitive::Int,
            Primitive::UInt64,
            Primitive::Float32,
            Primitive::Bytes,
        ] {
            assert_eq!(Primitive::from_name(p.name()), Some(p));
        }
        assert_eq!(Primitive::from_name("Address"), None);
    }

    #[test]
    fn test_numeric_compatibility() {
        assert!(Primitive::Int32.compatible_with(&Primitive::Int));
        assert!(Primitive::UInt.compatible_with(&Primitive::Int64));
        assert!(Primitive::Float32.compatible_with(&Primitive::Float64));
        assert!(!Primitive::Int.compatible_with(&Primitive::Float64));
        assert!(!Primitive::String.compatible_with(&Primitive::Bytes));
    }
}
