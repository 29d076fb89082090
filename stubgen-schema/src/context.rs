//! Representation contexts
//!
//! The same attribute tree is rendered differently on each side of a
//! conversion. A [`RepresentationContext`] captures one side's policy: how
//! absence is encoded, which holder a field gets, how identifiers are
//! sanitized and which namespace its types live in.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeNode, Kind, Primitive};
use crate::schema::Schema;
use crate::utils::{to_pascal_case, to_snake_case};

/// Concrete Rust scalar a primitive is rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scalar {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    String,
    Bytes,
    Json,
}

impl Scalar {
    pub fn is_copy(&self) -> bool {
        !matches!(self, Scalar::String | Scalar::Bytes | Scalar::Json)
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Scalar::I32 | Scalar::I64 | Scalar::U32 | Scalar::U64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Scalar::F32 | Scalar::F64)
    }

    pub fn is_hashable(&self) -> bool {
        !self.is_float() && *self != Scalar::Json
    }

    /// Source text of the type, e.g. `i32` or `Vec<u8>`.
    pub fn rust_name(&self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::I32 => "i32",
            Scalar::I64 => "i64",
            Scalar::U32 => "u32",
            Scalar::U64 => "u64",
            Scalar::F32 => "f32",
            Scalar::F64 => "f64",
            Scalar::String => "String",
            Scalar::Bytes => "Vec<u8>",
            Scalar::Json => "serde_json::Value",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optionality {
    /// Absence is represented explicitly (`Option<T>`).
    AbsenceTracked,
    /// Absence and the zero value are indistinguishable.
    ZeroValueConflated,
}

/// Holder decision for one category of field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Optional fields are `Option<T>`, required ones are bare.
    Tracked,
    /// Always bare; absent reads as the zero value.
    Conflated,
    /// Always `Option<T>`, whether required or not.
    AlwaysOptional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderPolicy {
    pub primitive: Presence,
    pub message: Presence,
    pub collection: Presence,
}

impl HolderPolicy {
    pub fn uniform(optionality: Optionality) -> Self {
        let presence = match optionality {
            Optionality::AbsenceTracked => Presence::Tracked,
            Optionality::ZeroValueConflated => Presence::Conflated,
        };
        Self {
            primitive: presence,
            message: presence,
            collection: presence,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentRule {
    /// `type` becomes `r#type`.
    RawKeyword,
    /// `type` becomes `type_`.
    TrailingUnderscore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntWidth {
    /// `int`/`uint` are 64 bits wide.
    Native,
    /// `int`/`uint` are 32 bits wide, as on protobuf wires.
    Fixed32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepresentationContext {
    pub label: String,
    pub optionality: Optionality,
    pub holders: HolderPolicy,
    pub ident_rule: IdentRule,
    pub namespace: Option<String>,
    pub use_defaults: bool,
    pub int_width: IntWidth,
}

/// Which holder bucket a node falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderCategory {
    Primitive,
    Message,
    Collection,
    Union,
}

impl RepresentationContext {
    /// Service-side types: absence tracked, defaults stored by value.
    pub fn service() -> Self {
        Self {
            label: "service".to_string(),
            optionality: Optionality::AbsenceTracked,
            holders: HolderPolicy::uniform(Optionality::AbsenceTracked),
            ident_rule: IdentRule::RawKeyword,
            namespace: None,
            use_defaults: true,
            int_width: IntWidth::Native,
        }
    }

    /// Protobuf-style wire messages: scalars and collections conflate absence
    /// with zero, nested messages are always optional.
    pub fn grpc_wire(namespace: &str) -> Self {
        Self {
            label: "grpc".to_string(),
            optionality: Optionality::ZeroValueConflated,
            holders: HolderPolicy {
                primitive: Presence::Conflated,
                message: Presence::AlwaysOptional,
                collection: Presence::Conflated,
            },
            ident_rule: IdentRule::TrailingUnderscore,
            namespace: Some(namespace.to_string()),
            use_defaults: false,
            int_width: IntWidth::Fixed32,
        }
    }

    /// JSON request/response bodies: every field may be missing on the wire
    /// until validated.
    pub fn http_body(namespace: &str) -> Self {
        Self {
            label: "http".to_string(),
            optionality: Optionality::AbsenceTracked,
            holders: HolderPolicy {
                primitive: Presence::AlwaysOptional,
                message: Presence::AlwaysOptional,
                collection: Presence::AlwaysOptional,
            },
            ident_rule: IdentRule::RawKeyword,
            namespace: Some(namespace.to_string()),
            use_defaults: false,
            int_width: IntWidth::Native,
        }
    }

    pub fn scalar(&self, primitive: Primitive) -> Scalar {
        match primitive {
            Primitive::Boolean => Scalar::Bool,
            Primitive::Int => match self.int_width {
                IntWidth::Native => Scalar::I64,
                IntWidth::Fixed32 => Scalar::I32,
            },
            Primitive::UInt => match self.int_width {
                IntWidth::Native => Scalar::U64,
                IntWidth::Fixed32 => Scalar::U32,
            },
            Primitive::Int32 => Scalar::I32,
            Primitive::Int64 => Scalar::I64,
            Primitive::UInt32 => Scalar::U32,
            Primitive::UInt64 => Scalar::U64,
            Primitive::Float32 => Scalar::F32,
            Primitive::Float64 => Scalar::F64,
            Primitive::String => Scalar::String,
            Primitive::Bytes => Scalar::Bytes,
            Primitive::Any => Scalar::Json,
        }
    }

    pub fn category(&self, schema: &Schema, node: &AttributeNode) -> HolderCategory {
        match &schema.underlying(node).kind {
            Kind::Primitive(_) => HolderCategory::Primitive,
            Kind::Array(_) | Kind::Map(_, _) => HolderCategory::Collection,
            Kind::Union(_) => HolderCategory::Union,
            Kind::Object(_) | Kind::Named(_) => HolderCategory::Message,
        }
    }

    pub fn presence(&self, schema: &Schema, node: &AttributeNode) -> Presence {
        match self.category(schema, node) {
            HolderCategory::Primitive => self.holders.primitive,
            HolderCategory::Collection => self.holders.collection,
            HolderCategory::Message => self.holders.message,
            HolderCategory::Union => Presence::AlwaysOptional,
        }
    }

    /// Whether a field holding `node` is rendered as `Option<T>`.
    pub fn is_optional(&self, schema: &Schema, node: &AttributeNode) -> bool {
        match self.presence(schema, node) {
            Presence::AlwaysOptional => true,
            Presence::Conflated => false,
            Presence::Tracked => !node.required && !(self.use_defaults && node.default.is_some()),
        }
    }

    /// Whether an unset field holding `node` reads as the zero value.
    pub fn is_conflated(&self, schema: &Schema, node: &AttributeNode) -> bool {
        self.presence(schema, node) == Presence::Conflated
    }

    pub fn field_ident(&self, name: &str) -> String {
        let snake = to_snake_case(name);
        if !is_keyword(&snake) {
            return snake;
        }
        match self.ident_rule {
            IdentRule::RawKeyword if !matches!(snake.as_str(), "self" | "super" | "crate") => {
                format!("r#{}", snake)
            }
            _ => format!("{}_", snake),
        }
    }

    pub fn type_name(&self, name: &str) -> String {
        let pascal = to_pascal_case(name);
        if pascal == "Self" {
            return "Self_".to_string();
        }
        pascal
    }

    pub fn type_path(&self, name: &str) -> TypePath {
        let mut segments = Vec::new();
        if let Some(ns) = &self.namespace {
            segments.push(ns.clone());
        }
        segments.push(self.type_name(name));
        TypePath { segments }
    }

    /// Rust type of `node` without any holder. Anonymous objects and unions
    /// take their name from `hint`.
    pub fn rust_type(&self, schema: &Schema, node: &AttributeNode, hint: &str) -> RustType {
        match &node.kind {
            Kind::Primitive(p) => RustType::Scalar(self.scalar(*p)),
            Kind::Array(elem) => {
                RustType::Vec(Box::new(self.rust_type(schema, elem, &format!("{}Item", hint))))
            }
            Kind::Map(key, elem) => RustType::Map(
                Box::new(self.rust_type(schema, key, &format!("{}Key", hint))),
                Box::new(self.rust_type(schema, elem, &format!("{}Value", hint))),
            ),
            Kind::Object(_) | Kind::Union(_) => RustType::Path(self.type_path(hint)),
            Kind::Named(id) => {
                let named = schema.get(*id);
                match named.node.kind {
                    Kind::Object(_) | Kind::Union(_) => RustType::Path(self.type_path(&named.name)),
                    _ => self.rust_type(schema, &named.node, &named.name),
                }
            }
        }
    }

    /// Rust type of a field holding `node`, including `Option` and `Box`.
    pub fn holder_type(
        &self,
        schema: &Schema,
        node: &AttributeNode,
        hint: &str,
        boxed: bool,
    ) -> RustType {
        let mut ty = self.rust_type(schema, node, hint);
        if boxed {
            ty = RustType::Boxed(Box::new(ty));
        }
        if self.is_optional(schema, node) {
            ty = RustType::Option(Box::new(ty));
        }
        ty
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypePath {
    pub segments: Vec<String>,
}

impl TypePath {
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for TypePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("::"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RustType {
    Scalar(Scalar),
    Path(TypePath),
    Vec(Box<RustType>),
    Map(Box<RustType>, Box<RustType>),
    Option(Box<RustType>),
    Boxed(Box<RustType>),
}

impl RustType {
    pub fn is_option(&self) -> bool {
        matches!(self, RustType::Option(_))
    }
}

impl fmt::Display for RustType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RustType::Scalar(s) => f.write_str(s.rust_name()),
            RustType::Path(p) => write!(f, "{}", p),
            RustType::Vec(inner) => write!(f, "Vec<{}>", inner),
            RustType::Map(k, v) => write!(f, "std::collections::HashMap<{}, {}>", k, v),
            RustType::Option(inner) => write!(f, "Option<{}>", inner),
            RustType::Boxed(inner) => write!(f, "Box<{}>", inner),
        }
    }
}

const KEYWORDS: &[&str] = &[
    "as", "async", "await", "box", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "self", "static", "struct", "super", "trait", "true", "type",
    "unsafe", "use", "where", "while", "yield", "abstract", "become", "do", "final", "macro",
    "override", "priv", "try", "typeof", "unsized", "virtual",
];

pub fn is_keyword(ident: &str) -> bool {
    KEYWORDS.contains(&ident)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_ident_sanitizing() {
        let svc = RepresentationContext::service();
        let wire = RepresentationContext::grpc_wire("pb");
        assert_eq!(svc.field_ident("type"), "r#type");
        assert_eq!(wire.field_ident("type"), "type_");
        assert_eq!(svc.field_ident("self"), "self_");
        assert_eq!(svc.field_ident("RequiredString"), "required_string");
    }

    #[test]
    fn test_wire_int_width() {
        let wire = RepresentationContext::grpc_wire("pb");
        assert_eq!(wire.scalar(Primitive::Int), Scalar::I32);
        assert_eq!(wire.scalar(Primitive::UInt), Scalar::U32);
        assert_eq!(RepresentationContext::service().scalar(Primitive::Int), Scalar::I64);
    }

    #[test]
    fn test_type_path_namespace() {
        let wire = RepresentationContext::grpc_wire("pb");
        assert_eq!(wire.type_path("address").to_string(), "pb::Address");
        assert_eq!(RepresentationContext::service().type_path("Address").to_string(), "Address");
    }
}
