//! Linked schema
//!
//! The read-only input to a compilation pass. Produced once by
//! [`crate::link::link`] and never mutated afterwards.

use std::collections::HashMap;

use serde::Serialize;

use crate::attribute::{AttributeNode, Kind, KindTag, TypeId};
pub use crate::types::{
    ChannelSpec as Channel, KeyLocationSpec as KeyLocation, SchemeKindSpec as SchemeKind,
    StreamKind,
};

#[derive(Debug, Clone, Serialize)]
pub struct View {
    pub name: String,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedType {
    pub name: String,
    pub description: Option<String>,
    pub node: AttributeNode,
    pub views: Vec<View>,
}

impl NamedType {
    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    pub name: String,
    pub version: Option<String>,
    pub fingerprint: String,
    pub(crate) types: Vec<NamedType>,
    #[serde(skip)]
    pub(crate) index: HashMap<String, TypeId>,
    pub services: Vec<Service>,
    pub schemes: Vec<SecurityScheme>,
}

impl Schema {
    pub fn get(&self, id: TypeId) -> &NamedType {
        &self.types[id.0]
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.index.get(name).copied()
    }

    pub fn types(&self) -> impl Iterator<Item = (TypeId, &NamedType)> {
        self.types.iter().enumerate().map(|(i, t)| (TypeId(i), t))
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Follows `Named` references until a structural node is reached.
    ///
    /// Terminates because linking rejects alias-only cycles.
    pub fn underlying<'a>(&'a self, mut node: &'a AttributeNode) -> &'a AttributeNode {
        while let Kind::Named(id) = node.kind {
            node = &self.get(id).node;
        }
        node
    }

    pub fn kind_tag(&self, node: &AttributeNode) -> KindTag {
        match self.underlying(node).kind {
            Kind::Primitive(_) => KindTag::Primitive,
            Kind::Array(_) => KindTag::Array,
            Kind::Map(_, _) => KindTag::Map,
            Kind::Object(_) => KindTag::Object,
            Kind::Union(_) => KindTag::Union,
            Kind::Named(_) => unreachable!("underlying never returns a named node"),
        }
    }

    /// The named composite (object or union) `node` refers to, if any.
    pub fn named_composite(&self, node: &AttributeNode) -> Option<TypeId> {
        let mut current = node;
        let mut last = None;
        while let Kind::Named(id) = current.kind {
            last = Some(id);
            current = &self.get(id).node;
        }
        match current.kind {
            Kind::Object(_) | Kind::Union(_) => last,
            _ => None,
        }
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.schemes.iter().find(|s| s.name == name)
    }

    /// Human readable description of a node for diagnostics.
    pub fn describe(&self, node: &AttributeNode) -> String {
        match &node.kind {
            Kind::Primitive(p) => p.name().to_string(),
            Kind::Array(elem) => format!("array<{}>", self.describe(elem)),
            Kind::Map(k, v) => format!("map<{}, {}>", self.describe(k), self.describe(v)),
            Kind::Object(fields) => format!("object({} fields)", fields.len()),
            Kind::Named(id) => self.get(*id).name.clone(),
            Kind::Union(variants) => format!("union({} variants)", variants.len()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub name: String,
    pub description: Option<String>,
    pub methods: Vec<Method>,
}

impl Service {
    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Method {
    pub name: String,
    pub description: Option<String>,
    pub payload: Option<AttributeNode>,
    pub result: Option<AttributeNode>,
    pub stream: StreamKind,
    pub stream_payload: Option<AttributeNode>,
    pub errors: Vec<ErrorDef>,
    pub security: Vec<SecurityRequirement>,
    pub metadata: Vec<MetadataMapping>,
    pub response_metadata: Vec<MetadataMapping>,
    pub view: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDef {
    pub name: String,
    /// `None` uses the built-in error result shape.
    pub node: Option<AttributeNode>,
    pub description: Option<String>,
    pub contract: ResponseContract,
    pub temporary: bool,
    pub timeout: bool,
    pub fault: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResponseContract {
    pub http_status: Option<u16>,
    pub grpc_code: Option<GrpcCode>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GrpcCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl GrpcCode {
    const ALL: [GrpcCode; 17] = [
        GrpcCode::Ok,
        GrpcCode::Cancelled,
        GrpcCode::Unknown,
        GrpcCode::InvalidArgument,
        GrpcCode::DeadlineExceeded,
        GrpcCode::NotFound,
        GrpcCode::AlreadyExists,
        GrpcCode::PermissionDenied,
        GrpcCode::ResourceExhausted,
        GrpcCode::FailedPrecondition,
        GrpcCode::Aborted,
        GrpcCode::OutOfRange,
        GrpcCode::Unimplemented,
        GrpcCode::Internal,
        GrpcCode::Unavailable,
        GrpcCode::DataLoss,
        GrpcCode::Unauthenticated,
    ];

    /// Accepts `NotFound`, `not_found` and `NOT_FOUND`.
    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .chars()
            .filter(|c| *c != '_')
            .collect::<String>()
            .to_lowercase();
        Self::ALL
            .into_iter()
            .find(|code| code.name().to_lowercase() == normalized)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GrpcCode::Ok => "Ok",
            GrpcCode::Cancelled => "Cancelled",
            GrpcCode::Unknown => "Unknown",
            GrpcCode::InvalidArgument => "InvalidArgument",
            GrpcCode::DeadlineExceeded => "DeadlineExceeded",
            GrpcCode::NotFound => "NotFound",
            GrpcCode::AlreadyExists => "AlreadyExists",
            GrpcCode::PermissionDenied => "PermissionDenied",
            GrpcCode::ResourceExhausted => "ResourceExhausted",
            GrpcCode::FailedPrecondition => "FailedPrecondition",
            GrpcCode::Aborted => "Aborted",
            GrpcCode::OutOfRange => "OutOfRange",
            GrpcCode::Unimplemented => "Unimplemented",
            GrpcCode::Internal => "Internal",
            GrpcCode::Unavailable => "Unavailable",
            GrpcCode::DataLoss => "DataLoss",
            GrpcCode::Unauthenticated => "Unauthenticated",
        }
    }

    pub fn number(&self) -> i32 {
        Self::ALL
            .iter()
            .position(|c| c == self)
            .map(|i| i as i32)
            .unwrap_or(2)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetadataMapping {
    pub attribute: String,
    pub key: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityScheme {
    pub name: String,
    pub kind: SchemeKind,
    pub key: String,
    pub location: KeyLocation,
    pub prefix: Option<String>,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityRequirement {
    pub scheme: String,
    pub attribute: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grpc_code_parse() {
        assert_eq!(GrpcCode::parse("NotFound"), Some(GrpcCode::NotFound));
        assert_eq!(GrpcCode::parse("not_found"), Some(GrpcCode::NotFound));
        assert_eq!(GrpcCode::parse("NOT_FOUND"), Some(GrpcCode::NotFound));
        assert_eq!(GrpcCode::parse("nope"), None);
        assert_eq!(GrpcCode::NotFound.number(), 5);
        assert_eq!(GrpcCode::Unauthenticated.number(), 16);
    }
}
