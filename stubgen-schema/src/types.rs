//! Raw schema document types
//!
//! These mirror the JSON document a schema author (or the DSL front end)
//! produces. Names are unresolved; [`crate::link`] turns them into a
//! [`crate::Schema`] arena.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub types: Vec<TypeDecl>,
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    #[serde(default)]
    pub schemes: Vec<SecuritySchemeSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub type_: TypeExpr,
    #[serde(default)]
    pub views: Vec<ViewSpec>,
}

/// A type expression. Strings name either a primitive or a declared type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TypeExpr {
    Simple(String),
    Array(TypeExprArray),
    Map(TypeExprMap),
    Object(TypeExprObject),
    Union(TypeExprUnion),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExprArray {
    pub array: Box<TypeExpr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExprMap {
    pub map: Box<(TypeExpr, TypeExpr)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExprObject {
    pub object: Vec<FieldDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeExprUnion {
    pub union: Vec<VariantDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: TypeExpr,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default)]
    pub validations: Vec<ValidationSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: TypeExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSpec {
    Minimum(f64),
    Maximum(f64),
    MinLength(usize),
    MaxLength(usize),
    Enum(Vec<Value>),
    Pattern(String),
    Format(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewSpec {
    pub name: String,
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<TypeExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TypeExpr>,
    #[serde(default)]
    pub stream: StreamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_payload: Option<TypeExpr>,
    #[serde(default)]
    pub errors: Vec<ErrorSpec>,
    #[serde(default)]
    pub security: Vec<SecurityRequirementSpec>,
    #[serde(default)]
    pub metadata: Vec<MetadataSpec>,
    #[serde(default)]
    pub response_metadata: Vec<MetadataSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    #[default]
    None,
    Client,
    Server,
    Bidirectional,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorSpec {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<TypeExpr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_code: Option<String>,
    #[serde(default)]
    pub temporary: bool,
    #[serde(default)]
    pub timeout: bool,
    #[serde(default)]
    pub fault: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSpec {
    Header,
    Trailer,
    Query,
    Path,
    Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSpec {
    pub attribute: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub channel: ChannelSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeKindSpec {
    Basic,
    ApiKey,
    Jwt,
    Oauth2,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyLocationSpec {
    #[default]
    Header,
    Query,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySchemeSpec {
    pub name: String,
    pub kind: SchemeKindSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub location: KeyLocationSpec,
    /// Scheme label the client prepends to the credential, e.g. `Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRequirementSpec {
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}
