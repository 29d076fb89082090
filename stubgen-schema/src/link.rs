//! Linking: resolves type names in a [`SchemaSpec`] into a [`Schema`] arena.

use std::collections::{HashMap, HashSet};

use crate::analysis::cycles::find_unbounded_cycle;
use crate::attribute::{AttributeNode, Field, Primitive, TypeId, Variant};
use crate::error::SchemaError;
use crate::fingerprint::fingerprint;
use crate::schema::{
    ErrorDef, GrpcCode, MetadataMapping, Method, NamedType, ResponseContract, Schema,
    SchemeKind, SecurityRequirement, SecurityScheme, Service, View,
};
use crate::search::suggest_similar;
use crate::types::{
    FieldDecl, KeyLocationSpec, MethodSpec, SchemaSpec, SecuritySchemeSpec, TypeExpr,
};
use crate::utils::to_header_key;

struct Linker<'a> {
    index: &'a HashMap<String, TypeId>,
    names: Vec<&'a str>,
}

impl Linker<'_> {
    fn resolve_name(&self, name: &str, context: &str) -> Result<AttributeNode, SchemaError> {
        if let Some(p) = Primitive::from_name(name) {
            return Ok(AttributeNode::primitive(p));
        }
        match self.index.get(name) {
            Some(id) => Ok(AttributeNode::named(*id)),
            None => Err(SchemaError::UnknownType {
                name: name.to_string(),
                context: context.to_string(),
                suggestions: suggest_similar(name, &self.names, 3),
            }),
        }
    }

    fn node(&self, expr: &TypeExpr, context: &str) -> Result<AttributeNode, SchemaError> {
        match expr {
            TypeExpr::Simple(name) => self.resolve_name(name, context),
            TypeExpr::Array(a) => Ok(AttributeNode::array(
                self.node(&a.array, &format!("{}[*]", context))?,
            )),
            TypeExpr::Map(m) => {
                let (key, value) = &*m.map;
                Ok(AttributeNode::map(
                    self.node(key, &format!("{}{{key}}", context))?,
                    self.node(value, &format!("{}{{value}}", context))?,
                ))
            }
            TypeExpr::Object(o) => {
                let mut seen = HashSet::new();
                let mut fields = Vec::with_capacity(o.object.len());
                for decl in &o.object {
                    if !seen.insert(decl.name.as_str()) {
                        return Err(SchemaError::Duplicate {
                            section: "field",
                            name: format!("{}.{}", context, decl.name),
                        });
                    }
                    fields.push(self.field(decl, context)?);
                }
                Ok(AttributeNode::object(fields))
            }
            TypeExpr::Union(u) => {
                let mut seen = HashSet::new();
                let mut variants = Vec::with_capacity(u.union.len());
                for decl in &u.union {
                    if !seen.insert(decl.name.as_str()) {
                        return Err(SchemaError::Duplicate {
                            section: "variant",
                            name: format!("{}.{}", context, decl.name),
                        });
                    }
                    let mut node = self.node(&decl.type_, &format!("{}.{}", context, decl.name))?;
                    node.wire_tag = decl.tag;
                    variants.push(Variant::new(&decl.name, node));
                }
                Ok(AttributeNode::union(variants))
            }
        }
    }

    fn field(&self, decl: &FieldDecl, context: &str) -> Result<Field, SchemaError> {
        let mut node = self.node(&decl.type_, &format!("{}.{}", context, decl.name))?;
        node.required = decl.required;
        node.default = decl.default.clone();
        node.validations = decl.validations.clone();
        node.wire_tag = decl.tag;
        node.description = decl.description.clone();
        Ok(Field::new(&decl.name, node))
    }
}

/// Resolve all names in `spec` and run structural checks.
pub fn link(spec: &SchemaSpec) -> Result<Schema, SchemaError> {
    let mut index = HashMap::new();
    for (i, decl) in spec.types.iter().enumerate() {
        if Primitive::from_name(&decl.name).is_some() || index.contains_key(&decl.name) {
            return Err(SchemaError::Duplicate {
                section: "type",
                name: decl.name.clone(),
            });
        }
        index.insert(decl.name.clone(), TypeId(i));
    }

    let linker = Linker {
        index: &index,
        names: spec.types.iter().map(|t| t.name.as_str()).collect(),
    };

    let mut types = Vec::with_capacity(spec.types.len());
    for decl in &spec.types {
        let mut node = linker.node(&decl.type_, &decl.name)?;
        node.description = decl.description.clone();
        types.push(NamedType {
            name: decl.name.clone(),
            description: decl.description.clone(),
            node,
            views: decl
                .views
                .iter()
                .map(|v| View {
                    name: v.name.clone(),
                    attributes: v.attributes.clone(),
                })
                .collect(),
        });
    }

    if let Some(cycle) = find_unbounded_cycle(&types) {
        return Err(SchemaError::UnboundedCycle {
            cycle: cycle.into_iter().map(|id| types[id.0].name.clone()).collect(),
        });
    }

    let schemes = spec
        .schemes
        .iter()
        .map(link_scheme)
        .collect::<Vec<_>>();

    let mut schema = Schema {
        name: spec.name.clone(),
        version: spec.version.clone(),
        fingerprint: fingerprint(spec),
        types,
        index: index.clone(),
        services: Vec::new(),
        schemes,
    };
    check_views(&schema)?;

    let mut service_names = HashSet::new();
    let mut services = Vec::with_capacity(spec.services.len());
    for svc in &spec.services {
        if !service_names.insert(svc.name.as_str()) {
            return Err(SchemaError::Duplicate {
                section: "service",
                name: svc.name.clone(),
            });
        }
        let mut method_names = HashSet::new();
        let mut methods = Vec::with_capacity(svc.methods.len());
        for m in &svc.methods {
            if !method_names.insert(m.name.as_str()) {
                return Err(SchemaError::Duplicate {
                    section: "method",
                    name: format!("{}.{}", svc.name, m.name),
                });
            }
            methods.push(link_method(&linker, &schema, m)?);
        }
        services.push(Service {
            name: svc.name.clone(),
            description: svc.description.clone(),
            methods,
        });
    }
    schema.services = services;

    tracing::debug!(
        schema = %schema.name,
        types = schema.type_count(),
        services = schema.services.len(),
        "linked schema"
    );
    Ok(schema)
}

fn link_scheme(spec: &SecuritySchemeSpec) -> SecurityScheme {
    let (default_key, default_prefix) = match spec.kind {
        SchemeKind::Basic => ("authorization", Some("Basic")),
        SchemeKind::Jwt | SchemeKind::Oauth2 => ("authorization", Some("Bearer")),
        SchemeKind::ApiKey => match spec.location {
            KeyLocationSpec::Header => ("authorization", None),
            KeyLocationSpec::Query => ("api_key", None),
        },
    };
    SecurityScheme {
        name: spec.name.clone(),
        kind: spec.kind,
        key: spec
            .key
            .clone()
            .unwrap_or_else(|| default_key.to_string()),
        location: spec.location,
        prefix: match &spec.prefix {
            Some(p) if p.is_empty() => None,
            Some(p) => Some(p.clone()),
            None => default_prefix.map(str::to_string),
        },
        scopes: spec.scopes.clone(),
    }
}

fn check_views(schema: &Schema) -> Result<(), SchemaError> {
    for (_, named) in schema.types() {
        let fields = schema.underlying(&named.node).fields().unwrap_or_default();
        for view in &named.views {
            for attr in &view.attributes {
                if !fields.iter().any(|f| &f.name == attr) {
                    return Err(SchemaError::InvalidView {
                        type_name: named.name.clone(),
                        view: view.name.clone(),
                        attribute: attr.clone(),
                    });
                }
            }
        }
    }
    Ok(())
}

fn payload_field_names<'a>(schema: &'a Schema, payload: Option<&'a AttributeNode>) -> Vec<&'a str> {
    payload
        .map(|p| schema.underlying(p))
        .and_then(AttributeNode::fields)
        .map(|fields| fields.iter().map(|f| f.name.as_str()).collect())
        .unwrap_or_default()
}

fn check_attribute(names: &[&str], attribute: &str, method: &str) -> Result<(), SchemaError> {
    if names.contains(&attribute) {
        return Ok(());
    }
    Err(SchemaError::UnknownAttribute {
        attribute: attribute.to_string(),
        method: method.to_string(),
        suggestions: suggest_similar(attribute, names, 3),
    })
}

fn link_method(linker: &Linker<'_>, schema: &Schema, m: &MethodSpec) -> Result<Method, SchemaError> {
    let ctx = |part: &str| format!("{}.{}", m.name, part);
    let payload = m
        .payload
        .as_ref()
        .map(|t| linker.node(t, &ctx("payload")))
        .transpose()?;
    let result = m
        .result
        .as_ref()
        .map(|t| linker.node(t, &ctx("result")))
        .transpose()?;
    let stream_payload = m
        .stream_payload
        .as_ref()
        .map(|t| linker.node(t, &ctx("stream_payload")))
        .transpose()?;

    let mut error_names = HashSet::new();
    let mut errors = Vec::with_capacity(m.errors.len());
    for e in &m.errors {
        if !error_names.insert(e.name.as_str()) {
            return Err(SchemaError::Duplicate {
                section: "error",
                name: ctx(&e.name),
            });
        }
        let grpc_code = match &e.grpc_code {
            Some(code) => Some(GrpcCode::parse(code).ok_or_else(|| SchemaError::InvalidGrpcCode {
                code: code.clone(),
                context: ctx(&e.name),
            })?),
            None => None,
        };
        errors.push(ErrorDef {
            name: e.name.clone(),
            node: e
                .type_
                .as_ref()
                .map(|t| linker.node(t, &ctx(&e.name)))
                .transpose()?,
            description: e.description.clone(),
            contract: ResponseContract {
                http_status: e.http_status,
                grpc_code,
            },
            temporary: e.temporary,
            timeout: e.timeout,
            fault: e.fault,
        });
    }

    let payload_names = payload_field_names(schema, payload.as_ref());
    let scheme_names: Vec<&str> = schema.schemes.iter().map(|s| s.name.as_str()).collect();
    let mut security = Vec::with_capacity(m.security.len());
    for req in &m.security {
        if schema.scheme(&req.scheme).is_none() {
            return Err(SchemaError::UnknownScheme {
                name: req.scheme.clone(),
                method: m.name.clone(),
                suggestions: suggest_similar(&req.scheme, &scheme_names, 3),
            });
        }
        for attr in [&req.attribute, &req.username, &req.password]
            .into_iter()
            .flatten()
        {
            check_attribute(&payload_names, attr, &m.name)?;
        }
        security.push(SecurityRequirement {
            scheme: req.scheme.clone(),
            attribute: req.attribute.clone(),
            username: req.username.clone(),
            password: req.password.clone(),
        });
    }

    let mut metadata = Vec::with_capacity(m.metadata.len());
    for md in &m.metadata {
        check_attribute(&payload_names, &md.attribute, &m.name)?;
        metadata.push(MetadataMapping {
            attribute: md.attribute.clone(),
            key: md.key.clone().unwrap_or_else(|| to_header_key(&md.attribute)),
            channel: md.channel,
        });
    }

    let result_names = payload_field_names(schema, result.as_ref());
    let mut response_metadata = Vec::with_capacity(m.response_metadata.len());
    for md in &m.response_metadata {
        check_attribute(&result_names, &md.attribute, &m.name)?;
        response_metadata.push(MetadataMapping {
            attribute: md.attribute.clone(),
            key: md.key.clone().unwrap_or_else(|| to_header_key(&md.attribute)),
            channel: md.channel,
        });
    }

    Ok(Method {
        name: m.name.clone(),
        description: m.description.clone(),
        payload,
        result,
        stream: m.stream,
        stream_payload,
        errors,
        security,
        metadata,
        response_metadata,
        view: m.view.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_schema_content;

    fn link_str(doc: &str) -> Result<Schema, SchemaError> {
        link(&parse_schema_content(doc).expect("should parse"))
    }

    #[test]
    fn test_unknown_type_suggests() {
        let err = link_str(
            r#"{ "name": "s", "types": [
                { "name": "Address", "type": { "object": [] } },
                { "name": "Customer", "type": { "object": [{ "name": "home", "type": "Adress" }] } }
            ] }"#,
        )
        .unwrap_err();
        match err {
            SchemaError::UnknownType {
                name, suggestions, ..
            } => {
                assert_eq!(name, "Adress");
                assert_eq!(suggestions[0].candidate, "Address");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_self_reference_through_object_links() {
        let schema = link_str(
            r#"{ "name": "s", "types": [
                { "name": "Node", "type": { "object": [
                    { "name": "value", "type": "int", "required": true },
                    { "name": "next", "type": "Node" }
                ] } }
            ] }"#,
        )
        .expect("recursive object should link");
        let id = schema.lookup("Node").unwrap();
        let next = schema.get(id).node.field("next").unwrap();
        assert_eq!(next.node.named_id(), Some(id));
        assert!(schema.get(id).node.field("value").unwrap().node.required);
    }

    #[test]
    fn test_alias_cycle_rejected() {
        let err = link_str(
            r#"{ "name": "s", "types": [
                { "name": "A", "type": { "array": "B" } },
                { "name": "B", "type": "A" }
            ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnboundedCycle { .. }));
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let err = link_str(
            r#"{ "name": "s", "types": [
                { "name": "A", "type": "string" },
                { "name": "A", "type": "int" }
            ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::Duplicate { section: "type", .. }));
    }

    #[test]
    fn test_scheme_defaults() {
        let schema = link_str(
            r#"{ "name": "s",
                "schemes": [
                    { "name": "jwt", "kind": "jwt" },
                    { "name": "key", "kind": "api_key", "location": "query" },
                    { "name": "raw", "kind": "oauth2", "prefix": "" }
                ] }"#,
        )
        .unwrap();
        let jwt = schema.scheme("jwt").unwrap();
        assert_eq!(jwt.key, "authorization");
        assert_eq!(jwt.prefix.as_deref(), Some("Bearer"));
        assert_eq!(schema.scheme("key").unwrap().key, "api_key");
        assert!(schema.scheme("raw").unwrap().prefix.is_none());
    }

    #[test]
    fn test_metadata_attribute_must_exist() {
        let err = link_str(
            r#"{ "name": "s", "services": [{ "name": "svc", "methods": [{
                "name": "get",
                "payload": { "object": [{ "name": "request_id", "type": "string" }] },
                "metadata": [{ "attribute": "requestid", "channel": "header" }]
            }] }] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_metadata_key_default() {
        let schema = link_str(
            r#"{ "name": "s", "services": [{ "name": "svc", "methods": [{
                "name": "get",
                "payload": { "object": [{ "name": "request_id", "type": "string" }] },
                "metadata": [{ "attribute": "request_id", "channel": "header" }]
            }] }] }"#,
        )
        .unwrap();
        let method = &schema.services[0].methods[0];
        assert_eq!(method.metadata[0].key, "request-id");
    }

    #[test]
    fn test_invalid_view_attribute() {
        let err = link_str(
            r#"{ "name": "s", "types": [{
                "name": "Account",
                "type": { "object": [{ "name": "id", "type": "string" }] },
                "views": [{ "name": "tiny", "attributes": ["id", "name"] }]
            }] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidView { .. }));
    }
}
