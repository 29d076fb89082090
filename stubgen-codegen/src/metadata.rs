//! Out-of-band metadata extraction
//!
//! Splits a payload or result object into the fields carried in the message
//! body and the fields carried out of band (headers, trailers, query and
//! path parameters, gRPC metadata and credentials), and emits the typed
//! decoders and encoders for the latter.

use std::collections::HashSet;

use proc_macro2::TokenStream;
use quote::quote;
use serde_json::Value;
use stubgen_schema::{
    AttributeNode, Channel, Field, Kind, KeyLocation, MetadataMapping, Primitive,
    RepresentationContext, RustType, Scalar, SchemeKind, Schema, SecurityRequirement,
};

use crate::error::{CompileError, Result};
use crate::lower::{ident, literal_tokens, scalar_tokens, type_tokens};

/// How a credential is carried in its header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// A token, optionally preceded by a scheme label such as `Bearer`.
    Token { prefix: Option<String> },
    BasicUsername,
    BasicPassword,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataField {
    pub attribute: String,
    /// Service-side field identifier.
    pub ident: String,
    pub key: String,
    pub channel: Channel,
    pub primitive: Primitive,
    pub scalar: Scalar,
    /// An array of primitives; every element is its own entry.
    pub repeated: bool,
    pub required: bool,
    /// The service field is `Option<T>`.
    pub optional: bool,
    pub default: Option<Value>,
    pub credential: Option<Credential>,
}

impl MetadataField {
    /// gRPC binary metadata.
    pub fn is_binary(&self) -> bool {
        self.channel == Channel::Metadata && self.key.ends_with("-bin")
    }

    pub fn rust_type(&self) -> RustType {
        let mut ty = RustType::Scalar(self.scalar);
        if self.repeated {
            ty = RustType::Vec(Box::new(ty));
        }
        if self.optional {
            ty = RustType::Option(Box::new(ty));
        }
        ty
    }
}

/// Result of splitting an object.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The object without its out-of-band fields.
    pub body: AttributeNode,
    pub out_of_band: Vec<MetadataField>,
}

impl Extraction {
    pub fn is_out_of_band(&self, attribute: &str) -> bool {
        self.out_of_band.iter().any(|f| f.attribute == attribute)
    }
}

/// Where out-of-band fields come from for one message.
pub struct OutOfBand<'a> {
    pub method: &'a str,
    pub mappings: &'a [MetadataMapping],
    pub security: &'a [SecurityRequirement],
    /// Channel used for credentials placed in headers.
    pub header_channel: Channel,
}

struct Candidate {
    attribute: String,
    key: String,
    channel: Channel,
    credential: Option<Credential>,
}

fn unsupported(method: &str, attribute: &str, reason: impl Into<String>) -> CompileError {
    CompileError::UnsupportedMetadata {
        method: method.to_string(),
        attribute: attribute.to_string(),
        reason: reason.into(),
    }
}

fn candidates(schema: &Schema, oob: &OutOfBand<'_>) -> Result<Vec<Candidate>> {
    let mut out: Vec<Candidate> = Vec::new();
    for req in oob.security {
        let scheme = schema
            .scheme(&req.scheme)
            .ok_or_else(|| CompileError::UnknownScheme(req.scheme.clone()))?;
        let channel = match scheme.location {
            KeyLocation::Query if scheme.kind == SchemeKind::ApiKey => Channel::Query,
            _ => oob.header_channel,
        };
        match scheme.kind {
            SchemeKind::Basic => {
                for (attribute, credential) in [
                    (&req.username, Credential::BasicUsername),
                    (&req.password, Credential::BasicPassword),
                ] {
                    if let Some(attribute) = attribute {
                        out.push(Candidate {
                            attribute: attribute.clone(),
                            key: scheme.key.clone(),
                            channel,
                            credential: Some(credential),
                        });
                    }
                }
            }
            SchemeKind::ApiKey | SchemeKind::Jwt | SchemeKind::Oauth2 => {
                if let Some(attribute) = &req.attribute {
                    out.push(Candidate {
                        attribute: attribute.clone(),
                        key: scheme.key.clone(),
                        channel,
                        credential: Some(Credential::Token {
                            prefix: scheme.prefix.clone(),
                        }),
                    });
                }
            }
        }
    }
    for mapping in oob.mappings {
        if out.iter().any(|c| c.attribute == mapping.attribute) {
            continue;
        }
        out.push(Candidate {
            attribute: mapping.attribute.clone(),
            key: mapping.key.clone(),
            channel: mapping.channel,
            credential: None,
        });
    }
    Ok(out)
}

fn classify(
    schema: &Schema,
    ctx: &RepresentationContext,
    method: &str,
    field: &Field,
    candidate: Candidate,
) -> Result<MetadataField> {
    let (primitive, repeated) = match &schema.underlying(&field.node).kind {
        Kind::Primitive(p) => (*p, false),
        Kind::Array(elem) => match &schema.underlying(elem).kind {
            Kind::Primitive(p) => (*p, true),
            _ => {
                return Err(unsupported(
                    method,
                    &field.name,
                    "only arrays of primitives can be repeated",
                ))
            }
        },
        _ => {
            return Err(unsupported(
                method,
                &field.name,
                format!(
                    "{} values cannot travel out of band",
                    schema.kind_tag(&field.node)
                ),
            ))
        }
    };

    if candidate.credential.is_some() && (primitive != Primitive::String || repeated) {
        return Err(unsupported(method, &field.name, "credentials must be single strings"));
    }
    let field = MetadataField {
        attribute: field.name.clone(),
        ident: ctx.field_ident(&field.name),
        key: candidate.key,
        channel: candidate.channel,
        primitive,
        scalar: ctx.scalar(primitive),
        repeated,
        required: field.node.required,
        optional: ctx.is_optional(schema, &field.node),
        default: field.node.default.clone(),
        credential: candidate.credential,
    };
    if field.is_binary() && primitive != Primitive::Bytes {
        return Err(unsupported(
            method,
            &field.attribute,
            "binary metadata keys carry bytes only",
        ));
    }
    Ok(field)
}

/// Splits `object` into body and out-of-band fields.
pub fn extract(
    schema: &Schema,
    object: &AttributeNode,
    oob: &OutOfBand<'_>,
    ctx: &RepresentationContext,
) -> Result<Extraction> {
    let candidates = candidates(schema, oob)?;
    if candidates.is_empty() {
        return Ok(Extraction {
            body: object.clone(),
            out_of_band: Vec::new(),
        });
    }
    let Some(fields) = schema.underlying(object).fields() else {
        let attribute = &candidates[0].attribute;
        return Err(unsupported(oob.method, attribute, "message is not an object"));
    };

    let mut out_of_band = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let field = fields
            .iter()
            .find(|f| f.name == candidate.attribute)
            .ok_or_else(|| unsupported(oob.method, &candidate.attribute, "no such attribute"))?;
        out_of_band.push(classify(schema, ctx, oob.method, field, candidate)?);
    }

    let moved: HashSet<&str> = out_of_band.iter().map(|f| f.attribute.as_str()).collect();
    let body_fields = fields
        .iter()
        .filter(|f| !moved.contains(f.name.as_str()))
        .cloned()
        .collect();
    let mut body = AttributeNode::object(body_fields);
    body.description = object.description.clone();

    tracing::debug!(
        method = oob.method,
        out_of_band = out_of_band.len(),
        "extracted metadata fields"
    );
    Ok(Extraction { body, out_of_band })
}

fn support_tokens(support_path: &str) -> TokenStream {
    let segments = support_path.split("::").map(ident);
    quote! { #(#segments)::* }
}

fn parse_tokens(field: &MetadataField, support: &TokenStream) -> TokenStream {
    let attribute = &field.attribute;
    match field.scalar {
        Scalar::String => quote! { raw },
        Scalar::Bytes if field.is_binary() => quote! { raw },
        Scalar::Bytes => quote! { raw.into_bytes() },
        Scalar::Json => quote! {
            match serde_json::from_str::<serde_json::Value>(&raw) {
                Ok(value) => value,
                Err(_) => {
                    errors.push(#support::FieldError::invalid_type(#attribute, &raw, "json"));
                    Default::default()
                }
            }
        },
        Scalar::Bool => quote! {
            match #support::parse_bool(&raw) {
                Some(value) => value,
                None => {
                    errors.push(#support::FieldError::invalid_type(#attribute, &raw, "boolean"));
                    Default::default()
                }
            }
        },
        scalar => {
            let ty = scalar_tokens(scalar);
            let expected = field.primitive.name();
            quote! {
                match raw.parse::<#ty>() {
                    Ok(value) => value,
                    Err(_) => {
                        errors.push(#support::FieldError::invalid_type(#attribute, &raw, #expected));
                        Default::default()
                    }
                }
            }
        }
    }
}

fn absent_tokens(field: &MetadataField, support: &TokenStream) -> Result<TokenStream> {
    let attribute = &field.attribute;
    let tokens = match (&field.default, field.repeated) {
        (Some(default), false) => {
            let literal = literal_tokens(default, field.scalar)?;
            if field.optional {
                quote! { Some(#literal) }
            } else {
                literal
            }
        }
        _ if field.optional => quote! { None },
        _ if field.required => quote! {
            {
                errors.push(#support::FieldError::missing(#attribute));
                Default::default()
            }
        },
        _ => quote! { Default::default() },
    };
    Ok(tokens)
}

fn fetch_tokens(field: &MetadataField, support: &TokenStream) -> TokenStream {
    let key = &field.key;
    if field.is_binary() {
        return quote! { md.get_bin(#key) };
    }
    match &field.credential {
        Some(Credential::Token {
            prefix: Some(prefix),
        }) => quote! { md.get(#key).map(|raw| #support::strip_scheme(&raw, #prefix)) },
        Some(Credential::BasicUsername) => quote! {
            md.get(#key)
                .and_then(|raw| #support::decode_basic_auth(&raw))
                .map(|(user, _)| user)
        },
        Some(Credential::BasicPassword) => quote! {
            md.get(#key)
                .and_then(|raw| #support::decode_basic_auth(&raw))
                .map(|(_, password)| password)
        },
        _ => quote! { md.get(#key) },
    }
}

fn decode_field(field: &MetadataField, support: &TokenStream) -> Result<TokenStream> {
    let name = ident(&field.ident);
    let ty = type_tokens(&field.rust_type());
    let parse = parse_tokens(field, support);
    let absent = absent_tokens(field, support)?;
    let wrap = |value: TokenStream| {
        if field.optional {
            quote! { Some(#value) }
        } else {
            value
        }
    };

    if field.repeated {
        let key = &field.key;
        let values = wrap(quote! { values });
        return Ok(quote! {
            let #name: #ty = {
                let raw_values = md.get_all(#key);
                if raw_values.is_empty() {
                    #absent
                } else {
                    let mut values = Vec::with_capacity(raw_values.len());
                    for raw in raw_values {
                        values.push(#parse);
                    }
                    #values
                }
            };
        });
    }

    let fetch = fetch_tokens(field, support);
    let present = wrap(parse);
    Ok(quote! {
        let #name: #ty = match #fetch {
            Some(raw) => #present,
            None => #absent,
        };
    })
}

/// `fn <name>(md) -> Result<(fields...), DecodeError>` reading every
/// out-of-band field and collecting all failures.
pub fn decoder_tokens(name: &str, fields: &[MetadataField], support_path: &str) -> Result<TokenStream> {
    let support = support_tokens(support_path);
    let fn_name = ident(name);
    let decoded = fields
        .iter()
        .map(|f| decode_field(f, &support))
        .collect::<Result<Vec<_>>>()?;
    let names: Vec<_> = fields.iter().map(|f| ident(&f.ident)).collect();
    let types = fields.iter().map(|f| type_tokens(&f.rust_type()));
    Ok(quote! {
        pub fn #fn_name(
            md: &impl #support::MetadataSource,
        ) -> Result<(#(#types,)*), #support::DecodeError> {
            #[allow(unused_mut)]
            let mut errors: Vec<#support::FieldError> = Vec::new();
            #(#decoded)*
            if !errors.is_empty() {
                return Err(#support::DecodeError::new(errors));
            }
            Ok((#(#names,)*))
        }
    })
}

fn stringify(field: &MetadataField, value: TokenStream) -> TokenStream {
    match field.scalar {
        Scalar::String => quote! { #value.clone() },
        Scalar::Bytes => quote! { String::from_utf8_lossy(#value).into_owned() },
        _ => quote! { #value.to_string() },
    }
}

fn encode_field(field: &MetadataField, fields: &[MetadataField], support: &TokenStream) -> Option<TokenStream> {
    let key = &field.key;
    let access = ident(&field.ident);

    let append = |value: TokenStream| -> TokenStream {
        if field.is_binary() {
            return quote! { md.append_bin(#key, #value.clone()); };
        }
        match &field.credential {
            Some(Credential::Token {
                prefix: Some(prefix),
            }) => quote! { md.append(#key, format!("{} {}", #prefix, #value)); },
            _ => {
                let text = stringify(field, value);
                quote! { md.append(#key, #text); }
            }
        }
    };

    let body = match &field.credential {
        // Basic credentials are written once, from the username field.
        Some(Credential::BasicPassword) => return None,
        Some(Credential::BasicUsername) => {
            let read = |f: Option<&MetadataField>| match f {
                Some(f) if f.optional => {
                    let name = ident(&f.ident);
                    quote! { v.#name.clone().unwrap_or_default() }
                }
                Some(f) => {
                    let name = ident(&f.ident);
                    quote! { v.#name.clone() }
                }
                None => quote! { String::new() },
            };
            let user = read(Some(field));
            let password = read(
                fields
                    .iter()
                    .find(|f| f.key == field.key && f.credential == Some(Credential::BasicPassword)),
            );
            return Some(quote! {
                {
                    let user: String = #user;
                    let password: String = #password;
                    md.append(#key, #support::encode_basic_auth(&user, &password));
                }
            });
        }
        _ if field.repeated => {
            let append = append(quote! { item });
            quote! {
                for item in value.iter() {
                    #append
                }
            }
        }
        _ => append(quote! { value }),
    };

    Some(if field.optional {
        quote! {
            if let Some(value) = &v.#access {
                #body
            }
        }
    } else {
        quote! {
            {
                let value = &v.#access;
                #body
            }
        }
    })
}

/// `fn <name>(v: &T, md)` writing every out-of-band field of `v`.
pub fn encoder_tokens(
    name: &str,
    source: &RustType,
    fields: &[MetadataField],
    support_path: &str,
) -> TokenStream {
    let support = support_tokens(support_path);
    let fn_name = ident(name);
    let ty = type_tokens(source);
    let writes = fields.iter().filter_map(|f| encode_field(f, fields, &support));
    quote! {
        pub fn #fn_name(v: &#ty, md: &mut impl #support::MetadataSink) {
            #(#writes)*
        }
    }
}
