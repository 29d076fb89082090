//! Validators for decoded service values

use std::collections::HashMap;

use proc_macro2::{Literal, TokenStream};
use quote::quote;
use serde_json::Value;
use stubgen_schema::utils::to_snake_case;
use stubgen_schema::{
    AttributeNode, Field, Kind, RepresentationContext, RustType, Scalar, Schema, TypeId, Validation,
};

use crate::lower::{ident, literal_tokens, type_tokens};
use crate::scope::Scope;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ValidatorKey {
    Named(TypeId),
    Anonymous(String),
    View(Box<ValidatorKey>, String),
}

/// Validators emitted during one pass, deduplicated per message type.
#[derive(Debug, Default)]
pub struct Validators {
    names: HashMap<ValidatorKey, String>,
    items: Vec<TokenStream>,
    scope: Scope,
}

struct Target<'n> {
    fields: Vec<&'n Field>,
    ty: RustType,
}

impl Validators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn tokens(&self) -> TokenStream {
        let items = &self.items;
        quote! { #(#items)* }
    }

    /// Returns the validator for a message of type `node`, emitting it (and
    /// the validators of nested named messages) on first use. `None` when
    /// the node is not an object.
    pub fn for_message(
        &mut self,
        schema: &Schema,
        ctx: &RepresentationContext,
        node: &AttributeNode,
        hint: &str,
        support: &TokenStream,
    ) -> Option<String> {
        self.for_view(schema, ctx, node, hint, None, support)
    }

    /// Like `for_message`, checking only the attributes a result view
    /// renders. Nested messages keep their full validators.
    pub fn for_view(
        &mut self,
        schema: &Schema,
        ctx: &RepresentationContext,
        node: &AttributeNode,
        hint: &str,
        view: Option<(&str, &[String])>,
        support: &TokenStream,
    ) -> Option<String> {
        let (mut key, mut base) = match schema.named_composite(node) {
            Some(id) => (ValidatorKey::Named(id), to_snake_case(&schema.get(id).name)),
            None => (ValidatorKey::Anonymous(hint.to_string()), to_snake_case(hint)),
        };
        if let Some((view, _)) = view {
            key = ValidatorKey::View(Box::new(key), view.to_string());
            base = format!("{}_{}", base, to_snake_case(view));
        }
        if let Some(name) = self.names.get(&key) {
            return Some(name.clone());
        }
        let fields = schema
            .underlying(node)
            .fields()?
            .iter()
            .filter(|f| view.map_or(true, |(_, rendered)| rendered.contains(&f.name)))
            .collect();
        let name = self.scope.unique(&format!("validate_{}", base));
        self.names.insert(key, name.clone());

        let target = Target {
            fields,
            ty: ctx.rust_type(schema, node, hint),
        };
        let item = self.emit(schema, ctx, &name, &target, hint, support);
        self.items.push(item);
        Some(name)
    }

    fn emit(
        &mut self,
        schema: &Schema,
        ctx: &RepresentationContext,
        name: &str,
        target: &Target<'_>,
        hint: &str,
        support: &TokenStream,
    ) -> TokenStream {
        let fn_name = ident(name);
        let ty = type_tokens(&target.ty);
        let checks: Vec<TokenStream> = target
            .fields
            .iter()
            .map(|field| self.field_checks(schema, ctx, field, hint, support))
            .collect();
        let param = if checks.iter().all(TokenStream::is_empty) {
            ident("_v")
        } else {
            ident("v")
        };
        quote! {
            pub fn #fn_name(#param: &#ty) -> Result<(), #support::DecodeError> {
                #[allow(unused_mut)]
                let mut errors: Vec<#support::FieldError> = Vec::new();
                #(#checks)*
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(#support::DecodeError::new(errors))
                }
            }
        }
    }

    fn field_checks(
        &mut self,
        schema: &Schema,
        ctx: &RepresentationContext,
        field: &Field,
        hint: &str,
        support: &TokenStream,
    ) -> TokenStream {
        let access = ident(&ctx.field_ident(&field.name));
        let label = field.name.as_str();
        let node = &field.node;
        let underlying = schema.underlying(node);

        let mut checks = Vec::new();
        if let Kind::Primitive(p) = underlying.kind {
            let scalar = ctx.scalar(p);
            for validation in node.validations.iter().chain(named_validations(schema, node)) {
                if let Some(check) = primitive_check(validation, scalar, label, support) {
                    checks.push(check);
                }
            }
        } else {
            for validation in &node.validations {
                if let Some(check) = length_check(validation, label, quote! { value.len() }, support) {
                    checks.push(check);
                }
            }
        }

        let child_hint = format!("{}{}", hint, stubgen_schema::utils::to_pascal_case(&field.name));
        match &underlying.kind {
            Kind::Object(_) => {
                if let Some(nested) = self.for_message(schema, ctx, node, &child_hint, support) {
                    let nested = ident(&nested);
                    checks.push(quote! {
                        if let Err(err) = #nested(value) {
                            errors.extend(err.nested(#label));
                        }
                    });
                }
            }
            Kind::Array(elem) if schema.underlying(elem).fields().is_some() => {
                let elem_hint = format!("{}Item", child_hint);
                if let Some(nested) = self.for_message(schema, ctx, elem, &elem_hint, support) {
                    let nested = ident(&nested);
                    checks.push(quote! {
                        for item in value.iter() {
                            if let Err(err) = #nested(item) {
                                errors.extend(err.nested(#label));
                            }
                        }
                    });
                }
            }
            _ => {}
        }

        let optional = ctx.is_optional(schema, node);
        let required = if optional && node.required {
            quote! {
                if v.#access.is_none() {
                    errors.push(#support::FieldError::missing(#label));
                }
            }
        } else {
            TokenStream::new()
        };
        if checks.is_empty() {
            return required;
        }
        let guarded = if optional {
            quote! {
                if let Some(value) = &v.#access {
                    #(#checks)*
                }
            }
        } else {
            quote! {
                {
                    let value = &v.#access;
                    #(#checks)*
                }
            }
        };
        quote! {
            #required
            #guarded
        }
    }
}

/// Validations declared on a named alias of a primitive.
fn named_validations<'s>(schema: &'s Schema, node: &AttributeNode) -> &'s [Validation] {
    match node.kind {
        Kind::Named(id) => &schema.get(id).node.validations,
        _ => &[],
    }
}

fn bound(value: f64) -> Literal {
    Literal::f64_unsuffixed(value)
}

fn length_check(
    validation: &Validation,
    label: &str,
    len: TokenStream,
    support: &TokenStream,
) -> Option<TokenStream> {
    let (limit, op, message) = match validation {
        Validation::MinLength(n) => (*n, quote! { < }, format!("length must be at least {}", n)),
        Validation::MaxLength(n) => (*n, quote! { > }, format!("length must be at most {}", n)),
        _ => return None,
    };
    let limit = Literal::usize_unsuffixed(limit);
    Some(quote! {
        if #len #op #limit {
            errors.push(#support::FieldError::invalid(#label, #message));
        }
    })
}

fn primitive_check(
    validation: &Validation,
    scalar: Scalar,
    label: &str,
    support: &TokenStream,
) -> Option<TokenStream> {
    let numeric = scalar.is_integer() || scalar.is_float();
    match validation {
        Validation::Minimum(min) if numeric => {
            let limit = bound(*min);
            let message = format!("must be greater than or equal to {}", min);
            Some(quote! {
                if (*value as f64) < #limit {
                    errors.push(#support::FieldError::invalid(#label, #message));
                }
            })
        }
        Validation::Maximum(max) if numeric => {
            let limit = bound(*max);
            let message = format!("must be less than or equal to {}", max);
            Some(quote! {
                if (*value as f64) > #limit {
                    errors.push(#support::FieldError::invalid(#label, #message));
                }
            })
        }
        Validation::MinLength(_) | Validation::MaxLength(_) => match scalar {
            Scalar::String => length_check(validation, label, quote! { value.chars().count() }, support),
            Scalar::Bytes => length_check(validation, label, quote! { value.len() }, support),
            _ => None,
        },
        Validation::Enum(values) => enum_check(values, scalar, label, support),
        Validation::Pattern(pattern) if scalar == Scalar::String => {
            let message = format!("must match {}", pattern);
            Some(quote! {
                if !#support::matches_pattern(value, #pattern) {
                    errors.push(#support::FieldError::invalid(#label, #message));
                }
            })
        }
        Validation::Format(format) if scalar == Scalar::String => Some(quote! {
            if let Err(reason) = #support::check_format(value, #format) {
                errors.push(#support::FieldError::invalid(#label, reason));
            }
        }),
        other => {
            tracing::warn!(field = label, validation = ?other, "validation ignored for {}", scalar.rust_name());
            None
        }
    }
}

fn enum_check(values: &[Value], scalar: Scalar, label: &str, support: &TokenStream) -> Option<TokenStream> {
    let allowed: Vec<String> = values.iter().map(Value::to_string).collect();
    let message = format!("must be one of {}", allowed.join(", "));
    let test = match scalar {
        Scalar::String => {
            let literals: Vec<&str> = values.iter().filter_map(Value::as_str).collect();
            quote! { [#(#literals),*].contains(&value.as_str()) }
        }
        s if s.is_integer() || s.is_float() || s == Scalar::Bool => {
            let literals = values
                .iter()
                .map(|v| literal_tokens(v, s))
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            quote! { [#(#literals),*].contains(value) }
        }
        _ => return None,
    };
    Some(quote! {
        if !#test {
            errors.push(#support::FieldError::invalid(#label, #message));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::ToTokens;
    use stubgen_schema::parse::parse_schema_content;

    const DOC: &str = r#"{
        "name": "s",
        "types": [
            { "name": "Address", "type": { "object": [
                { "name": "street", "type": "string", "required": true,
                  "validations": [ { "min_length": 1 } ] },
                { "name": "zip", "type": "string",
                  "validations": [ { "pattern": "^[0-9]{5}$" } ] }
            ] } },
            { "name": "Customer", "type": { "object": [
                { "name": "age", "type": "int", "validations": [ { "minimum": 0 }, { "maximum": 150 } ] },
                { "name": "tier", "type": "string", "validations": [ { "enum": ["gold", "silver"] } ] },
                { "name": "email", "type": "string", "validations": [ { "format": "email" } ] },
                { "name": "home", "type": "Address" },
                { "name": "previous", "type": { "array": "Address" } }
            ] } },
            { "name": "Note", "type": { "object": [
                { "name": "text", "type": "string" }
            ] } }
        ]
    }"#;

    #[test]
    fn test_validator_without_checks_ignores_its_argument() {
        let schema = stubgen_schema::link(&parse_schema_content(DOC).unwrap()).unwrap();
        let mut validators = Validators::new();
        let note = AttributeNode::named(schema.lookup("Note").unwrap());
        let name = validators
            .for_message(&schema, &RepresentationContext::service(), &note, "Note", &quote! { support })
            .unwrap();
        assert_eq!(name, "validate_note");
        let text = validators.tokens().to_string();
        assert!(text.contains("fn validate_note (_v : & Note)"), "{}", text);
    }

    #[test]
    fn test_view_validator_checks_rendered_attributes() {
        let schema = stubgen_schema::link(&parse_schema_content(DOC).unwrap()).unwrap();
        let ctx = RepresentationContext::service();
        let support = quote! { support };
        let mut validators = Validators::new();
        let address = AttributeNode::named(schema.lookup("Address").unwrap());
        let rendered = vec!["zip".to_string()];

        let name = validators
            .for_view(&schema, &ctx, &address, "Address", Some(("short", &rendered)), &support)
            .unwrap();
        assert_eq!(name, "validate_address_short");
        let full = validators.for_message(&schema, &ctx, &address, "Address", &support);
        assert_eq!(full.as_deref(), Some("validate_address"));
        assert_eq!(validators.len(), 2);

        let file: syn::File = syn::parse2(validators.tokens()).unwrap();
        let short = file.items[0].to_token_stream().to_string();
        assert!(short.contains("\"zip\""), "{}", short);
        assert!(!short.contains("\"street\""), "{}", short);
    }

    #[test]
    fn test_nested_validators_are_shared() {
        let schema = stubgen_schema::link(&parse_schema_content(DOC).unwrap()).unwrap();
        let ctx = RepresentationContext::service();
        let support = quote! { support };
        let mut validators = Validators::new();
        let customer = AttributeNode::named(schema.lookup("Customer").unwrap());

        let name = validators
            .for_message(&schema, &ctx, &customer, "Customer", &support)
            .unwrap();
        assert_eq!(name, "validate_customer");
        assert_eq!(validators.len(), 2);

        let again = validators.for_message(&schema, &ctx, &customer, "Customer", &support);
        assert_eq!(again.as_deref(), Some("validate_customer"));
        assert_eq!(validators.len(), 2);

        let file: syn::File = syn::parse2(validators.tokens()).unwrap();
        assert_eq!(file.items.len(), 2);
        let text = validators.tokens().to_string();
        assert!(text.contains("matches_pattern"));
        assert!(text.contains("check_format"));
        assert!(text.contains("validate_address (item)"));
    }

    #[test]
    fn test_scalar_payload_has_no_validator() {
        let schema = stubgen_schema::link(&parse_schema_content(DOC).unwrap()).unwrap();
        let node = AttributeNode::primitive(stubgen_schema::Primitive::String);
        let mut validators = Validators::new();
        let support = quote! { support };
        assert!(validators
            .for_message(&schema, &RepresentationContext::service(), &node, "X", &support)
            .is_none());
    }
}
