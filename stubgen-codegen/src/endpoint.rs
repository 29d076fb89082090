//! Endpoint model builder
//!
//! Drives the generator once per method and assembles the request,
//! response, error, view and stream conversions of the endpoint, together
//! with the glue that ties them to out-of-band metadata.

use proc_macro2::{Literal, TokenStream};
use quote::quote;
use stubgen_schema::utils::{to_pascal_case, to_snake_case};
use stubgen_schema::{
    AttributeNode, Field, Method, Primitive, ResponseContract, RustType, Service, StreamKind,
};

use crate::error::{CompileError, FieldPath, Result};
use crate::generator::{ExtraParam, PlanRequest, RESULT_LOCAL, SOURCE_PARAM};
use crate::lower::{ident, lower_plan, type_tokens};
use crate::metadata::{decoder_tokens, encoder_tokens, extract, MetadataField, OutOfBand};
use crate::plan::{ConversionPlan, Direction, Param};
use crate::protocol::Status;
use crate::service::Compilation;

/// Field that carries a non-object message on wires that need objects.
pub const WRAPPED_FIELD: &str = "field";
pub const DEFAULT_VIEW: &str = "default";

/// Final step a peer takes on a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStep {
    None,
    CloseSend,
    CloseAndRecv,
    SendAndClose,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamModel {
    pub kind: StreamKind,
    /// Plan encoding each item the client sends.
    pub client_send: Option<String>,
    pub server_recv: Option<String>,
    /// Plan encoding each item the server sends.
    pub server_send: Option<String>,
    pub client_recv: Option<String>,
    pub client_close: CloseStep,
    pub server_close: CloseStep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorModel {
    pub name: String,
    pub variant: String,
    pub contract: ResponseContract,
    pub status: Status,
    pub service_type: RustType,
    pub wire_type: RustType,
    pub encode: String,
    pub decode: String,
    pub temporary: bool,
    pub timeout: bool,
    pub fault: bool,
}

/// Outcome of looking up an error by name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorDispatch<'m> {
    Declared(&'m ErrorModel),
    Unclassified(Status),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewModel {
    pub name: String,
    pub variant: String,
    /// `None` renders every attribute.
    pub attributes: Option<Vec<String>>,
    pub wire_type: RustType,
    pub encode: String,
    pub decode: String,
    /// Validator run on values decoded from this view.
    pub validation: Option<String>,
}

#[derive(Debug)]
pub struct EndpointModel {
    pub service: String,
    pub method: String,
    pub payload: Option<AttributeNode>,
    pub result: Option<AttributeNode>,
    pub stream_payload: Option<AttributeNode>,
    pub request_metadata: Vec<MetadataField>,
    pub response_metadata: Vec<MetadataField>,
    pub errors: Vec<ErrorModel>,
    pub unclassified: Status,
    pub views: Vec<ViewModel>,
    pub stream: Option<StreamModel>,
    pub plans: Vec<ConversionPlan>,
    response_codec: Option<(String, String)>,
    items: Vec<TokenStream>,
}

impl EndpointModel {
    pub fn plan(&self, name: &str) -> Option<&ConversionPlan> {
        self.plans.iter().find(|p| p.name() == name)
    }

    pub fn security_fields(&self) -> impl Iterator<Item = &MetadataField> {
        self.request_metadata
            .iter()
            .filter(|f| f.credential.is_some())
    }

    /// The contract a service error named `name` is sent with.
    pub fn error_contract(&self, name: &str) -> ErrorDispatch<'_> {
        match self.errors.iter().find(|e| e.name == name) {
            Some(error) => ErrorDispatch::Declared(error),
            None => ErrorDispatch::Unclassified(self.unclassified),
        }
    }

    pub fn to_tokens(&self) -> Result<TokenStream> {
        let plans = self
            .plans
            .iter()
            .map(lower_plan)
            .collect::<Result<Vec<_>>>()?;
        let items = &self.items;
        Ok(quote! {
            #(#plans)*
            #(#items)*
        })
    }
}

/// The built-in error shape used when a declared error has no type.
pub fn error_result_node() -> AttributeNode {
    let text = || AttributeNode::primitive(Primitive::String).required();
    let flag = || AttributeNode::primitive(Primitive::Boolean).required();
    AttributeNode::object(vec![
        Field::new("name", text()),
        Field::new("id", text()),
        Field::new("message", text()),
        Field::new("temporary", flag()),
        Field::new("timeout", flag()),
        Field::new("fault", flag()),
    ])
}

struct Names {
    snake: String,
    pascal: String,
}

pub fn build(comp: &mut Compilation<'_>, service: &Service, method: &Method) -> Result<EndpointModel> {
    let names = Names {
        snake: to_snake_case(&method.name),
        pascal: to_pascal_case(&method.name),
    };
    let mut model = EndpointModel {
        service: service.name.clone(),
        method: method.name.clone(),
        payload: method.payload.clone(),
        result: method.result.clone(),
        stream_payload: method.stream_payload.clone(),
        request_metadata: Vec::new(),
        response_metadata: Vec::new(),
        errors: Vec::new(),
        unclassified: comp.protocol().unclassified_status(),
        views: Vec::new(),
        stream: None,
        plans: Vec::new(),
        response_codec: None,
        items: Vec::new(),
    };

    if let Some(payload) = &method.payload {
        build_request(comp, &mut model, method, payload, &names)?;
    }
    if let Some(result) = &method.result {
        build_response(comp, &mut model, method, result, &names)?;
    }
    if !method.errors.is_empty() {
        build_errors(comp, &mut model, method, &names)?;
    }
    if method.stream != StreamKind::None {
        build_stream(comp, &mut model, method, &names)?;
    }

    tracing::info!(
        service = %service.name,
        method = %method.name,
        plans = model.plans.len(),
        "built endpoint"
    );
    Ok(model)
}

fn wire_message(comp: &Compilation<'_>, body: &AttributeNode) -> AttributeNode {
    match comp.schema.underlying(body).fields() {
        Some(fields) => {
            let mut node = AttributeNode::object(fields.to_vec());
            node.description = body.description.clone();
            node
        }
        None if comp.protocol().wraps_non_objects() => {
            AttributeNode::object(vec![Field::new(WRAPPED_FIELD, body.clone().required())])
        }
        None => body.clone(),
    }
}

fn param_name(ident: &str) -> String {
    if ident == SOURCE_PARAM || ident == RESULT_LOCAL {
        format!("{}_", ident)
    } else {
        ident.to_string()
    }
}

fn extra_params(fields: &[MetadataField]) -> Vec<ExtraParam> {
    fields
        .iter()
        .map(|f| ExtraParam {
            param: Param {
                name: param_name(&f.ident),
                ty: f.rust_type(),
                by_ref: false,
            },
            attribute: f.attribute.clone(),
        })
        .collect()
}

fn status_tokens(status: Status, support: &TokenStream) -> TokenStream {
    match status {
        Status::Http(code) => {
            let code = Literal::u16_unsuffixed(code);
            quote! { #support::Status::Http(#code) }
        }
        Status::Grpc(code) => {
            let code = Literal::i32_unsuffixed(code.number());
            quote! { #support::Status::Grpc(#code) }
        }
    }
}

/// Metadata decoder and encoder names, reserved when there are fields.
fn metadata_codecs(
    comp: &mut Compilation<'_>,
    model: &mut EndpointModel,
    fields: &[MetadataField],
    base: &str,
    source: &RustType,
) -> Result<Option<(String, String)>> {
    if fields.is_empty() {
        return Ok(None);
    }
    let decode = comp.registry.scope_mut().unique(&format!("decode_{}_metadata", base));
    let encode = comp.registry.scope_mut().unique(&format!("encode_{}_metadata", base));
    model
        .items
        .push(decoder_tokens(&decode, fields, &comp.config.support_path)?);
    model
        .items
        .push(encoder_tokens(&encode, source, fields, &comp.config.support_path));
    Ok(Some((decode, encode)))
}

fn build_request(
    comp: &mut Compilation<'_>,
    model: &mut EndpointModel,
    method: &Method,
    payload: &AttributeNode,
    names: &Names,
) -> Result<()> {
    let payload_hint = format!("{}Payload", names.pascal);
    let wire_hint = format!("{}{}", names.pascal, comp.protocol().wire_suffixes().0);
    let oob = OutOfBand {
        method: &method.name,
        mappings: &method.metadata,
        security: &method.security,
        header_channel: comp.protocol().header_channel(),
    };
    let extraction = extract(comp.schema, payload, &oob, &comp.service_ctx)?;
    let wire = wire_message(comp, &extraction.body);
    comp.register_service_type(payload, &payload_hint);
    comp.register_wire_type(&wire, &wire_hint);

    let mut decode = comp.plan(
        Direction::Decode,
        PlanRequest {
            name: format!("decode_{}_request", names.snake),
            source: &wire,
            source_hint: wire_hint.clone(),
            target: payload,
            target_hint: payload_hint.clone(),
            path: FieldPath::root("payload"),
            extras: extra_params(&extraction.out_of_band),
        },
    )?;
    decode.validation = comp.validator(payload, &payload_hint);
    let encode = comp.plan(
        Direction::Encode,
        PlanRequest {
            name: format!("encode_{}_request", names.snake),
            source: payload,
            source_hint: payload_hint,
            target: &wire,
            target_hint: wire_hint,
            path: FieldPath::root("payload"),
            extras: Vec::new(),
        },
    )?;

    let codecs = metadata_codecs(
        comp,
        model,
        &extraction.out_of_band,
        &names.snake,
        &encode.source_type,
    )?;
    let support = comp.support_tokens();
    let server = comp
        .registry
        .scope_mut()
        .unique(&format!("server_decode_{}", names.snake));
    let client = comp
        .registry
        .scope_mut()
        .unique(&format!("client_encode_{}", names.snake));
    model.items.push(server_decode_tokens(
        &server,
        &decode,
        codecs.as_ref().map(|(d, _)| d.as_str()),
        extraction.out_of_band.len(),
        &support,
    ));
    model.items.push(client_encode_tokens(
        &client,
        &encode,
        codecs.as_ref().map(|(_, e)| e.as_str()),
        &support,
    ));

    model.request_metadata = extraction.out_of_band;
    model.plans.push(decode);
    model.plans.push(encode);
    Ok(())
}

fn metadata_args(decoder: Option<&str>, count: usize) -> (TokenStream, TokenStream) {
    match decoder {
        Some(decoder) => {
            let decoder = ident(decoder);
            let idx = (0..count).map(Literal::usize_unsuffixed);
            (
                quote! { let metadata = #decoder(md)?; },
                quote! { #(, metadata.#idx)* },
            )
        }
        None => (TokenStream::new(), TokenStream::new()),
    }
}

fn server_decode_tokens(
    name: &str,
    decode: &ConversionPlan,
    decoder: Option<&str>,
    count: usize,
    support: &TokenStream,
) -> TokenStream {
    let fn_name = ident(name);
    let wire = type_tokens(&decode.source_type);
    let target = type_tokens(&decode.target_type);
    let decode_fn = ident(decode.name());
    let (read, args) = metadata_args(decoder, count);
    let validate = decode.validation.as_deref().map(|v| {
        let v = ident(v);
        quote! { #v(&payload)?; }
    });
    quote! {
        #[allow(unused_variables)]
        pub fn #fn_name(
            body: &#wire,
            md: &impl #support::MetadataSource,
        ) -> Result<#target, #support::DecodeError> {
            #read
            let payload = #decode_fn(body #args);
            #validate
            Ok(payload)
        }
    }
}

fn client_encode_tokens(
    name: &str,
    encode: &ConversionPlan,
    encoder: Option<&str>,
    support: &TokenStream,
) -> TokenStream {
    let fn_name = ident(name);
    let source = type_tokens(&encode.source_type);
    let wire = type_tokens(&encode.target_type);
    let encode_fn = ident(encode.name());
    let write = encoder.map(|e| {
        let e = ident(e);
        quote! { #e(value, md); }
    });
    quote! {
        #[allow(unused_variables)]
        pub fn #fn_name(value: &#source, md: &mut impl #support::MetadataSink) -> #wire {
            #write
            #encode_fn(value)
        }
    }
}

/// Views to build for the result, with their attribute filters.
fn result_views(
    comp: &Compilation<'_>,
    method: &Method,
    result: &AttributeNode,
) -> Result<Vec<(String, Option<Vec<String>>)>> {
    let named = comp.schema.named_composite(result).map(|id| comp.schema.get(id));
    let declared = named.map(|n| n.views.as_slice()).unwrap_or(&[]);
    let attributes = |name: &str| declared.iter().find(|v| v.name == name).map(|v| v.attributes.clone());

    match &method.view {
        Some(fixed) if fixed == DEFAULT_VIEW => {
            if declared.is_empty() {
                Ok(Vec::new())
            } else {
                Ok(vec![(DEFAULT_VIEW.to_string(), attributes(DEFAULT_VIEW))])
            }
        }
        Some(fixed) => match attributes(fixed) {
            Some(attrs) => Ok(vec![(fixed.clone(), Some(attrs))]),
            None => Err(CompileError::UnknownView {
                type_name: named.map(|n| n.name.clone()).unwrap_or_else(|| "result".to_string()),
                view: fixed.clone(),
            }),
        },
        None if declared.is_empty() => Ok(Vec::new()),
        None => {
            let mut views = vec![(DEFAULT_VIEW.to_string(), attributes(DEFAULT_VIEW))];
            views.extend(
                declared
                    .iter()
                    .filter(|v| v.name != DEFAULT_VIEW)
                    .map(|v| (v.name.clone(), Some(v.attributes.clone()))),
            );
            Ok(views)
        }
    }
}

fn filter_view(wire: &AttributeNode, attributes: Option<&[String]>) -> AttributeNode {
    match (attributes, wire.fields()) {
        (Some(attributes), Some(fields)) => AttributeNode::object(
            fields
                .iter()
                .filter(|f| attributes.contains(&f.name))
                .cloned()
                .collect(),
        ),
        _ => wire.clone(),
    }
}

fn build_response(
    comp: &mut Compilation<'_>,
    model: &mut EndpointModel,
    method: &Method,
    result: &AttributeNode,
    names: &Names,
) -> Result<()> {
    let result_hint = format!("{}Result", names.pascal);
    let wire_hint = format!("{}{}", names.pascal, comp.protocol().wire_suffixes().1);
    let oob = OutOfBand {
        method: &method.name,
        mappings: &method.response_metadata,
        security: &[],
        header_channel: comp.protocol().header_channel(),
    };
    let extraction = extract(comp.schema, result, &oob, &comp.service_ctx)?;
    let views = result_views(comp, method, result)?;
    if let Some(first) = extraction.out_of_band.first() {
        let reason = if !views.is_empty() {
            Some("response metadata cannot be combined with result views")
        } else if method.stream != StreamKind::None {
            Some("streamed results cannot carry response metadata")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(CompileError::UnsupportedMetadata {
                method: method.name.clone(),
                attribute: first.attribute.clone(),
                reason: reason.to_string(),
            });
        }
    }

    comp.register_service_type(result, &result_hint);
    let wire = wire_message(comp, &extraction.body);
    let support = comp.support_tokens();

    if views.is_empty() {
        comp.register_wire_type(&wire, &wire_hint);
        let encode = comp.plan(
            Direction::Encode,
            PlanRequest {
                name: format!("encode_{}_response", names.snake),
                source: result,
                source_hint: result_hint.clone(),
                target: &wire,
                target_hint: wire_hint.clone(),
                path: FieldPath::root("result"),
                extras: Vec::new(),
            },
        )?;
        let mut decode = comp.plan(
            Direction::Decode,
            PlanRequest {
                name: format!("decode_{}_response", names.snake),
                source: &wire,
                source_hint: wire_hint,
                target: result,
                target_hint: result_hint.clone(),
                path: FieldPath::root("result"),
                extras: extra_params(&extraction.out_of_band),
            },
        )?;
        decode.validation = comp.validator(result, &result_hint);

        let base = format!("{}_response", names.snake);
        let codecs = metadata_codecs(comp, model, &extraction.out_of_band, &base, &encode.source_type)?;
        let server = comp
            .registry
            .scope_mut()
            .unique(&format!("server_encode_{}", names.snake));
        let client = comp
            .registry
            .scope_mut()
            .unique(&format!("client_decode_{}", names.snake));
        model.items.push(client_encode_tokens(
            &server,
            &encode,
            codecs.as_ref().map(|(_, e)| e.as_str()),
            &support,
        ));
        model.items.push(client_decode_tokens(
            &client,
            &decode,
            codecs.as_ref().map(|(d, _)| d.as_str()),
            extraction.out_of_band.len(),
            &support,
        ));

        model.response_codec = Some((encode.name().to_string(), decode.name().to_string()));
        model.response_metadata = extraction.out_of_band;
        model.plans.push(encode);
        model.plans.push(decode);
        return Ok(());
    }

    for (view, attributes) in views {
        let default = view == DEFAULT_VIEW;
        let (name_suffix, hint_suffix) = if default {
            (String::new(), String::new())
        } else {
            (format!("_{}", to_snake_case(&view)), to_pascal_case(&view))
        };
        let view_wire = filter_view(&wire, attributes.as_deref());
        let view_hint = format!("{}{}", wire_hint, hint_suffix);
        comp.register_wire_type(&view_wire, &view_hint);

        let encode = comp.plan(
            Direction::Encode,
            PlanRequest {
                name: format!("encode_{}_response{}", names.snake, name_suffix),
                source: result,
                source_hint: result_hint.clone(),
                target: &view_wire,
                target_hint: view_hint.clone(),
                path: FieldPath::root("result").variant(&view),
                extras: Vec::new(),
            },
        )?;
        let mut decode = comp.plan(
            Direction::Decode,
            PlanRequest {
                name: format!("decode_{}_response{}", names.snake, name_suffix),
                source: &view_wire,
                source_hint: view_hint,
                target: result,
                target_hint: result_hint.clone(),
                path: FieldPath::root("result").variant(&view),
                extras: Vec::new(),
            },
        )?;
        let rendered = attributes.as_deref().map(|attrs| (view.as_str(), attrs));
        decode.validation = comp.view_validator(result, &result_hint, rendered);
        if model.response_codec.is_none() {
            model.response_codec = Some((encode.name().to_string(), decode.name().to_string()));
        }
        model.views.push(ViewModel {
            variant: to_pascal_case(&view),
            name: view,
            attributes,
            wire_type: encode.target_type.clone(),
            encode: encode.name().to_string(),
            decode: decode.name().to_string(),
            validation: decode.validation.clone(),
        });
        model.plans.push(encode);
        model.plans.push(decode);
    }

    let result_type = comp.service_ctx.rust_type(comp.schema, result, &format!("{}Result", names.pascal));
    let server = comp
        .registry
        .scope_mut()
        .unique(&format!("server_encode_{}", names.snake));
    let client = comp
        .registry
        .scope_mut()
        .unique(&format!("client_decode_{}", names.snake));
    model.items.push(view_tokens(
        &names.pascal,
        &server,
        &client,
        &result_type,
        &model.views,
        &comp.config.view_key,
        &support,
    ));
    Ok(())
}

fn client_decode_tokens(
    name: &str,
    decode: &ConversionPlan,
    decoder: Option<&str>,
    count: usize,
    support: &TokenStream,
) -> TokenStream {
    let fn_name = ident(name);
    let wire = type_tokens(&decode.source_type);
    let target = type_tokens(&decode.target_type);
    let decode_fn = ident(decode.name());
    let (read, args) = metadata_args(decoder, count);
    let validate = decode.validation.as_deref().map(|v| {
        let v = ident(v);
        quote! { #v(&value)?; }
    });
    quote! {
        #[allow(unused_variables)]
        pub fn #fn_name(
            body: &#wire,
            md: &impl #support::MetadataSource,
        ) -> Result<#target, #support::DecodeError> {
            #read
            let value = #decode_fn(body #args);
            #validate
            Ok(value)
        }
    }
}


fn view_tokens(
    pascal: &str,
    server: &str,
    client: &str,
    result: &RustType,
    views: &[ViewModel],
    view_key: &str,
    support: &TokenStream,
) -> TokenStream {
    let view_enum = ident(&format!("{}View", pascal));
    let body_enum = ident(&format!("{}ViewedResponse", pascal));
    let server = ident(server);
    let client = ident(client);
    let result = type_tokens(result);

    let variants: Vec<_> = views.iter().map(|v| ident(&v.variant)).collect();
    let labels: Vec<&str> = views.iter().map(|v| v.name.as_str()).collect();
    let wire_types = views.iter().map(|v| type_tokens(&v.wire_type));
    let encoders = views.iter().map(|v| ident(&v.encode));
    let decoders = views.iter().map(|v| {
        let decode = ident(&v.decode);
        match v.validation.as_deref() {
            Some(validate) => {
                let validate = ident(validate);
                quote! {{
                    let value = #decode(inner);
                    #validate(&value)?;
                    value
                }}
            }
            None => quote! { #decode(inner) },
        }
    });
    let (first, rest) = match variants.split_first() {
        Some((first, rest)) => (first, rest),
        None => return TokenStream::new(),
    };
    let mismatch = (views.len() > 1).then(|| {
        quote! {
            (view, _) => {
                return Err(#support::DecodeError::new(vec![#support::FieldError::invalid(
                    #view_key,
                    format!("body does not match announced view {}", view.name()),
                )]));
            }
        }
    });

    quote! {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub enum #view_enum {
            #[default]
            #first,
            #(#rest,)*
        }

        impl #view_enum {
            pub fn name(self) -> &'static str {
                match self {
                    #(#view_enum::#variants => #labels,)*
                }
            }

            /// The view announced by the server; unknown or missing
            /// identifiers select the default.
            pub fn from_metadata(md: &impl #support::MetadataSource) -> Self {
                match md.get(#view_key).as_deref() {
                    #(Some(#labels) => #view_enum::#variants,)*
                    _ => #view_enum::#first,
                }
            }

            pub fn announce(self, md: &mut impl #support::MetadataSink) {
                md.append(#view_key, self.name().to_string());
            }
        }

        #[derive(Debug, Clone, PartialEq)]
        pub enum #body_enum {
            #(#variants(#wire_types),)*
        }

        pub fn #server(
            value: &#result,
            view: #view_enum,
            md: &mut impl #support::MetadataSink,
        ) -> #body_enum {
            view.announce(md);
            match view {
                #(#view_enum::#variants => #body_enum::#variants(#encoders(value)),)*
            }
        }

        /// Decodes a body rendered with the view the server announced in
        /// `md`.
        pub fn #client(
            body: &#body_enum,
            md: &impl #support::MetadataSource,
        ) -> Result<#result, #support::DecodeError> {
            let value = match (#view_enum::from_metadata(md), body) {
                #((#view_enum::#variants, #body_enum::#variants(inner)) => #decoders,)*
                #mismatch
            };
            Ok(value)
        }
    }
}

fn build_errors(
    comp: &mut Compilation<'_>,
    model: &mut EndpointModel,
    method: &Method,
    names: &Names,
) -> Result<()> {
    let builtin = error_result_node();
    for error in &method.errors {
        let variant = to_pascal_case(&error.name);
        let path = FieldPath::root("error").variant(&error.name);
        if variant == "Unclassified" {
            return Err(CompileError::incompatible(
                &path,
                "collides with the unclassified fallback",
            ));
        }
        let snake = to_snake_case(&error.name);
        let (node, service_hint) = match &error.node {
            Some(node) => (node, format!("{}{}Error", names.pascal, variant)),
            None => (&builtin, "ErrorResult".to_string()),
        };
        let wire_hint = format!("{}{}Error", names.pascal, variant);
        let wire = wire_message(comp, node);
        comp.register_service_type(node, &service_hint);
        comp.register_wire_type(&wire, &wire_hint);

        let encode = comp.plan(
            Direction::Encode,
            PlanRequest {
                name: format!("encode_{}_{}_error", names.snake, snake),
                source: node,
                source_hint: service_hint.clone(),
                target: &wire,
                target_hint: wire_hint.clone(),
                path: path.clone(),
                extras: Vec::new(),
            },
        )?;
        let decode = comp.plan(
            Direction::Decode,
            PlanRequest {
                name: format!("decode_{}_{}_error", names.snake, snake),
                source: &wire,
                source_hint: wire_hint,
                target: node,
                target_hint: service_hint,
                path,
                extras: Vec::new(),
            },
        )?;
        model.errors.push(ErrorModel {
            name: error.name.clone(),
            variant,
            contract: error.contract,
            status: comp.protocol().status(&error.contract),
            service_type: encode.source_type.clone(),
            wire_type: encode.target_type.clone(),
            encode: encode.name().to_string(),
            decode: decode.name().to_string(),
            temporary: error.temporary,
            timeout: error.timeout,
            fault: error.fault,
        });
        model.plans.push(encode);
        model.plans.push(decode);
    }

    let support = comp.support_tokens();
    let scope = comp.registry.scope_mut();
    let encode = scope.unique(&format!("encode_{}_error", names.snake));
    let decode = scope.unique(&format!("decode_{}_error", names.snake));
    let status = scope.unique(&format!("{}_error_status", names.snake));
    model.items.push(error_tokens(
        &names.pascal,
        [&encode, &decode, &status],
        &model.errors,
        model.unclassified,
        &support,
    ));
    Ok(())
}

fn error_tokens(
    pascal: &str,
    [encode, decode, status]: [&String; 3],
    errors: &[ErrorModel],
    unclassified: Status,
    support: &TokenStream,
) -> TokenStream {
    let error_enum = ident(&format!("{}Error", pascal));
    let body_enum = ident(&format!("{}ErrorBody", pascal));
    let encode = ident(encode);
    let decode = ident(decode);
    let status = ident(status);

    let variants: Vec<_> = errors.iter().map(|e| ident(&e.variant)).collect();
    let labels: Vec<&str> = errors.iter().map(|e| e.name.as_str()).collect();
    let service_types = errors.iter().map(|e| type_tokens(&e.service_type));
    let wire_types = errors.iter().map(|e| type_tokens(&e.wire_type));
    let encoders = errors.iter().map(|e| ident(&e.encode));
    let decoders = errors.iter().map(|e| ident(&e.decode));
    let statuses: Vec<_> = errors.iter().map(|e| status_tokens(e.status, support)).collect();
    let fallback = status_tokens(unclassified, support);

    quote! {
        #[derive(Debug, Clone, PartialEq)]
        pub enum #error_enum {
            #(#variants(#service_types),)*
            Unclassified(#support::ServiceError),
        }

        impl std::fmt::Display for #error_enum {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    #(#error_enum::#variants(_) => f.write_str(#labels),)*
                    #error_enum::Unclassified(inner) => write!(f, "{}", inner),
                }
            }
        }

        impl std::error::Error for #error_enum {}

        #[derive(Debug, Clone, PartialEq)]
        pub enum #body_enum {
            #(#variants(#wire_types),)*
            Unclassified(#support::ServiceError),
        }

        pub fn #encode(err: &#error_enum) -> (#support::Status, #body_enum) {
            match err {
                #(#error_enum::#variants(inner) => (#statuses, #body_enum::#variants(#encoders(inner))),)*
                #error_enum::Unclassified(inner) => (#fallback, #body_enum::Unclassified(inner.clone())),
            }
        }

        pub fn #decode(body: &#body_enum) -> #error_enum {
            match body {
                #(#body_enum::#variants(inner) => #error_enum::#variants(#decoders(inner)),)*
                #body_enum::Unclassified(inner) => #error_enum::Unclassified(inner.clone()),
            }
        }

        /// Status a service error is sent with, looked up by declared name.
        pub fn #status(name: &str) -> #support::Status {
            match name {
                #(#labels => #statuses,)*
                _ => #fallback,
            }
        }
    }
}

fn build_stream(
    comp: &mut Compilation<'_>,
    model: &mut EndpointModel,
    method: &Method,
    names: &Names,
) -> Result<()> {
    let kind = method.stream;
    let support = comp.support_tokens();
    let (client_close, server_close) = match kind {
        StreamKind::Client => (CloseStep::CloseAndRecv, CloseStep::SendAndClose),
        StreamKind::Bidirectional => (CloseStep::CloseSend, CloseStep::None),
        StreamKind::Server | StreamKind::None => (CloseStep::None, CloseStep::None),
    };
    let mut stream = StreamModel {
        kind,
        client_send: None,
        server_recv: None,
        server_send: None,
        client_recv: None,
        client_close,
        server_close,
    };

    let mut request_wire = None;
    if matches!(kind, StreamKind::Client | StreamKind::Bidirectional) {
        let item = method.stream_payload.as_ref().ok_or_else(|| {
            CompileError::incompatible(
                &FieldPath::root("stream_payload"),
                format!("{} streams need a streaming payload", method.name),
            )
        })?;
        let item_hint = format!("{}StreamingPayload", names.pascal);
        let wire_hint = format!("{}StreamingRequest", names.pascal);
        let wire = wire_message(comp, item);
        comp.register_service_type(item, &item_hint);
        comp.register_wire_type(&wire, &wire_hint);

        let encode = comp.plan(
            Direction::Encode,
            PlanRequest {
                name: format!("encode_{}_streaming_request", names.snake),
                source: item,
                source_hint: item_hint.clone(),
                target: &wire,
                target_hint: wire_hint.clone(),
                path: FieldPath::root("stream_payload"),
                extras: Vec::new(),
            },
        )?;
        let mut decode = comp.plan(
            Direction::Decode,
            PlanRequest {
                name: format!("decode_{}_streaming_request", names.snake),
                source: &wire,
                source_hint: wire_hint,
                target: item,
                target_hint: item_hint.clone(),
                path: FieldPath::root("stream_payload"),
                extras: Vec::new(),
            },
        )?;
        decode.validation = comp.validator(item, &item_hint);

        let send = comp
            .registry
            .scope_mut()
            .unique(&format!("send_{}_streaming_request", names.snake));
        let recv = comp
            .registry
            .scope_mut()
            .unique(&format!("recv_{}_streaming_request", names.snake));
        model.items.push(send_tokens(&send, &encode, &support));
        model.items.push(recv_tokens(&recv, &decode, &support));

        stream.client_send = Some(encode.name().to_string());
        stream.server_recv = Some(decode.name().to_string());
        request_wire = Some(encode.target_type.clone());
        model.plans.push(encode);
        model.plans.push(decode);
    }

    let codec = model.response_codec.clone().and_then(|(encode, decode)| {
        let encode = model.plan(&encode)?.clone();
        let decode = model.plan(&decode)?.clone();
        Some((encode, decode))
    });

    if let Some((encode, decode)) = &codec {
        if matches!(kind, StreamKind::Server | StreamKind::Bidirectional) {
            let send = comp
                .registry
                .scope_mut()
                .unique(&format!("send_{}_response", names.snake));
            let recv = comp
                .registry
                .scope_mut()
                .unique(&format!("recv_{}_response", names.snake));
            model.items.push(send_tokens(&send, encode, &support));
            model.items.push(recv_tokens(&recv, decode, &support));
            stream.server_send = Some(encode.name().to_string());
            stream.client_recv = Some(decode.name().to_string());
        }
    }

    let scope = comp.registry.scope_mut();
    match client_close {
        CloseStep::CloseSend => {
            let name = scope.unique(&format!("close_send_{}", names.snake));
            model
                .items
                .push(close_send_tokens(&name, request_wire.as_ref(), &support));
        }
        CloseStep::CloseAndRecv => {
            let name = scope.unique(&format!("close_and_recv_{}", names.snake));
            model.items.push(close_and_recv_tokens(
                &name,
                request_wire.as_ref(),
                codec.as_ref().map(|(_, d)| d),
                &support,
            ));
        }
        CloseStep::None | CloseStep::SendAndClose => {}
    }
    if server_close == CloseStep::SendAndClose {
        let name = scope.unique(&format!("send_and_close_{}", names.snake));
        model.items.push(send_and_close_tokens(
            &name,
            codec.as_ref().map(|(e, _)| e),
            &support,
        ));
    }

    model.stream = Some(stream);
    Ok(())
}

fn send_tokens(name: &str, encode: &ConversionPlan, support: &TokenStream) -> TokenStream {
    let fn_name = ident(name);
    let item = type_tokens(&encode.source_type);
    let wire = type_tokens(&encode.target_type);
    let encode_fn = ident(encode.name());
    quote! {
        pub fn #fn_name(
            stream: &mut impl #support::StreamSink<#wire>,
            item: &#item,
        ) -> Result<(), #support::StreamError> {
            stream.send(#encode_fn(item))
        }
    }
}

fn recv_tokens(name: &str, decode: &ConversionPlan, support: &TokenStream) -> TokenStream {
    let fn_name = ident(name);
    let wire = type_tokens(&decode.source_type);
    let item = type_tokens(&decode.target_type);
    let decode_fn = ident(decode.name());
    let validate = decode.validation.as_deref().map(|v| {
        let v = ident(v);
        quote! { #v(&value).map_err(#support::StreamError::Decode)?; }
    });
    quote! {
        pub fn #fn_name(
            stream: &mut impl #support::StreamSource<#wire>,
        ) -> Result<Option<#item>, #support::StreamError> {
            match stream.recv()? {
                Some(body) => {
                    let value = #decode_fn(&body);
                    #validate
                    Ok(Some(value))
                }
                None => Ok(None),
            }
        }
    }
}

fn close_send_tokens(name: &str, request_wire: Option<&RustType>, support: &TokenStream) -> TokenStream {
    let fn_name = ident(name);
    let wire = request_wire.map(type_tokens).unwrap_or_else(|| quote! { () });
    quote! {
        pub fn #fn_name(
            stream: &mut impl #support::StreamSink<#wire>,
        ) -> Result<(), #support::StreamError> {
            stream.close()
        }
    }
}

fn close_and_recv_tokens(
    name: &str,
    request_wire: Option<&RustType>,
    decode: Option<&ConversionPlan>,
    support: &TokenStream,
) -> TokenStream {
    let fn_name = ident(name);
    let wire = request_wire.map(type_tokens).unwrap_or_else(|| quote! { () });
    match decode {
        Some(decode) => {
            let response = type_tokens(&decode.source_type);
            let result = type_tokens(&decode.target_type);
            let decode_fn = ident(decode.name());
            let validate = decode.validation.as_deref().map(|v| {
                let v = ident(v);
                quote! { #v(&value).map_err(#support::StreamError::Decode)?; }
            });
            quote! {
                pub fn #fn_name(
                    stream: &mut (impl #support::StreamSink<#wire> + #support::StreamSource<#response>),
                ) -> Result<#result, #support::StreamError> {
                    stream.close()?;
                    match stream.recv()? {
                        Some(body) => {
                            let value = #decode_fn(&body);
                            #validate
                            Ok(value)
                        }
                        None => Err(#support::StreamError::Closed),
                    }
                }
            }
        }
        None => quote! {
            pub fn #fn_name(
                stream: &mut impl #support::StreamSink<#wire>,
            ) -> Result<(), #support::StreamError> {
                stream.close()
            }
        },
    }
}

fn send_and_close_tokens(name: &str, encode: Option<&ConversionPlan>, support: &TokenStream) -> TokenStream {
    let fn_name = ident(name);
    match encode {
        Some(encode) => {
            let result = type_tokens(&encode.source_type);
            let response = type_tokens(&encode.target_type);
            let encode_fn = ident(encode.name());
            quote! {
                pub fn #fn_name(
                    stream: &mut impl #support::StreamSink<#response>,
                    result: &#result,
                ) -> Result<(), #support::StreamError> {
                    stream.send(#encode_fn(result))?;
                    stream.close()
                }
            }
        }
        None => quote! {
            pub fn #fn_name<T>(
                stream: &mut impl #support::StreamSink<T>,
            ) -> Result<(), #support::StreamError> {
                stream.close()
            }
        },
    }
}
