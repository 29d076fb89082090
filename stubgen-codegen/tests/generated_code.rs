use std::collections::BTreeSet;

use quote::ToTokens;

use stubgen_codegen::{compile_service, CodegenConfig};
use stubgen_schema::parse::load_schema;

fn generated(config: &CodegenConfig) -> syn::File {
    let path = format!("{}/tests/fixtures/orders.json", env!("CARGO_MANIFEST_DIR"));
    let schema = load_schema(path).expect("fixture should load");
    let model = compile_service(&schema, "orders", config).expect("service should compile");
    let tokens = model.to_tokens().expect("model should lower");
    syn::parse2(tokens).expect("generated code should parse")
}

fn functions(file: &syn::File) -> BTreeSet<String> {
    file.items
        .iter()
        .filter_map(|item| match item {
            syn::Item::Fn(f) => Some(f.sig.ident.to_string()),
            _ => None,
        })
        .collect()
}

fn modules(file: &syn::File) -> BTreeSet<String> {
    file.items
        .iter()
        .filter_map(|item| match item {
            syn::Item::Mod(m) => Some(m.ident.to_string()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_grpc_output_has_endpoint_glue() {
    let file = generated(&CodegenConfig::default());
    let fns = functions(&file);
    for expected in [
        "server_decode_create",
        "client_encode_create",
        "decode_create_metadata",
        "encode_create_metadata",
        "encode_create_error",
        "decode_create_error",
        "create_error_status",
        "server_encode_create",
        "client_decode_create",
        "server_decode_login",
        "send_watch_response",
        "recv_watch_response",
        "send_upload_streaming_request",
        "close_and_recv_upload",
        "send_and_close_upload",
        "close_send_chat",
        "validate_create_payload",
        "encode_address_to_address",
    ] {
        assert!(fns.contains(expected), "missing {} in {:?}", expected, fns);
    }
    assert_eq!(modules(&file), BTreeSet::from(["pb".to_string(), "support".to_string()]));
}

#[test]
fn test_view_enum_is_generated() {
    let file = generated(&CodegenConfig::default());
    let enums: BTreeSet<String> = file
        .items
        .iter()
        .filter_map(|item| match item {
            syn::Item::Enum(e) => Some(e.ident.to_string()),
            _ => None,
        })
        .collect();
    assert!(enums.contains("CreateView"));
    assert!(enums.contains("CreateViewedResponse"));
    assert!(enums.contains("CreateError"));
    assert!(enums.contains("Shape"));
}

fn function<'f>(file: &'f syn::File, name: &str) -> &'f syn::ItemFn {
    file.items
        .iter()
        .find_map(|item| match item {
            syn::Item::Fn(f) if f.sig.ident == name => Some(f),
            _ => None,
        })
        .unwrap_or_else(|| panic!("missing {}", name))
}

#[test]
fn test_client_decode_follows_announced_view() {
    let file = generated(&CodegenConfig::default());

    let client = function(&file, "client_decode_create");
    assert_eq!(client.sig.inputs.len(), 2);
    let output = client.sig.output.to_token_stream().to_string();
    assert!(output.contains("DecodeError"), "{}", output);
    let body = client.block.to_token_stream().to_string();
    assert!(body.contains("CreateView :: from_metadata (md)"), "{}", body);
    assert!(body.contains("validate_order (& value) ?"), "{}", body);
    assert!(body.contains("validate_order_tiny (& value) ?"), "{}", body);
    assert!(body.contains("FieldError :: invalid"), "{}", body);

    // A single fixed view leaves no mismatched pair to reject.
    let fixed = function(&file, "client_decode_get_order").block.to_token_stream().to_string();
    assert!(!fixed.contains("FieldError :: invalid"), "{}", fixed);

    let plain = function(&file, "client_decode_get_customer").block.to_token_stream().to_string();
    assert!(plain.contains("validate_customer (& value) ?"), "{}", plain);

    let tiny = function(&file, "validate_order_tiny");
    let input = tiny.sig.inputs.to_token_stream().to_string();
    assert!(input.starts_with("_v"), "{}", input);
}

#[test]
fn test_http_output_parses() {
    let file = generated(&CodegenConfig::http());
    assert!(modules(&file).contains("http"));
    assert!(functions(&file).contains("server_decode_get_customer"));
}
