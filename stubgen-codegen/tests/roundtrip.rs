use stubgen_codegen::eval::{Evaluator, Value};
use stubgen_codegen::fragment::{self, Expr, Stmt};
use stubgen_codegen::{compile_service, CodegenConfig, ServiceModel};
use stubgen_schema::parse::load_schema;
use stubgen_schema::Scalar;

fn compile() -> ServiceModel {
    let path = format!("{}/tests/fixtures/orders.json", env!("CARGO_MANIFEST_DIR"));
    let schema = load_schema(path).expect("fixture should load");
    compile_service(&schema, "orders", &CodegenConfig::default()).expect("service should compile")
}

fn compile_scenarios(config: &CodegenConfig) -> ServiceModel {
    let path = format!("{}/tests/fixtures/scenarios.json", env!("CARGO_MANIFEST_DIR"));
    let schema = load_schema(path).expect("fixture should load");
    compile_service(&schema, "scenarios", config).expect("service should compile")
}

fn run(model: &ServiceModel, method: &str, plan: &str, input: Value, extras: Vec<Value>) -> Value {
    let endpoint = model.endpoint(method).expect("endpoint exists");
    let plan = endpoint.plan(plan).expect("plan exists");
    Evaluator::new(&model.registry)
        .run(plan, input, extras)
        .expect("plan should evaluate")
}

#[test]
fn test_update_address_round_trip() {
    let model = compile();
    let payload = Value::object([
        ("customer_id", Value::str("c-1")),
        (
            "address",
            Value::object([("street", Value::str("Main St")), ("zip", Value::str("12345"))]),
        ),
    ]);

    let wire = run(&model, "update_address", "encode_update_address_request", payload, vec![]);
    assert_eq!(wire.get("customer_id"), &Value::str("c-1"));
    assert_eq!(wire.get("address").get("street"), &Value::str("Main St"));

    let back = run(&model, "update_address", "decode_update_address_request", wire, vec![]);
    assert_eq!(back.get("customer_id"), &Value::str("c-1"));
    let address = back.get("address");
    assert_eq!(address.get("street"), &Value::str("Main St"));
    assert_eq!(address.get("zip"), &Value::str("12345"));
    assert!(address.get("city").is_null());
}

#[test]
fn test_decode_fills_out_of_band_fields_and_defaults() {
    let model = compile();
    let endpoint = model.endpoint("create").unwrap();
    let extras = endpoint
        .request_metadata
        .iter()
        .map(|f| match f.attribute.as_str() {
            "token" => Value::str("secret"),
            "request_id" => Value::str("r-9"),
            other => panic!("unexpected metadata field {}", other),
        })
        .collect();
    let wire = Value::object([
        ("customer", Value::object([("id", Value::str("c-1"))])),
        ("priority", Value::Int(0)),
    ]);

    let payload = run(&model, "create", "decode_create_request", wire, extras);
    assert_eq!(payload.get("token"), &Value::str("secret"));
    assert_eq!(payload.get("request_id"), &Value::str("r-9"));
    assert_eq!(payload.get("customer").get("id"), &Value::str("c-1"));
    // An unset wire scalar reads as zero, which selects the default.
    assert_eq!(payload.get("priority"), &Value::Int(1));
}

#[test]
fn test_encode_narrows_integers() {
    let model = compile();
    let payload = Value::object([
        ("token", Value::str("secret")),
        ("customer", Value::object([("id", Value::str("c-1")), ("age", Value::Int(42))])),
        ("priority", Value::Int(5_000_000_000)),
    ]);
    let wire = run(&model, "create", "encode_create_request", payload, vec![]);
    assert!(wire.get("token").is_null());
    assert_eq!(wire.get("customer").get("age"), &Value::Int(42));
    assert_eq!(wire.get("priority"), &Value::Int(5_000_000_000i64 as i32 as i128));
}

#[test]
fn test_recursive_result_round_trip() {
    let model = compile();
    let tree = Value::object([
        ("value", Value::Int(1)),
        (
            "children",
            Value::List(vec![Value::object([("value", Value::Int(2))])]),
        ),
        ("next", Value::object([("value", Value::Int(3))])),
    ]);

    let wire = run(&model, "watch", "encode_watch_response", tree, vec![]);
    let back = run(&model, "watch", "decode_watch_response", wire, vec![]);
    assert_eq!(back.get("value"), &Value::Int(1));
    assert_eq!(back.get("next").get("value"), &Value::Int(3));
    match back.get("children") {
        Value::List(items) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].get("value"), &Value::Int(2));
        }
        other => panic!("expected children, got {:?}", other),
    }
}

#[test]
fn test_union_stream_item_round_trip() {
    let model = compile();
    let shape = Value::variant("Circle", Value::Float(2.5));

    let wire = run(&model, "upload", "encode_upload_streaming_request", shape.clone(), vec![]);
    assert_eq!(wire.get("field"), &shape);

    let back = run(&model, "upload", "decode_upload_streaming_request", wire, vec![]);
    assert_eq!(back, shape);
}

#[test]
fn test_view_drops_attributes() {
    let model = compile();
    let order = Value::object([
        ("id", Value::str("o-1")),
        ("status", Value::str("shipped")),
        ("total", Value::Float(9.5)),
    ]);

    let tiny = run(&model, "create", "encode_create_response_tiny", order.clone(), vec![]);
    assert_eq!(tiny.get("id"), &Value::str("o-1"));
    assert_eq!(tiny.get("status"), &Value::str("shipped"));
    assert!(tiny.get("total").is_null());

    let full = run(&model, "create", "encode_create_response", order, vec![]);
    assert_eq!(full.get("total"), &Value::Float(9.5));
}

#[test]
fn test_union_object_variant_round_trip() {
    let model = compile();
    let shape = Value::variant(
        "Point",
        Value::object([("x", Value::Int(3)), ("y", Value::Int(4))]),
    );

    let wire = run(&model, "upload", "encode_upload_streaming_request", shape, vec![]);
    let back = run(&model, "upload", "decode_upload_streaming_request", wire, vec![]);
    match back {
        Value::Variant(name, payload) => {
            assert_eq!(name, "Point");
            assert_eq!(payload.get("x"), &Value::Int(3));
            assert_eq!(payload.get("y"), &Value::Int(4));
        }
        other => panic!("expected the point variant, got {:?}", other),
    }
}

#[test]
fn test_named_tree_round_trip() {
    let model = compile_scenarios(&CodegenConfig::default());
    let tree = Value::object([
        ("label", Value::str("oak")),
        (
            "opt_u",
            Value::variant("Point", Value::object([("x", Value::Int(1)), ("y", Value::Int(2))])),
        ),
        (
            "points",
            Value::List(vec![
                Value::object([("x", Value::Int(5)), ("y", Value::Int(6))]),
                Value::object([("x", Value::Int(7)), ("y", Value::Int(8))]),
            ]),
        ),
    ]);

    let wire = run(&model, "plant", "encode_plant_request", tree, vec![]);
    let back = run(&model, "plant", "decode_plant_request", wire, vec![]);
    assert_eq!(back.get("label"), &Value::str("oak"));
    match back.get("opt_u") {
        Value::Variant(name, payload) => {
            assert_eq!(name, "Point");
            assert_eq!(payload.get("y"), &Value::Int(2));
        }
        other => panic!("expected the point variant, got {:?}", other),
    }
    match back.get("points") {
        Value::List(items) => {
            let xs: Vec<&Value> = items.iter().map(|p| p.get("x")).collect();
            assert_eq!(xs, vec![&Value::Int(5), &Value::Int(7)]);
        }
        other => panic!("expected points, got {:?}", other),
    }
}

#[test]
fn test_http_absent_field_takes_default() {
    let model = compile_scenarios(&CodegenConfig::http());
    let wire = Value::object([("required_string", Value::str("x"))]);

    let payload = run(&model, "defaults", "decode_defaults_request", wire, vec![]);
    assert_eq!(payload.get("required_string"), &Value::str("x"));
    assert_eq!(payload.get("optional_int"), &Value::Int(1));
}

#[test]
fn test_string_array_keeps_order() {
    let model = compile_scenarios(&CodegenConfig::default());
    let names = Value::List(vec![Value::str("c"), Value::str("a"), Value::str("b")]);
    let payload = Value::object([("names", names.clone()), ("counts", Value::Map(Vec::new()))]);

    let wire = run(&model, "tally", "encode_tally_request", payload, vec![]);
    assert_eq!(wire.get("names"), &names);
    let back = run(&model, "tally", "decode_tally_request", wire, vec![]);
    assert_eq!(back.get("names"), &names);
}

#[test]
fn test_int_map_keys_are_cast() {
    let model = compile_scenarios(&CodegenConfig::default());
    let counts = Value::Map(vec![
        (Value::Int(4_294_967_297), Value::str("wide")),
        (Value::Int(-3), Value::str("negative")),
    ]);
    let payload = Value::object([("names", Value::List(Vec::new())), ("counts", counts)]);

    let wire = run(&model, "tally", "encode_tally_request", payload, vec![]);
    assert_eq!(
        wire.get("counts"),
        &Value::Map(vec![
            (Value::Int(1), Value::str("wide")),
            (Value::Int(-3), Value::str("negative")),
        ])
    );

    let encode = model.endpoint("tally").unwrap().plan("encode_tally_request").unwrap();
    let mut key_casts = Vec::new();
    fragment::walk(&encode.init.body, &mut |stmt| {
        if let Stmt::ForEachEntry { body, .. } = stmt {
            for inner in body {
                if let Stmt::Let { value: Expr::Convert { from, to, .. }, .. } = inner {
                    key_casts.push((*from, *to));
                }
            }
        }
    });
    assert_eq!(key_casts, vec![(Scalar::I64, Scalar::I32)]);
}
