use stubgen_schema::analysis::{reachable_types, recursive_types};
use stubgen_schema::parse::{load_schema, parse_schema_file};
use stubgen_schema::{
    search_schema, GrpcCode, KeyLocation, Kind, SchemaSection, SchemeKind, StreamKind,
};

fn fixture_path(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

#[test]
fn test_library_fixture_links() {
    let schema = load_schema(fixture_path("library.json")).expect("fixture should link");
    assert_eq!(schema.name, "library");
    assert_eq!(schema.version.as_deref(), Some("2.1.0"));
    assert_eq!(schema.type_count(), 3);

    let book = schema.get(schema.lookup("Book").unwrap());
    assert!(book.view("summary").is_some());
    let isbn = book.node.field("isbn").unwrap();
    assert!(matches!(isbn.node.kind, Kind::Named(_)));
    assert_eq!(schema.describe(&isbn.node), "Isbn");

    let service = schema.service("catalog").unwrap();
    let lookup = service.method("lookup").unwrap();
    assert_eq!(lookup.errors[0].contract.grpc_code, Some(GrpcCode::NotFound));
    assert_eq!(lookup.errors[0].contract.http_status, Some(404));
    assert_eq!(service.method("shelve").unwrap().stream, StreamKind::Client);

    let api = schema.scheme("api").unwrap();
    assert_eq!(api.kind, SchemeKind::ApiKey);
    assert_eq!(api.location, KeyLocation::Query);
    assert_eq!(api.key, "api_key");
}

#[test]
fn test_library_recursion_and_reach() {
    let schema = load_schema(fixture_path("library.json")).unwrap();
    let book = schema.lookup("Book").unwrap();
    let shelf = schema.lookup("Shelf").unwrap();

    let recursive = recursive_types(&schema);
    assert!(recursive.contains(&book));
    assert!(!recursive.contains(&shelf));

    let shelf_node = stubgen_schema::AttributeNode::named(shelf);
    let reached = reachable_types(&schema, &shelf_node);
    assert!(reached.contains(&book));
}

#[test]
fn test_fingerprint_ignores_formatting() {
    let path = fixture_path("library.json");
    let spec = parse_schema_file(&path).unwrap();
    let compact = serde_json::to_string(&spec).unwrap();
    let reparsed = stubgen_schema::parse::parse_schema_content(&compact).unwrap();
    assert_eq!(
        stubgen_schema::fingerprint::fingerprint(&spec),
        stubgen_schema::fingerprint::fingerprint(&reparsed)
    );
    assert_eq!(load_schema(&path).unwrap().fingerprint.len(), 64);
}

#[test]
fn test_search_finds_methods_and_errors() {
    let spec = parse_schema_file(fixture_path("library.json")).unwrap();
    let results = search_schema(&spec, "miss");
    assert!(results
        .iter()
        .any(|r| r.name == "missing" && r.section == SchemaSection::Error));
    let results = search_schema(&spec, "lookup");
    assert_eq!(results[0].owner.as_deref(), Some("catalog"));
}
