use std::collections::BTreeSet;

use stubgen_codegen::fragment::{self, Expr, Stmt};
use stubgen_codegen::plan::ConversionPlan;
use stubgen_codegen::{compile_service, CodegenConfig, ServiceModel};
use stubgen_schema::parse::load_schema;
use stubgen_schema::{RustType, TypePath};

fn compile(fixture: &str, service: &str, config: &CodegenConfig) -> ServiceModel {
    let path = format!("{}/tests/fixtures/{}.json", env!("CARGO_MANIFEST_DIR"), fixture);
    let schema = load_schema(path).expect("fixture should load");
    compile_service(&schema, service, config).expect("service should compile")
}

fn type_paths(ty: &RustType, out: &mut BTreeSet<TypePath>) {
    match ty {
        RustType::Scalar(_) => {}
        RustType::Path(path) => {
            out.insert(path.clone());
        }
        RustType::Vec(inner) | RustType::Option(inner) | RustType::Boxed(inner) => type_paths(inner, out),
        RustType::Map(key, value) => {
            type_paths(key, out);
            type_paths(value, out);
        }
    }
}

fn expr_paths(expr: &Expr, out: &mut BTreeSet<TypePath>) {
    match expr {
        Expr::DefaultOf(ty) => type_paths(ty, out),
        Expr::Struct { ty, fields } => {
            out.insert(ty.clone());
            for (_, value) in fields {
                expr_paths(value, out);
            }
        }
        Expr::Variant { ty, payload, .. } => {
            out.insert(ty.clone());
            expr_paths(payload, out);
        }
        Expr::Field(inner, _)
        | Expr::Cloned(inner)
        | Expr::Some(inner)
        | Expr::Boxed(inner)
        | Expr::VecWithCapacity(inner)
        | Expr::MapWithCapacity(inner) => expr_paths(inner, out),
        Expr::Convert { value, .. } => expr_paths(value, out),
        Expr::Call { arg, .. } => expr_paths(arg, out),
        Expr::Local(_) | Expr::Bound(_) | Expr::Literal { .. } => {}
    }
}

/// Every type path a plan names: its signature and the types its body
/// builds or matches on.
fn plan_paths(plan: &ConversionPlan) -> BTreeSet<TypePath> {
    let mut out = BTreeSet::new();
    type_paths(&plan.source_type, &mut out);
    type_paths(&plan.target_type, &mut out);
    type_paths(&plan.init.returns, &mut out);
    for param in &plan.init.params {
        type_paths(&param.ty, &mut out);
    }
    fragment::walk(&plan.init.body, &mut |stmt| match stmt {
        Stmt::Let { value, .. } | Stmt::Return(value) => expr_paths(value, &mut out),
        Stmt::Assign { place, value } | Stmt::Push { target: place, value } => {
            expr_paths(place, &mut out);
            expr_paths(value, &mut out);
        }
        Stmt::Insert { target, key, value } => {
            expr_paths(target, &mut out);
            expr_paths(key, &mut out);
            expr_paths(value, &mut out);
        }
        Stmt::IfSome { value, .. } | Stmt::IfNone { value, .. } | Stmt::IfZero { value, .. } => {
            expr_paths(value, &mut out)
        }
        Stmt::ForEach { source, .. } | Stmt::ForEachEntry { source, .. } => expr_paths(source, &mut out),
        Stmt::Match { value, arms } => {
            expr_paths(value, &mut out);
            for arm in arms {
                out.insert(arm.ty.clone());
            }
        }
        Stmt::Declare(_) => {}
    });
    out
}

fn assert_plans_name_declared_types(model: &ServiceModel) {
    let declared: BTreeSet<TypePath> = model.catalog.iter().map(|def| def.path.clone()).collect();
    let plans = model
        .endpoints
        .iter()
        .flat_map(|e| e.plans.iter())
        .chain(model.helpers());
    for plan in plans {
        for path in plan_paths(plan) {
            assert!(
                declared.contains(&path),
                "{} names undeclared type {}; declared: {:?}",
                plan.name(),
                path,
                declared.iter().map(|p| p.to_string()).collect::<Vec<_>>()
            );
        }
    }
}

#[test]
fn test_orders_plans_name_declared_types() {
    assert_plans_name_declared_types(&compile("orders", "orders", &CodegenConfig::default()));
    assert_plans_name_declared_types(&compile("orders", "orders", &CodegenConfig::http()));
}

#[test]
fn test_scenario_plans_name_declared_types() {
    assert_plans_name_declared_types(&compile("scenarios", "scenarios", &CodegenConfig::default()));
    assert_plans_name_declared_types(&compile("scenarios", "scenarios", &CodegenConfig::http()));
}

#[test]
fn test_anonymous_types_under_named_types_take_the_type_name() {
    let model = compile("scenarios", "scenarios", &CodegenConfig::default());
    let declared: BTreeSet<String> = model
        .catalog
        .iter()
        .filter(|def| def.context == "service")
        .map(|def| def.path.to_string())
        .collect();
    for expected in ["Tree", "TreeOptU", "TreeOptUPoint", "PointsItem"] {
        assert!(declared.contains(expected), "missing {} in {:?}", expected, declared);
    }
    assert!(
        !declared.iter().any(|name| name.starts_with("PlantPayload") || name.starts_with("PlantResult")),
        "{:?}",
        declared
    );

    let decode = model.endpoint("plant").unwrap().plan("decode_plant_request").unwrap();
    let paths: BTreeSet<String> = plan_paths(decode).iter().map(|p| p.to_string()).collect();
    assert!(paths.contains("Tree"), "{:?}", paths);
    assert!(paths.contains("TreeOptU"), "{:?}", paths);
}
