use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use stubgen_schema::analysis::recursive_types;
use stubgen_schema::{Method, StreamKind};

use super::Project;
use crate::ui::{self, symbols};

#[derive(Serialize)]
struct TypeSummary {
    name: String,
    kind: String,
    recursive: bool,
    views: Vec<String>,
}

#[derive(Serialize)]
struct MethodSummary {
    name: String,
    stream: StreamKind,
    payload: Option<String>,
    result: Option<String>,
    errors: Vec<String>,
    metadata: usize,
    security: Vec<String>,
}

#[derive(Serialize)]
struct ServiceSummary {
    name: String,
    methods: Vec<MethodSummary>,
}

#[derive(Serialize)]
struct SchemaSummary {
    name: String,
    version: Option<String>,
    fingerprint: String,
    types: Vec<TypeSummary>,
    services: Vec<ServiceSummary>,
}

pub fn inspect(config_path: &str, schema: Option<&str>, json: bool) -> Result<()> {
    let project = Project::load(config_path, schema)?;
    let schema = &project.schema;
    let recursive = recursive_types(schema);

    let summary = SchemaSummary {
        name: schema.name.clone(),
        version: schema.version.clone(),
        fingerprint: schema.fingerprint.clone(),
        types: schema
            .types()
            .map(|(id, named)| TypeSummary {
                name: named.name.clone(),
                kind: schema.describe(&named.node),
                recursive: recursive.contains(&id),
                views: named.views.iter().map(|v| v.name.clone()).collect(),
            })
            .collect(),
        services: schema
            .services
            .iter()
            .map(|service| ServiceSummary {
                name: service.name.clone(),
                methods: service.methods.iter().map(|m| summarize(&project, m)).collect(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let title = match &summary.version {
        Some(version) => format!("{} v{}", summary.name, version),
        None => summary.name.clone(),
    };
    ui::print_step(&title.bold().to_string());
    ui::print_info(&format!("fingerprint {}", summary.fingerprint));

    ui::print_section(&format!("Types ({})", summary.types.len()));
    for ty in &summary.types {
        let mut line = format!("{} {}", ty.name.bold(), ty.kind.dimmed());
        if ty.recursive {
            line.push_str(&format!(" {}", symbols::CYCLE.yellow()));
        }
        if !ty.views.is_empty() {
            line.push_str(&format!(" views: {}", ty.views.join(", ")));
        }
        ui::print_item(1, &line);
    }

    for service in &summary.services {
        ui::print_section(&format!("Service {} ({} methods)", service.name, service.methods.len()));
        for method in &service.methods {
            let stream = match method.stream {
                StreamKind::None => String::new(),
                kind => format!(" [{:?} stream]", kind).to_lowercase(),
            };
            ui::print_item(
                1,
                &format!(
                    "{}({}) -> {}{}",
                    method.name.bold(),
                    method.payload.as_deref().unwrap_or(""),
                    method.result.as_deref().unwrap_or("()"),
                    stream.cyan()
                ),
            );
            if !method.errors.is_empty() {
                ui::print_info(&format!("errors: {}", method.errors.join(", ")));
            }
            if !method.security.is_empty() {
                ui::print_info(&format!("security: {}", method.security.join(", ")));
            }
            if method.metadata > 0 {
                ui::print_info(&format!("{} metadata mapping(s)", method.metadata));
            }
        }
    }
    Ok(())
}

fn summarize(project: &Project, method: &Method) -> MethodSummary {
    let describe = |node: &Option<stubgen_schema::AttributeNode>| {
        node.as_ref().map(|n| project.schema.describe(n))
    };
    MethodSummary {
        name: method.name.clone(),
        stream: method.stream,
        payload: describe(&method.payload),
        result: describe(&method.result),
        errors: method.errors.iter().map(|e| e.name.clone()).collect(),
        metadata: method.metadata.len() + method.response_metadata.len(),
        security: method.security.iter().map(|s| s.scheme.clone()).collect(),
    }
}
