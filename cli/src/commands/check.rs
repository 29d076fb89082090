use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use stubgen_codegen::{compile_service, CompileError};

use super::Project;
use crate::ui;

#[derive(Serialize)]
struct ServiceReport {
    service: String,
    endpoints: usize,
    plans: usize,
    helpers: usize,
    validators: usize,
    types: usize,
}

pub fn check(config_path: &str, schema: Option<&str>, only: Option<&str>, json: bool) -> Result<()> {
    let project = Project::load(config_path, schema)?;
    let services = project.service_names(only)?;

    if !json {
        ui::print_step(&format!("Checking {}...", project.schema_path.display()));
    }

    let mut reports = Vec::with_capacity(services.len());
    for service in &services {
        let codegen = project.codegen_for(service, None)?;
        match compile_service(&project.schema, service, &codegen) {
            Ok(model) => reports.push(ServiceReport {
                service: service.clone(),
                endpoints: model.endpoints.len(),
                plans: model.plan_count(),
                helpers: model.registry.len(),
                validators: model.validators.len(),
                types: model.catalog.len(),
            }),
            Err(err) => {
                if !json {
                    ui::print_error(&format!("{}: {}", service.bold(), err));
                    if let CompileError::SchemaIncompatibility { path, .. } = &err {
                        ui::print_info(&format!("at {}", path));
                    }
                }
                anyhow::bail!("service '{}' does not compile: {}", service, err);
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    for report in &reports {
        ui::print_success(&format!(
            "{}: {} endpoints, {} plans, {} helpers, {} validators, {} types",
            report.service.bold(),
            report.endpoints,
            report.plans,
            report.helpers,
            report.validators,
            report.types
        ));
    }
    Ok(())
}
