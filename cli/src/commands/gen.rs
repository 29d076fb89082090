use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::Path;
use std::process::Command;
use stubgen_codegen::{compile_service, ServiceModel};
use stubgen_schema::fingerprint::short_digest;

use super::Project;
use crate::ui;

pub struct GenOptions<'a> {
    pub schema: Option<&'a str>,
    pub service: Option<&'a str>,
    pub out: Option<&'a str>,
    pub protocol: Option<&'a str>,
}

pub fn generate(config_path: &str, options: GenOptions<'_>, json: bool) -> Result<()> {
    let project = Project::load(config_path, options.schema)?;
    let services = project.service_names(options.service)?;

    if !json {
        ui::print_step(&format!(
            "Generating {} service(s) from {}",
            services.len(),
            project.schema_path.display()
        ));
    }

    let mut written = Vec::new();
    for service in &services {
        let codegen = project.codegen_for(service, options.protocol)?;
        let spinner = (!json).then(|| ui::create_spinner(&format!("Compiling {}...", service)));

        let model = compile_service(&project.schema, service, &codegen)
            .with_context(|| format!("Failed to compile service '{}'", service))?;
        let source = render(&project, &model)?;

        let path = project.output_path(service, options.out);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&path, source)
            .with_context(|| format!("Failed to write {}", path.display()))?;

        let formatted = project.format_output() && rustfmt(&path);
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        if !json {
            ui::print_success(&format!(
                "{} → {} ({} endpoints, {} helpers, {} types)",
                service.bold(),
                path.display(),
                model.endpoints.len(),
                model.registry.len(),
                model.catalog.len()
            ));
            if project.format_output() && !formatted {
                ui::print_warning("rustfmt unavailable; output left unformatted");
            }
        }
        written.push(serde_json::json!({
            "service": service,
            "path": path.display().to_string(),
            "protocol": codegen.protocol,
            "endpoints": model.endpoints.len(),
            "plans": model.plan_count(),
            "helpers": model.registry.len(),
            "types": model.catalog.len(),
            "formatted": formatted,
        }));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&written)?);
    }
    Ok(())
}

fn render(project: &Project, model: &ServiceModel) -> Result<String> {
    let tokens = model.to_tokens()?;
    Ok(format!(
        "// Generated by stubgen from {} (schema {}, digest {}). Do not edit.\n\
         #![allow(clippy::all, dead_code, unused_mut, unused_variables)]\n\n{}\n",
        project.schema_path.display(),
        project.schema.name,
        short_digest(&model.fingerprint),
        tokens
    ))
}

/// Formats `path` in place; false when rustfmt is missing or fails.
fn rustfmt(path: &Path) -> bool {
    match Command::new("rustfmt").arg("--edition").arg("2021").arg(path).status() {
        Ok(status) if status.success() => true,
        Ok(status) => {
            tracing::warn!(path = %path.display(), %status, "rustfmt failed");
            false
        }
        Err(err) => {
            tracing::debug!(error = %err, "rustfmt not run");
            false
        }
    }
}
