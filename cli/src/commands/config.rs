use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use stubgen_schema::parse::parse_schema_file;

use crate::config::{OutputConfig, ProjectConfig, ServiceConfig, StubgenConfig};
use crate::ui;

pub fn init(config_path: &str, schema: &str, name: Option<String>) -> Result<()> {
    let path = Path::new(config_path);

    if path.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}\nUse a different path or remove the existing file.",
            path.display()
        );
    }

    ui::print_step("Initializing stubgen project...\n");

    // Services are listed only when the schema is already readable.
    let services: Vec<ServiceConfig> = match parse_schema_file(Path::new(schema)) {
        Ok(spec) => {
            ui::print_success(&format!(
                "Found {} service(s) in {}",
                spec.services.len(),
                schema
            ));
            spec.services
                .iter()
                .map(|s| {
                    ui::print_item(2, &s.name);
                    ServiceConfig {
                        name: s.name.clone(),
                        output_file: None,
                        protocol: None,
                    }
                })
                .collect()
        }
        Err(err) => {
            tracing::debug!(error = %err, schema, "schema not readable during init");
            ui::print_warning(&format!("Schema {} not readable yet", schema));
            Vec::new()
        }
    };
    println!();

    let project_name = match name {
        Some(name) => name,
        None => prompt_project_name()?,
    };

    let config = StubgenConfig {
        project: ProjectConfig {
            name: project_name,
            schema: schema.to_string(),
        },
        codegen: OutputConfig::default(),
        services,
    };
    config.validate()?;

    let config_toml = toml::to_string_pretty(&config)?;
    fs::write(path, &config_toml)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;

    ui::print_success(&format!("Created {}", path.display()));
    println!();
    println!("{}", "Next steps:".bold());
    println!("  {} to verify the schema compiles", "stubgen check".cyan());
    println!("  {} to write the generated modules", "stubgen gen".cyan());

    Ok(())
}

fn prompt_project_name() -> Result<String> {
    let default_name = std::env::current_dir()
        .ok()
        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .unwrap_or_else(|| "my-project".to_string());

    print!("Project name [{}]: ", default_name.dimmed());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    if input.is_empty() {
        Ok(default_name)
    } else {
        Ok(input.to_string())
    }
}

pub fn validate(config_path: &str) -> Result<()> {
    ui::print_step("Validating configuration...");

    let config = StubgenConfig::load(config_path)
        .context("Failed to load configuration. Run `stubgen init` to create a configuration file.")?;

    ui::print_success("Configuration is valid!");
    println!();
    println!("  Project: {}", config.project.name.bold());
    println!("  Schema: {}", config.project.schema);
    println!("  Output: {}", config.codegen.output_dir);
    println!("  Protocol: {:?}", config.codegen.options.protocol);
    println!();

    let schema_path = config.schema_path(Path::new(config_path));
    if !schema_path.exists() {
        ui::print_warning(&format!("Schema not found: {}", schema_path.display()));
    }

    if config.services.is_empty() {
        ui::print_info("No services listed; every service in the schema is generated");
    } else {
        println!("  {} Services ({}):", ui::symbols::BULLET.dimmed(), config.services.len());
        for service in &config.services {
            let target = config.output_path(&service.name);
            ui::print_item(2, &format!("{} -> {}", service.name.bold(), target.display()));
        }
    }

    Ok(())
}
