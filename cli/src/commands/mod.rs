pub mod check;
pub mod config;
pub mod gen;
pub mod inspect;
pub mod search;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use stubgen_codegen::{CodegenConfig, Protocol};
use stubgen_schema::parse::parse_schema_file;
use stubgen_schema::types::SchemaSpec;
use stubgen_schema::{link, suggest_similar, Schema};

use crate::config::{output_file_name, StubgenConfig};

/// A schema document loaded for a command, with the config that named it.
pub struct Project {
    pub config: Option<StubgenConfig>,
    pub schema_path: PathBuf,
    pub spec: SchemaSpec,
    pub schema: Schema,
}

impl Project {
    /// Loads the schema named by `schema`, or by the config file when no
    /// override is given.
    pub fn load(config_path: &str, schema: Option<&str>) -> Result<Self> {
        let config = StubgenConfig::load_optional(config_path)?;
        let schema_path = match (schema, &config) {
            (Some(path), _) => PathBuf::from(path),
            (None, Some(config)) => config.schema_path(Path::new(config_path)),
            (None, None) => anyhow::bail!(
                "No schema given and no {} found. Pass --schema or run `stubgen init`.",
                config_path
            ),
        };

        let spec = parse_schema_file(&schema_path)
            .with_context(|| format!("Failed to read schema: {}", schema_path.display()))?;
        let schema = link(&spec)
            .with_context(|| format!("Failed to link schema: {}", schema_path.display()))?;
        tracing::debug!(
            path = %schema_path.display(),
            types = schema.type_count(),
            services = schema.services.len(),
            "loaded schema"
        );

        Ok(Self {
            config,
            schema_path,
            spec,
            schema,
        })
    }

    /// Services to compile: `only` if given, else the config filters, else
    /// every service in the schema.
    pub fn service_names(&self, only: Option<&str>) -> Result<Vec<String>> {
        let names: Vec<String> = match (only, &self.config) {
            (Some(name), _) => vec![name.to_string()],
            (None, Some(config)) if !config.services.is_empty() => {
                config.services.iter().map(|s| s.name.clone()).collect()
            }
            _ => self.schema.services.iter().map(|s| s.name.clone()).collect(),
        };

        let known: Vec<&str> = self.schema.services.iter().map(|s| s.name.as_str()).collect();
        for name in &names {
            if !known.contains(&name.as_str()) {
                let hint = suggest_similar(name, &known, 3)
                    .first()
                    .map(|s| format!(". Did you mean: {}?", s.candidate))
                    .unwrap_or_default();
                anyhow::bail!("Unknown service '{}'{}", name, hint);
            }
        }
        Ok(names)
    }

    pub fn codegen_for(&self, service: &str, protocol: Option<&str>) -> Result<CodegenConfig> {
        let mut options = match &self.config {
            Some(config) => config.codegen_for(service),
            None => CodegenConfig::default(),
        };
        if let Some(protocol) = protocol {
            options.protocol = parse_protocol(protocol)?;
            if self.config.is_none() && options.protocol == Protocol::Http {
                options.wire_namespace = CodegenConfig::http().wire_namespace;
            }
        }
        Ok(options)
    }

    pub fn output_path(&self, service: &str, out: Option<&str>) -> PathBuf {
        match (out, &self.config) {
            (Some(dir), _) => Path::new(dir).join(output_file_name(service)),
            (None, Some(config)) => config.output_path(service),
            (None, None) => Path::new("generated").join(output_file_name(service)),
        }
    }

    pub fn format_output(&self) -> bool {
        self.config.as_ref().map_or(true, |c| c.codegen.format)
    }
}

pub fn parse_protocol(name: &str) -> Result<Protocol> {
    match name {
        "grpc" => Ok(Protocol::Grpc),
        "http" => Ok(Protocol::Http),
        other => anyhow::bail!("Unknown protocol '{}': expected grpc or http", other),
    }
}
