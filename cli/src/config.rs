use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use stubgen_codegen::{CodegenConfig, Protocol};

/// Main configuration structure for stubgen.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StubgenConfig {
    pub project: ProjectConfig,

    #[serde(default)]
    pub codegen: OutputConfig,

    /// When non-empty, only these services are generated.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,

    /// Schema document, relative to the config file
    pub schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Run rustfmt over generated files (default: true)
    #[serde(default = "default_format")]
    pub format: bool,

    #[serde(flatten)]
    pub options: CodegenConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: default_format(),
            options: CodegenConfig::default(),
        }
    }
}

fn default_output_dir() -> String {
    "./generated".to_string()
}

fn default_format() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,

    /// Overrides `codegen.protocol` for this service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl StubgenConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: StubgenConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Try to load config, returning None if file doesn't exist
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    pub fn validate(&self) -> Result<()> {
        if self.project.name.trim().is_empty() {
            anyhow::bail!("Project name cannot be empty");
        }
        if self.project.schema.trim().is_empty() {
            anyhow::bail!("Project schema path cannot be empty");
        }
        if self.codegen.output_dir.trim().is_empty() {
            anyhow::bail!("codegen.output_dir cannot be empty");
        }
        if self.codegen.options.support_path.trim().is_empty() {
            anyhow::bail!("codegen.support_path cannot be empty");
        }
        if self.codegen.options.wire_namespace.trim().is_empty() {
            anyhow::bail!("codegen.wire_namespace cannot be empty");
        }

        let mut names = HashSet::new();
        for service in &self.services {
            if service.name.trim().is_empty() {
                anyhow::bail!("Service name cannot be empty");
            }
            if !names.insert(service.name.as_str()) {
                anyhow::bail!("Duplicate service name: {}", service.name);
            }
        }

        Ok(())
    }

    pub fn find_service(&self, name: &str) -> Option<&ServiceConfig> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Schema path resolved against the directory holding the config file.
    pub fn schema_path(&self, config_path: &Path) -> PathBuf {
        let schema = Path::new(&self.project.schema);
        match config_path.parent() {
            Some(dir) if schema.is_relative() => dir.join(schema),
            _ => schema.to_path_buf(),
        }
    }

    /// Codegen options for one service, with its overrides applied.
    pub fn codegen_for(&self, service: &str) -> CodegenConfig {
        let mut options = self.codegen.options.clone();
        if let Some(protocol) = self.find_service(service).and_then(|s| s.protocol) {
            options.protocol = protocol;
        }
        options
    }

    pub fn output_path(&self, service: &str) -> PathBuf {
        match self.find_service(service).and_then(|s| s.output_file.as_ref()) {
            Some(file) => PathBuf::from(file),
            None => Path::new(&self.codegen.output_dir).join(output_file_name(service)),
        }
    }
}

/// `<service>.rs` with the name in snake case.
pub fn output_file_name(service: &str) -> String {
    format!("{}.rs", stubgen_schema::utils::to_snake_case(service))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [project]
        name = "shop"
        schema = "schema/orders.json"

        [codegen]
        output_dir = "src/generated"
        protocol = "grpc"
        wire_namespace = "wire"

        [[services]]
        name = "orders"
        protocol = "http"

        [[services]]
        name = "billing"
        output_file = "src/billing_glue.rs"
    "#;

    #[test]
    fn test_parse_and_overrides() {
        let config: StubgenConfig = toml::from_str(CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.codegen.options.wire_namespace, "wire");
        assert_eq!(config.codegen.options.view_key, "stubgen-view");
        assert!(config.codegen.format);
        assert_eq!(config.codegen_for("orders").protocol, Protocol::Http);
        assert_eq!(config.codegen_for("billing").protocol, Protocol::Grpc);
        assert_eq!(
            config.output_path("orders"),
            Path::new("src/generated").join("orders.rs")
        );
        assert_eq!(config.output_path("billing"), PathBuf::from("src/billing_glue.rs"));
        assert_eq!(
            config.schema_path(Path::new("proj/stubgen.toml")),
            Path::new("proj").join("schema/orders.json")
        );
    }

    #[test]
    fn test_duplicate_service_rejected() {
        let text = r#"
            [project]
            name = "shop"
            schema = "s.json"

            [[services]]
            name = "orders"

            [[services]]
            name = "orders"
        "#;
        let config: StubgenConfig = toml::from_str(text).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate service name"));
    }

    #[test]
    fn test_empty_project_name_rejected() {
        let text = r#"
            [project]
            name = ""
            schema = "s.json"
        "#;
        let config: StubgenConfig = toml::from_str(text).unwrap();
        assert!(config.validate().is_err());
    }
}
