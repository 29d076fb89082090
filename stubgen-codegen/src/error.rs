use std::fmt;

use thiserror::Error;

/// Location of an attribute inside a type tree, e.g. `payload.items[*].street`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn field(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn elem(&self) -> Self {
        Self(format!("{}[*]", self.0))
    }

    pub fn key(&self) -> Self {
        Self(format!("{}{{key}}", self.0))
    }

    pub fn value(&self) -> Self {
        Self(format!("{}{{value}}", self.0))
    }

    pub fn variant(&self, name: &str) -> Self {
        Self(format!("{}<{}>", self.0, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("incompatible types at {path}: {reason}")]
    SchemaIncompatibility { path: FieldPath, reason: String },

    #[error("unsupported metadata field '{attribute}' in {method}: {reason}")]
    UnsupportedMetadata {
        method: String,
        attribute: String,
        reason: String,
    },

    #[error("unknown security scheme '{0}'")]
    UnknownScheme(String),

    #[error("unknown view '{view}' on {type_name}")]
    UnknownView { type_name: String, view: String },

    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("generator invariant violated: {0}")]
    Invariant(String),
}

impl CompileError {
    pub fn incompatible(path: &FieldPath, reason: impl Into<String>) -> Self {
        CompileError::SchemaIncompatibility {
            path: path.clone(),
            reason: reason.into(),
        }
    }

    /// Path of the mismatch for incompatibility errors.
    pub fn path(&self) -> Option<&FieldPath> {
        match self {
            CompileError::SchemaIncompatibility { path, .. } => Some(path),
            _ => None,
        }
    }
}

pub type Result<T, E = CompileError> = std::result::Result<T, E>;
