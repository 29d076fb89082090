//! Error types for schema loading and linking

use crate::search::Suggestion;

#[derive(Debug, Clone)]
pub enum SchemaError {
    Parse {
        path: String,
        source: String,
    },
    Duplicate {
        section: &'static str,
        name: String,
    },
    UnknownType {
        name: String,
        context: String,
        suggestions: Vec<Suggestion>,
    },
    UnknownScheme {
        name: String,
        method: String,
        suggestions: Vec<Suggestion>,
    },
    UnknownAttribute {
        attribute: String,
        method: String,
        suggestions: Vec<Suggestion>,
    },
    InvalidView {
        type_name: String,
        view: String,
        attribute: String,
    },
    InvalidGrpcCode {
        code: String,
        context: String,
    },
    /// A cycle of named types that never crosses an object or union.
    UnboundedCycle {
        cycle: Vec<String>,
    },
}

fn write_suggestion(f: &mut std::fmt::Formatter<'_>, suggestions: &[Suggestion]) -> std::fmt::Result {
    if let Some(first) = suggestions.first() {
        write!(f, ". Did you mean: {}?", first.candidate)?;
    }
    Ok(())
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::Parse { path, source } => write!(f, "Parse error in {}: {}", path, source),
            SchemaError::Duplicate { section, name } => {
                write!(f, "Duplicate {} '{}'", section, name)
            }
            SchemaError::UnknownType {
                name,
                context,
                suggestions,
            } => {
                write!(f, "Unknown type '{}' in {}", name, context)?;
                write_suggestion(f, suggestions)
            }
            SchemaError::UnknownScheme {
                name,
                method,
                suggestions,
            } => {
                write!(f, "Unknown security scheme '{}' in method {}", name, method)?;
                write_suggestion(f, suggestions)
            }
            SchemaError::UnknownAttribute {
                attribute,
                method,
                suggestions,
            } => {
                write!(
                    f,
                    "Attribute '{}' is not a payload field of method {}",
                    attribute, method
                )?;
                write_suggestion(f, suggestions)
            }
            SchemaError::InvalidView {
                type_name,
                view,
                attribute,
            } => write!(
                f,
                "View '{}' of {} lists unknown attribute '{}'",
                view, type_name, attribute
            ),
            SchemaError::InvalidGrpcCode { code, context } => {
                write!(f, "Invalid gRPC code '{}' in {}", code, context)
            }
            SchemaError::UnboundedCycle { cycle } => write!(
                f,
                "Type cycle without an object or union boundary: {}",
                cycle.join(" -> ")
            ),
        }
    }
}

impl std::error::Error for SchemaError {}
