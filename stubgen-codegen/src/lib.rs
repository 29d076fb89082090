//! Attribute transformation compiler for stubgen
//!
//! Given a linked [`stubgen_schema::Schema`], this crate builds the
//! conversion plans between the service-facing and wire-facing
//! representations of every payload, result, error and stream item, plus
//! the endpoint glue around them, and lowers it all to Rust source.

pub mod catalog;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod eval;
pub mod fragment;
pub mod generator;
pub mod lower;
pub mod metadata;
pub mod plan;
pub mod protocol;
pub mod registry;
pub mod resolver;
pub mod scope;
pub mod service;
pub mod support;
pub mod validation;

pub use config::CodegenConfig;
pub use endpoint::{EndpointModel, ErrorDispatch};
pub use error::{CompileError, FieldPath, Result};
pub use plan::{ConversionPlan, Direction};
pub use protocol::{Protocol, Status};
pub use registry::HelperRegistry;
pub use service::{compile_service, ServiceModel};
