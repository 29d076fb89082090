//! Schema document and attribute type model for stubgen
//!
//! This crate parses a service schema document, links type references into
//! an arena of named types and exposes the [`AttributeNode`] tree and
//! [`RepresentationContext`] policies the code generator consumes.

pub mod analysis;
pub mod attribute;
pub mod context;
pub mod error;
pub mod fingerprint;
pub mod link;
pub mod parse;
pub mod schema;
pub mod search;
pub mod types;
pub mod utils;

pub use attribute::*;
pub use context::*;
pub use error::*;
pub use link::link;
pub use schema::*;
pub use search::*;
