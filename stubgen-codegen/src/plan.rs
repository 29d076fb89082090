//! Conversion plans

use std::fmt;

use serde::{Deserialize, Serialize};
use stubgen_schema::RustType;

use crate::fragment::Stmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Service type to wire type.
    Encode,
    /// Wire type to service type.
    Decode,
    /// Service type to a projected view of itself.
    Project,
}

impl Direction {
    pub fn prefix(&self) -> &'static str {
        match self {
            Direction::Encode => "encode",
            Direction::Decode => "decode",
            Direction::Project => "project",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: RustType,
    /// Passed as `&T`; otherwise moved in.
    pub by_ref: bool,
}

/// The procedure that builds the target value.
#[derive(Debug, Clone, PartialEq)]
pub struct InitProc {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: RustType,
    pub body: Vec<Stmt>,
    /// Local returned at the end of the body. `None` when every path
    /// returns explicitly.
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionPlan {
    pub source_type: RustType,
    pub target_type: RustType,
    pub direction: Direction,
    pub init: InitProc,
    /// Validator run on the decoded value.
    pub validation: Option<String>,
    /// Helpers the body calls, in first-call order.
    pub helpers: Vec<String>,
}

impl ConversionPlan {
    pub fn name(&self) -> &str {
        &self.init.name
    }
}
