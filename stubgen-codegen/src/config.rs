use serde::{Deserialize, Serialize};

use crate::protocol::Protocol;

/// Knobs for one compilation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    pub protocol: Protocol,
    /// Overrides the direction prefix in helper names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_prefix: Option<String>,
    /// Convert nested named types through shared helpers instead of inlining.
    pub share_named_types: bool,
    /// Module path of the generated support code.
    pub support_path: String,
    /// Out-of-band key carrying the selected result view.
    pub view_key: String,
    pub wire_namespace: String,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Grpc,
            helper_prefix: None,
            share_named_types: true,
            support_path: "support".to_string(),
            view_key: "stubgen-view".to_string(),
            wire_namespace: "pb".to_string(),
        }
    }
}

impl CodegenConfig {
    pub fn http() -> Self {
        Self {
            protocol: Protocol::Http,
            wire_namespace: "http".to_string(),
            ..Self::default()
        }
    }
}
