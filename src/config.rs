//! Registrar settings

use serde::{Deserialize, Serialize};

use crate::module::{CONTEXT, GLOBALS};
use crate::WiringError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Names which are never copied from one module registry to another
    pub reserved_names: Vec<String>,
    /// Emit a trace event for each resolved dependency
    pub trace_resolution: bool,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self {
            reserved_names: vec![CONTEXT.to_string(), GLOBALS.to_string()],
            trace_resolution: false,
        }
    }
}

impl RegistrarConfig {
    /// Load settings from a JSON document, missing fields keep their default value
    pub fn from_json(json: &str) -> Result<Self, WiringError> {
        serde_json::from_str(json).map_err(|e| WiringError::Config(format!("Failed to parse JSON: {}", e)))
    }

    /// Reserve an additional name
    pub fn reserve(mut self, name: &str) -> Self {
        if !self.reserved_names.iter().any(|n| n == name) {
            self.reserved_names.push(name.to_string());
        }
        self
    }

    pub fn with_trace_resolution(mut self, enabled: bool) -> Self {
        self.trace_resolution = enabled;
        self
    }
}

