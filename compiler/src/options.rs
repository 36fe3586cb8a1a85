// options.rs — Analysis configuration
//
// Loaded from JSON (`--config`) or built in code. Every field has a default,
// so a config file only names what it changes.

use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// Node families that can be switched off. A disabled family is still
/// analyzed; its nodes carry `E0400`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureToggles {
    pub output_node: bool,
    pub vectors: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            output_node: true,
            vectors: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisOptions {
    pub features: FeatureToggles,
    /// Run the explicit-borrow normalizer as the last stage.
    pub normalize_explicit_borrows: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            features: FeatureToggles::default(),
            normalize_explicit_borrows: true,
        }
    }
}

#[derive(Debug)]
pub enum OptionsError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for OptionsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionsError::Io(e) => write!(f, "cannot read config: {e}"),
            OptionsError::Json(e) => write!(f, "invalid config: {e}"),
        }
    }
}

impl std::error::Error for OptionsError {}

impl AnalysisOptions {
    pub fn from_json(text: &str) -> Result<Self, OptionsError> {
        serde_json::from_str(text).map_err(OptionsError::Json)
    }

    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let text = std::fs::read_to_string(path).map_err(OptionsError::Io)?;
        Self::from_json(&text)
    }
}
