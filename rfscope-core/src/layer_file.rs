//! Layer stack files.
//!
//! A layer file describes an optional input and an ordered list of layers, in
//! TOML or JSON:
//!
//! ```toml
//! [input]
//! height = 224
//! width = 224
//!
//! [[layers]]
//! type = "conv"
//! kernel_size = 7
//! stride = 2
//! padding = 3
//!
//! [[layers]]
//! type = "maxpool"
//! kernel_size = 3
//! stride = 2
//! padding = 1
//! ```

use crate::engine::{ReceptiveFieldEngine, DEFAULT_CHANNELS};
use crate::error::{Result, RfscopeError};
use crate::layer::LayerSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Input section of a layer file. Channels default to 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSection {
    pub height: i64,
    pub width: i64,
    #[serde(default = "default_channels")]
    pub channels: i64,
}

fn default_channels() -> i64 {
    i64::from(DEFAULT_CHANNELS)
}

/// A parsed, not yet validated layer file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<InputSection>,
    #[serde(default)]
    pub layers: Vec<LayerSpec>,
}

impl LayerFile {
    /// Read a layer file. `.json` files are parsed as JSON, everything else
    /// as TOML.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            Self::from_json(&text)
        } else {
            Self::from_toml(&text)
        };
        parsed.map_err(|reason| RfscopeError::LayerFile {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    pub fn from_json(text: &str) -> std::result::Result<Self, String> {
        serde_json::from_str(text).map_err(|e| e.to_string())
    }

    /// Validate every entry and load them into `engine` in order.
    ///
    /// Nothing is applied unless the whole file is valid.
    pub fn apply_to(&self, engine: &mut ReceptiveFieldEngine) -> Result<()> {
        let descriptors = self
            .layers
            .iter()
            .enumerate()
            .map(|(index, spec)| {
                spec.clone().into_descriptor().map_err(|e| RfscopeError::LayerSpec {
                    spec: format!("layers[{index}]"),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut staged = engine.clone();
        if let Some(input) = self.input {
            staged.set_input_dimensions(input.height, input.width, input.channels)?;
        }
        staged.extend_layers(descriptors);
        *engine = staged;
        Ok(())
    }
}
