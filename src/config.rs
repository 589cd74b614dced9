use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::canonical::PaddingPolicy;
use crate::error::{Error, Result};

/// Detector settings.
///
/// ```json
/// { "input_size": [112, 112], "padding": "center", "fill_value": 0.0 }
/// ```
///
/// Every field is optional. Without `input_size` the network's own input size is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Canonical `(width, height)` override.
    pub input_size: Option<(u32, u32)>,
    pub padding: PaddingPolicy,
    /// Value written into letterbox padding.
    pub fill_value: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            input_size: None,
            padding: PaddingPolicy::Center,
            fill_value: 0.0,
        }
    }
}

impl DetectorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((w, h)) = self.input_size {
            if w == 0 || h == 0 {
                return Err(Error::InvalidConfig(format!(
                    "input_size must be non-zero, got {w}x{h}"
                )));
            }
        }
        if !self.fill_value.is_finite() {
            return Err(Error::InvalidConfig(format!(
                "fill_value must be finite, got {}",
                self.fill_value
            )));
        }
        Ok(())
    }
}
