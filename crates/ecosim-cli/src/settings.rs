//! Optional TOML settings file.

use anyhow::{Context, Result};
use ecosim_core::{ParameterOverrides, WorldConfig};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Contents of a `--config` file.
///
/// ```toml
/// [world]
/// width = 40
/// height = 12
/// seed = 7
/// neighborhood = "moore"
///
/// [parameters]
/// max_age = 10
/// initial_animal_count = 6
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub world: WorldConfig,
    pub parameters: ParameterOverrides,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }
}
