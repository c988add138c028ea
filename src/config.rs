use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, IoResultExt, Result};

/// highest zlib compression level accepted by the block codec
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// archive configuration, loadable from a TOML file
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// zlib level (0-9) used when compressing entries on save
    pub compression_level: u32,
    /// recompute and check the integrity code of every entry read
    pub verify_integrity: bool,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// reject values the codec cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > MAX_COMPRESSION_LEVEL {
            return Err(Error::Invalid(format!(
                "compression level {} out of range 0-{}",
                self.compression_level, MAX_COMPRESSION_LEVEL
            )));
        }
        Ok(())
    }

    pub(crate) fn compression(&self) -> flate2::Compression {
        flate2::Compression::new(self.compression_level.min(MAX_COMPRESSION_LEVEL))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            compression_level: 6,
            verify_integrity: true,
        }
    }
}
