//! Immutable configuration for memory-backed images.
//!
//! Loaded once (from TOML or defaults) and shared by `Arc` between the
//! entity, the bitmap encoder and the formatted-image generator.

use crate::detect::{FormatRegistry, ImageFormat};
use crate::error::{ImageError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file names searched when no explicit path is given.
const CONFIG_CANDIDATES: &[&str] = &[".memimage.toml", "memimage.toml", ".config/memimage.toml"];

/// On-disk configuration schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    /// Delete the physical upload after its bytes were ingested
    #[serde(default = "default_true")]
    pub remove_uploaded_files: bool,

    /// Format assumed when no signature matches
    #[serde(default = "default_format")]
    pub default_format: ImageFormat,

    /// JPEG encode quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for ConfigSchema {
    fn default() -> Self {
        Self {
            remove_uploaded_files: default_true(),
            default_format: default_format(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_format() -> ImageFormat {
    ImageFormat::Jpg
}

fn default_jpeg_quality() -> u8 {
    75
}

/// Resolved configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    /// Delete the physical upload after ingestion
    pub remove_uploaded_files: bool,
    /// JPEG encode quality (1-100)
    pub jpeg_quality: u8,
    /// Signature table and fallback format
    pub registry: FormatRegistry,
    /// Where the config was loaded from, if anywhere
    pub path: Option<PathBuf>,
}

impl ImageConfig {
    /// Load configuration from a file path or use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path.map(Path::to_path_buf).or_else(find_config_file);

        let schema = match config_path {
            Some(ref p) => load_config_file(p)?,
            None => ConfigSchema::default(),
        };

        let mut config = Self::from_schema(schema);
        config.path = config_path;
        Ok(config)
    }

    /// Build from an already parsed schema.
    pub fn from_schema(schema: ConfigSchema) -> Self {
        Self {
            remove_uploaded_files: schema.remove_uploaded_files,
            jpeg_quality: schema.jpeg_quality.clamp(1, 100),
            registry: FormatRegistry::new(schema.default_format),
            path: None,
        }
    }

    /// Builder: toggle deletion of consumed uploads.
    pub fn with_remove_uploaded_files(mut self, remove: bool) -> Self {
        self.remove_uploaded_files = remove;
        self
    }

    /// Builder: JPEG encode quality, clamped to 1-100.
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Builder: replace the signature registry.
    pub fn with_registry(mut self, registry: FormatRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Fallback format of the registry.
    pub fn default_format(&self) -> ImageFormat {
        self.registry.default_format()
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self::from_schema(ConfigSchema::default())
    }
}

/// Find configuration file in standard locations
fn find_config_file() -> Option<PathBuf> {
    CONFIG_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

/// Load and parse a TOML configuration file
fn load_config_file(path: &Path) -> Result<ConfigSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ImageError::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content).map_err(|e| {
        ImageError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}
