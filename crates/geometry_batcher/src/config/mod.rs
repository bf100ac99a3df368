//! Configuration system
//!
//! [`BatcherConfig`] tunes batch sizing and the shared stem material. Like
//! every [`Config`] it can be loaded from and saved to TOML or RON files.

pub use serde::{Serialize, Deserialize};

use crate::batching::range::CAPACITY_CEILING;
use crate::render::MaterialKey;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(ConfigError::Io)?;

        // Try different formats
        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Default soft limit on a batch's vertex, triangle-index and stem-index counts
pub const DEFAULT_SEAL_THRESHOLD: u32 = 24_576;

/// # Batcher Configuration
///
/// Controls when open batches seal themselves and how the shared tables start out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// A batch whose vertex count, triangle-index count or stem-index count has
    /// reached this value is sealed before the next geometry is added to it.
    ///
    /// The headroom up to [`CAPACITY_CEILING`] bounds how much a single
    /// geometry may append without a size hint.
    pub seal_threshold: u32,

    /// Number of geometry records allocated up front
    pub initial_geometry_capacity: u32,

    /// Material every stem sub-mesh is drawn with
    pub stem_material: MaterialKey,
}

impl BatcherConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the seal threshold
    pub fn with_seal_threshold(mut self, threshold: u32) -> Self {
        self.seal_threshold = threshold;
        self
    }

    /// Set the number of geometry records allocated up front
    pub fn with_initial_geometry_capacity(mut self, capacity: u32) -> Self {
        self.initial_geometry_capacity = capacity;
        self
    }

    /// Set the shared stem material
    pub fn with_stem_material(mut self, material: MaterialKey) -> Self {
        self.stem_material = material;
        self
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.seal_threshold == 0 || self.seal_threshold > CAPACITY_CEILING {
            return Err(ConfigError::Invalid(format!(
                "seal_threshold must be in 1..={CAPACITY_CEILING}, got {}",
                self.seal_threshold
            )));
        }
        Ok(())
    }
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            seal_threshold: DEFAULT_SEAL_THRESHOLD,
            initial_geometry_capacity: 0,
            stem_material: MaterialKey(0),
        }
    }
}

impl Config for BatcherConfig {}
