//! Engine configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::kdf::KdfParams;
use crate::stream::{validate_chunk_size, DEFAULT_CHUNK_SIZE};
use cbcvault_common::{Error, Result};

/// Settings shared by the in-memory and file engines.
///
/// Containers written under one configuration can only be opened under the
/// same KDF iteration count. The chunk size only affects memory use and
/// progress granularity, never the output bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Key derivation parameters.
    pub kdf: KdfParams,
    /// Buffer size for streaming cipher and MAC loops, in bytes.
    pub chunk_size: usize,
}

impl EngineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self {
            kdf: KdfParams::standard(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Set the PBKDF2 iteration count.
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf = KdfParams::new(iterations);
        self
    }

    /// Set the streaming chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Check that the configuration is usable.
    ///
    /// # Errors
    /// - Zero iteration count
    /// - Chunk size that is zero or not a multiple of the block size
    pub fn validate(&self) -> Result<()> {
        if self.kdf.iterations == 0 {
            return Err(Error::Validation(
                "KDF iteration count must be positive".to_string(),
            ));
        }
        validate_chunk_size(self.chunk_size)
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(format!(
                "Config file \"{}\" not found.",
                path.display()
            )));
        }
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}
