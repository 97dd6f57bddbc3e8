//! Radio configuration surface
//!
//! Parsed once at process start and applied to the front-end halves before
//! the streams start. The engine rejects reconfiguration while a direction
//! is active, so there is no ordering subtlety here.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::DEFAULT_BUFFER_LEN;

/// Front-end and engine parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Carrier frequency in Hz
    pub frequency_hz: f64,
    /// Front-end gain in dB
    pub gain_db: f64,
    /// Hardware decimation ratio
    pub decimation: u32,
    /// Transfer block length in samples, per direction
    pub buffer_len: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 462.0e6,
            gain_db: 10.0,
            decimation: 256,
            buffer_len: DEFAULT_BUFFER_LEN,
        }
    }
}

impl RadioConfig {
    /// Load a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config = serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Write the configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serializing config")?;
        fs::write(path, text).with_context(|| format!("writing config file {}", path.display()))?;
        Ok(())
    }
}
