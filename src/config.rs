use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::dsp::NoiseColor;
use crate::error::{EngineError, Result};

/// Smallest parameter queue the controller will build. A restart alone
/// queues one event per lane plus a sweep and the fade-in.
pub const MIN_EVENT_CAPACITY: usize = 32;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    #[serde(default = "default_fade_ms")]
    pub fade_ms: u32,
    #[serde(default = "default_smoothing_ms")]
    pub smoothing_ms: u32,
    #[serde(default = "default_suspend_guard_ms")]
    pub suspend_guard_ms: u32,
    #[serde(default = "default_dither_scale")]
    pub dither_scale: f32,
    #[serde(default)]
    pub noise_color: NoiseColor,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    #[serde(default)]
    pub preferred_sample_rate: Option<u32>,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_block_size() -> usize {
    128
}

fn default_fade_ms() -> u32 {
    30
}

fn default_smoothing_ms() -> u32 {
    60
}

fn default_suspend_guard_ms() -> u32 {
    20
}

fn default_dither_scale() -> f32 {
    1.0e-5
}

fn default_event_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: default_block_size(),
            fade_ms: default_fade_ms(),
            smoothing_ms: default_smoothing_ms(),
            suspend_guard_ms: default_suspend_guard_ms(),
            dither_scale: default_dither_scale(),
            noise_color: NoiseColor::default(),
            event_capacity: default_event_capacity(),
            preferred_sample_rate: None,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Read a TOML config file. Missing keys take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let txt = std::fs::read_to_string(path)?;
        Self::from_toml_str(&txt)
    }

    pub fn from_toml_str(txt: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(txt).map_err(|e| EngineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like [`EngineConfig::load`], but falls back to defaults (with a warning)
    /// when the file is missing or invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!("using default engine config ({}): {e}", path.display());
                Self::default()
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(EngineError::Config("block_size must be at least 1".into()));
        }
        if self.event_capacity < MIN_EVENT_CAPACITY {
            return Err(EngineError::Config(format!(
                "event_capacity must be at least {MIN_EVENT_CAPACITY}"
            )));
        }
        if !(self.dither_scale.is_finite() && self.dither_scale >= 0.0) {
            return Err(EngineError::Config("dither_scale must be a non-negative number".into()));
        }
        Ok(())
    }

    /// Write the configuration as TOML to the provided path
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_str =
            toml::to_string_pretty(self).map_err(|e| EngineError::Config(e.to_string()))?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Generate a default configuration file at the given path
    pub fn generate_default<P: AsRef<Path>>(path: P) -> Result<()> {
        Self::default().write_to_file(path)
    }

    /// Frames covered by `ms` milliseconds at `sample_rate`.
    pub fn ms_to_frames(ms: u32, sample_rate: u32) -> u64 {
        (ms as u64 * sample_rate as u64) / 1000
    }
}
