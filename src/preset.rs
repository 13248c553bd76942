use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::params::{Mode, ParamId, TUNING_BASE_HZ};

/// One record of the preset feed. Keys may be camelCase or snake_case.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(alias = "baseFreqHz", alias = "base_freq")]
    pub base_freq_hz: f32,
    #[serde(alias = "beatHzStart")]
    pub beat_hz_start: f32,
    #[serde(alias = "beatHzEnd")]
    pub beat_hz_end: f32,
    #[serde(alias = "durationMin", alias = "duration")]
    pub duration_min: f32,
    #[serde(default = "default_tuning_ref", alias = "tuningRef")]
    pub tuning_ref: f32,
    #[serde(default, alias = "noiseLevel")]
    pub noise_level: f32,
    #[serde(default = "default_isochronic_depth", alias = "isochronicDepth")]
    pub isochronic_depth: f32,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default, alias = "isPublic")]
    pub is_public: bool,
}

fn default_tuning_ref() -> f32 {
    TUNING_BASE_HZ
}

fn default_isochronic_depth() -> f32 {
    ParamId::IsochronicDepth.spec().default
}

impl Preset {
    /// Length of the beat sweep in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.duration_min.is_finite() {
            self.duration_min.max(0.0) as f64 * 60.0
        } else {
            0.0
        }
    }
}

/// Read a JSON array of presets.
pub fn load_presets<P: AsRef<Path>>(path: P) -> Result<Vec<Preset>> {
    let json_str = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json_str)?)
}

#[derive(Debug, Clone, Default)]
pub struct PresetLibrary {
    presets: Vec<Preset>,
}

impl PresetLibrary {
    pub fn new(presets: Vec<Preset>) -> Self {
        Self { presets }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        load_presets(path).map(Self::new)
    }

    pub fn from_json_str(json_str: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json_str)?))
    }

    /// Case-insensitive lookup by name.
    pub fn find(&self, name: &str) -> Option<&Preset> {
        let name = name.trim();
        self.presets.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Preset> {
        self.presets.iter()
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    const FEED: &str = r#"[
        {
            "name": "Deep Focus",
            "description": "Beta sweep",
            "mode": "binaural",
            "baseFreqHz": 220,
            "beatHzStart": 4,
            "beatHzEnd": 10,
            "durationMin": 20,
            "tuningRef": 528,
            "noiseLevel": 0.1,
            "isochronicDepth": 0.7,
            "intent": "focus",
            "isPublic": true
        },
        {
            "name": "Pulse",
            "mode": "isochronic",
            "base_freq_hz": 200,
            "beat_hz_start": 6,
            "beat_hz_end": 6,
            "duration_min": 5
        }
    ]"#;

    #[test]
    fn parses_both_key_styles() {
        let lib = PresetLibrary::from_json_str(FEED).unwrap();
        assert_eq!(lib.len(), 2);

        let focus = lib.find("deep focus").unwrap();
        assert_eq!(focus.mode, Mode::Binaural);
        assert_eq!(focus.base_freq_hz, 220.0);
        assert_eq!(focus.tuning_ref, 528.0);
        assert_eq!(focus.intent.as_deref(), Some("focus"));
        assert!(focus.is_public);
        assert_eq!(focus.duration_secs(), 1200.0);

        let pulse = lib.find("PULSE").unwrap();
        assert_eq!(pulse.mode, Mode::Isochronic);
        assert_eq!(pulse.tuning_ref, 432.0);
        assert_eq!(pulse.isochronic_depth, 0.5);
        assert_eq!(pulse.noise_level, 0.0);
        assert!(!pulse.is_public);
    }

    #[test]
    fn unknown_name_is_none() {
        let lib = PresetLibrary::from_json_str(FEED).unwrap();
        assert!(lib.find("sleep").is_none());
    }

    #[test]
    fn malformed_feed_is_a_preset_error() {
        let err = PresetLibrary::from_json_str(r#"[{"name": "x", "mode": "binaural"}]"#).unwrap_err();
        assert!(matches!(err, EngineError::Preset(_)));
    }

    #[test]
    fn loads_from_file() {
        let path = std::env::temp_dir().join(format!("binaural_presets_{}.json", std::process::id()));
        std::fs::write(&path, FEED).unwrap();
        let presets = load_presets(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(presets[1].name, "Pulse");
    }
}
