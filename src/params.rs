//! The runtime parameter surface: seven independently automatable controls,
//! each with a declared default and a clamped numeric range.

use serde::{Deserialize, Serialize};

/// Number of automatable parameters.
pub const PARAM_COUNT: usize = 7;

/// Reference pitch the carrier frequency is expressed against.
pub const TUNING_BASE_HZ: f32 = 432.0;

/// Synthesis mode.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Binaural,
    Monaural,
    Isochronic,
}

impl Mode {
    /// Encode the mode as a parameter value so it travels through the same
    /// automation lanes as the numeric controls.
    pub fn as_value(self) -> f32 {
        match self {
            Mode::Binaural => 0.0,
            Mode::Monaural => 1.0,
            Mode::Isochronic => 2.0,
        }
    }

    /// Decode a parameter value, rounding to the nearest variant.
    #[inline]
    pub fn from_value(v: f32) -> Self {
        if v < 0.5 {
            Mode::Binaural
        } else if v < 1.5 {
            Mode::Monaural
        } else {
            Mode::Isochronic
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "binaural" => Some(Mode::Binaural),
            "monaural" => Some(Mode::Monaural),
            "isochronic" => Some(Mode::Isochronic),
            _ => None,
        }
    }
}

/// Identifies one automation lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamId {
    BaseFreq,
    BeatHz,
    Amplitude,
    Mode,
    TuningReference,
    NoiseLevel,
    IsochronicDepth,
}

impl ParamId {
    pub const ALL: [ParamId; PARAM_COUNT] = [
        ParamId::BaseFreq,
        ParamId::BeatHz,
        ParamId::Amplitude,
        ParamId::Mode,
        ParamId::TuningReference,
        ParamId::NoiseLevel,
        ParamId::IsochronicDepth,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn spec(self) -> &'static ParamSpec {
        &PARAM_SPECS[self.index()]
    }

    /// Clamp `v` into this parameter's documented range. Non-finite input
    /// falls back to the default so the generator never sees NaN.
    pub fn clamp(self, v: f32) -> f32 {
        let spec = self.spec();
        if v.is_finite() {
            v.clamp(spec.min, spec.max)
        } else {
            spec.default
        }
    }
}

/// Declared default and range of one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

pub const PARAM_SPECS: [ParamSpec; PARAM_COUNT] = [
    ParamSpec { name: "baseFreq", default: 200.0, min: 20.0, max: 2000.0 },
    ParamSpec { name: "beatHz", default: 10.0, min: 0.1, max: 120.0 },
    ParamSpec { name: "amplitude", default: 0.2, min: 0.0, max: 1.0 },
    ParamSpec { name: "mode", default: 0.0, min: 0.0, max: 2.0 },
    ParamSpec { name: "tuningReference", default: 432.0, min: 400.0, max: 600.0 },
    ParamSpec { name: "noiseLevel", default: 0.0, min: 0.0, max: 1.0 },
    ParamSpec { name: "isochronicDepth", default: 0.5, min: 0.0, max: 1.0 },
];

/// A complete set of parameter values.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParamValues {
    pub base_freq: f32,
    pub beat_hz: f32,
    pub amplitude: f32,
    pub mode: Mode,
    pub tuning_reference: f32,
    pub noise_level: f32,
    pub isochronic_depth: f32,
}

impl Default for ParamValues {
    fn default() -> Self {
        Self {
            base_freq: ParamId::BaseFreq.spec().default,
            beat_hz: ParamId::BeatHz.spec().default,
            amplitude: ParamId::Amplitude.spec().default,
            mode: Mode::default(),
            tuning_reference: ParamId::TuningReference.spec().default,
            noise_level: ParamId::NoiseLevel.spec().default,
            isochronic_depth: ParamId::IsochronicDepth.spec().default,
        }
    }
}

impl ParamValues {
    pub fn get(&self, id: ParamId) -> f32 {
        match id {
            ParamId::BaseFreq => self.base_freq,
            ParamId::BeatHz => self.beat_hz,
            ParamId::Amplitude => self.amplitude,
            ParamId::Mode => self.mode.as_value(),
            ParamId::TuningReference => self.tuning_reference,
            ParamId::NoiseLevel => self.noise_level,
            ParamId::IsochronicDepth => self.isochronic_depth,
        }
    }

    /// Store a value, clamped to the parameter's range.
    pub fn set(&mut self, id: ParamId, v: f32) {
        let v = id.clamp(v);
        match id {
            ParamId::BaseFreq => self.base_freq = v,
            ParamId::BeatHz => self.beat_hz = v,
            ParamId::Amplitude => self.amplitude = v,
            ParamId::Mode => self.mode = Mode::from_value(v),
            ParamId::TuningReference => self.tuning_reference = v,
            ParamId::NoiseLevel => self.noise_level = v,
            ParamId::IsochronicDepth => self.isochronic_depth = v,
        }
    }

    /// Carrier frequency after applying the tuning reference.
    pub fn scaled_base_freq(&self) -> f32 {
        self.base_freq * (self.tuning_reference / TUNING_BASE_HZ)
    }
}

/// A partial parameter set; unsupplied fields are left untouched.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ParamUpdate {
    pub base_freq: Option<f32>,
    pub beat_hz: Option<f32>,
    pub amplitude: Option<f32>,
    pub mode: Option<Mode>,
    pub tuning_reference: Option<f32>,
    pub noise_level: Option<f32>,
    pub isochronic_depth: Option<f32>,
}

impl ParamUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_freq(mut self, hz: f32) -> Self {
        self.base_freq = Some(hz);
        self
    }

    pub fn beat_hz(mut self, hz: f32) -> Self {
        self.beat_hz = Some(hz);
        self
    }

    pub fn amplitude(mut self, amp: f32) -> Self {
        self.amplitude = Some(amp);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn tuning_reference(mut self, hz: f32) -> Self {
        self.tuning_reference = Some(hz);
        self
    }

    pub fn noise_level(mut self, level: f32) -> Self {
        self.noise_level = Some(level);
        self
    }

    pub fn isochronic_depth(mut self, depth: f32) -> Self {
        self.isochronic_depth = Some(depth);
        self
    }

    /// Iterate the supplied fields as `(id, raw value)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (ParamId, f32)> {
        [
            (ParamId::BaseFreq, self.base_freq),
            (ParamId::BeatHz, self.beat_hz),
            (ParamId::Amplitude, self.amplitude),
            (ParamId::Mode, self.mode.map(Mode::as_value)),
            (ParamId::TuningReference, self.tuning_reference),
            (ParamId::NoiseLevel, self.noise_level),
            (ParamId::IsochronicDepth, self.isochronic_depth),
        ]
        .into_iter()
        .filter_map(|(id, v)| v.map(|v| (id, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.entries().next().is_none()
    }
}
