//! Real-time binaural, monaural and isochronic tone engine.
//!
//! The [`controller::EngineController`] owns one audio output and one render
//! node. It is constructed explicitly and passed to whoever needs it; there is
//! no process-wide engine.

pub mod automation;
pub mod command;
pub mod config;
pub mod controller;
pub mod dsp;
pub mod error;
pub mod generator;
pub mod output;
pub mod params;
pub mod preset;
pub mod render;
pub mod session;

pub use config::EngineConfig;
pub use controller::{EngineController, EngineState, EngineStatus};
pub use error::{EngineError, Result};
pub use params::{Mode, ParamId, ParamUpdate, ParamValues};
pub use preset::{load_presets, Preset, PresetLibrary};
pub use session::SessionSummary;
