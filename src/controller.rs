//! Lifecycle and parameter scheduling for one playback session.
//!
//! The controller is the only thing that talks to the render side. It keeps a
//! control-side mirror of every parameter target and forwards changes as
//! [`ParamEvent`]s through a lock-free ring; ramps are interpolated by the
//! render node, so no ramp progress is shared between threads.
//!
//! Stopping fades amplitude out and suspends the output only after the fade
//! window has elapsed. That suspend runs on a short-lived timer thread and is
//! keyed by a token: any later `start` or `dispose` bumps the token and wakes
//! the timer, so a stale suspend can never silence a session that is playing
//! again.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use ringbuf::traits::{Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::ParamEvent;
use crate::config::{EngineConfig, MIN_EVENT_CAPACITY};
use crate::error::{EngineError, Result};
use crate::output::{AudioBackend, AudioOutput};
use crate::params::{Mode, ParamId, ParamUpdate, ParamValues};
use crate::preset::Preset;
use crate::render::{FrameClock, RenderNode};
use crate::session::{SessionClock, SessionSummary};

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Uninitialized,
    Initialized,
    Running,
    Suspended,
    Disposed,
}

/// Snapshot returned by [`EngineController::query_state`].
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub state: EngineState,
    pub running: bool,
    pub sample_rate: Option<u32>,
    /// Seconds of audio rendered since initialization.
    pub elapsed_secs: f64,
}

struct Lifecycle<O> {
    state: EngineState,
    output: Option<O>,
    /// The output is resumed and invoking the render callback. Stays true
    /// during a fade-out until the deferred suspend fires.
    output_active: bool,
    suspend_token: u64,
    cancel_suspend: Option<Sender<()>>,
}

impl<O> Lifecycle<O> {
    fn cancel_pending_suspend(&mut self) {
        self.suspend_token = self.suspend_token.wrapping_add(1);
        if self.cancel_suspend.take().is_some() {
            debug!("pending suspend cancelled");
        }
    }
}

pub struct EngineController<B: AudioBackend> {
    backend: B,
    config: EngineConfig,
    values: ParamValues,
    events: Option<HeapProd<ParamEvent>>,
    clock: FrameClock,
    sample_rate: Option<u32>,
    life: Arc<Mutex<Lifecycle<B::Output>>>,
    session: SessionClock,
    suspend_thread: Option<JoinHandle<()>>,
    /// Sweep scheduled while the output was idle; its ramp starts on resume.
    pending_sweep: Option<Sweep>,
}

impl<B: AudioBackend> EngineController<B> {
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            values: ParamValues::default(),
            events: None,
            clock: FrameClock::new(),
            sample_rate: None,
            life: Arc::new(Mutex::new(Lifecycle {
                state: EngineState::Uninitialized,
                output: None,
                output_active: false,
                suspend_token: 0,
                cancel_suspend: None,
            })),
            session: SessionClock::new(),
            suspend_thread: None,
            pending_sweep: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        self.life.lock().state
    }

    /// Current parameter targets as last requested by the caller.
    pub fn targets(&self) -> ParamValues {
        self.values
    }

    /// Acquire the audio output and build the render node. No-op when
    /// already initialized; a failure leaves the controller uninitialized so
    /// the caller may retry.
    pub fn initialize(&mut self) -> Result<()> {
        match self.state() {
            EngineState::Disposed => return Err(EngineError::Disposed),
            EngineState::Uninitialized => {}
            _ => return Ok(()),
        }

        let (prod, cons) = HeapRb::<ParamEvent>::new(self.config.event_capacity.max(MIN_EVENT_CAPACITY)).split();
        let mut initial = self.values;
        // silent until the first start fades in
        initial.amplitude = 0.0;
        let node_config = self.config.clone();
        let clock = FrameClock::new();
        let node_clock = clock.clone();

        let output = self
            .backend
            .open(move |sr| RenderNode::new(sr, &initial, &node_config, cons, node_clock))
            .map_err(|e| {
                warn!("audio output initialization failed: {e}");
                e
            })?;

        let sample_rate = output.sample_rate();
        self.events = Some(prod);
        self.clock = clock;
        self.sample_rate = Some(sample_rate);
        let mut life = self.life.lock();
        life.output = Some(output);
        life.output_active = false;
        life.state = EngineState::Initialized;
        info!("engine initialized at {sample_rate} Hz");
        Ok(())
    }

    /// Resume output and fade amplitude in to its target.
    ///
    /// When the output had actually been suspended, every lane is reset to
    /// its current target first, so no ramp left unfinished by the stop is
    /// picked up again.
    pub fn start(&mut self) -> Result<()> {
        if self.state() == EngineState::Uninitialized {
            self.initialize()?;
        }
        let life_handle = Arc::clone(&self.life);
        let mut life = life_handle.lock();
        match life.state {
            EngineState::Disposed => return Err(EngineError::Disposed),
            EngineState::Uninitialized => return Err(EngineError::NotInitialized),
            EngineState::Running => return Ok(()),
            EngineState::Initialized | EngineState::Suspended => {}
        }
        life.cancel_pending_suspend();

        let fade = self.frames(self.config.fade_ms);
        let target = self.values.amplitude;
        if life.output_active {
            // Still fading out: turn around from the live value.
            self.push(&[ParamEvent::ramp(ParamId::Amplitude, target, fade)])?;
        } else {
            // The amplitude lane is already silent while inactive, so the
            // output may run a block before the reset lands.
            let output = life.output.as_mut().ok_or(EngineError::NotInitialized)?;
            if let Err(e) = output.resume() {
                warn!("failed to start audio output: {e}");
                life.state = EngineState::Initialized;
                return Err(e);
            }
            let mut events = self.reset_events();
            events.push(ParamEvent::ramp(ParamId::Amplitude, target, fade));
            if let Err(e) = self.push(&events) {
                if let Some(output) = life.output.as_mut() {
                    output.suspend();
                }
                return Err(e);
            }
            life.output_active = true;
            self.pending_sweep = None;
        }
        life.state = EngineState::Running;
        self.session.start();
        info!("playback started");
        Ok(())
    }

    /// Fade amplitude out, then suspend the output once the fade is over.
    pub fn stop(&mut self) -> Result<()> {
        let life_handle = Arc::clone(&self.life);
        let mut life = life_handle.lock();
        match life.state {
            EngineState::Disposed => return Err(EngineError::Disposed),
            EngineState::Running => {}
            _ => return Ok(()),
        }

        let fade = self.frames(self.config.fade_ms);
        self.push(&[ParamEvent::ramp(ParamId::Amplitude, 0.0, fade)])?;
        life.state = EngineState::Suspended;
        self.session.stop();

        life.suspend_token = life.suspend_token.wrapping_add(1);
        let token = life.suspend_token;
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let delay = Duration::from_millis(
            self.config.fade_ms as u64 + self.config.suspend_guard_ms as u64,
        );
        let timer_life = Arc::clone(&self.life);
        let spawned = std::thread::Builder::new()
            .name("deferred-suspend".into())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(delay) {
                    suspend_if_current(&timer_life, token);
                }
            });
        match spawned {
            Ok(handle) => {
                life.cancel_suspend = Some(cancel_tx);
                // Any previous timer was cancelled by the start that led
                // here; it exits on its own.
                self.suspend_thread = Some(handle);
            }
            Err(e) => {
                warn!("could not schedule deferred suspend ({e}); suspending now");
                if let Some(output) = life.output.as_mut() {
                    output.suspend();
                }
                life.output_active = false;
            }
        }
        info!("playback stopping");
        Ok(())
    }

    /// Ramp each supplied parameter from its live value to the clamped new
    /// value. Mode changes are applied as a step. While the output is idle
    /// the values are only recorded; the next start carries them over.
    pub fn set_parameters(&mut self, update: ParamUpdate) -> Result<()> {
        let life_handle = Arc::clone(&self.life);
        let life = life_handle.lock();
        if life.state == EngineState::Disposed {
            return Err(EngineError::Disposed);
        }
        let entries: Vec<(ParamId, f32)> =
            update.entries().map(|(id, raw)| (id, id.clamp(raw))).collect();

        if life.output_active {
            let running = life.state == EngineState::Running;
            let smoothing = self.frames(self.config.smoothing_ms);
            let events: Vec<ParamEvent> = entries
                .iter()
                // amplitude belongs to the fade-out while stopping
                .filter(|(id, _)| *id != ParamId::Amplitude || running)
                .map(|&(id, v)| match id {
                    ParamId::Mode => ParamEvent::set(id, v),
                    _ => ParamEvent::ramp(id, v, smoothing),
                })
                .collect();
            self.push(&events)?;
        } else if update.beat_hz.is_some() {
            self.pending_sweep = None;
        }
        for (id, v) in entries {
            self.values.set(id, v);
        }
        Ok(())
    }

    /// Step base frequency and mode, then sweep the beat frequency linearly
    /// from `beat_start` to `beat_end` over `duration_minutes`. Scheduled
    /// before the output runs, the sweep begins when playback starts.
    pub fn schedule_sweep(
        &mut self,
        base_freq: f32,
        beat_start: f32,
        beat_end: f32,
        duration_minutes: f32,
        mode: Mode,
    ) -> Result<()> {
        let sample_rate = self.require_initialized()?;
        let sweep = Sweep::new(base_freq, beat_start, beat_end, duration_minutes, mode, sample_rate);
        let life_handle = Arc::clone(&self.life);
        let life = life_handle.lock();
        if life.output_active {
            self.push(&sweep.events())?;
        } else {
            self.pending_sweep = Some(sweep);
        }
        self.record_sweep(&sweep);
        debug!(
            "sweep scheduled: {} Hz carrier, beat {} -> {} Hz over {duration_minutes} min",
            sweep.base, sweep.start, sweep.end
        );
        Ok(())
    }

    /// Load a preset: step its tuning, noise and depth, then schedule its sweep.
    pub fn apply_preset(&mut self, preset: &Preset) -> Result<()> {
        let sample_rate = self.require_initialized()?;
        let steps = [
            (ParamId::TuningReference, preset.tuning_ref),
            (ParamId::NoiseLevel, preset.noise_level),
            (ParamId::IsochronicDepth, preset.isochronic_depth),
        ]
        .map(|(id, v)| (id, id.clamp(v)));
        let sweep = Sweep::new(
            preset.base_freq_hz,
            preset.beat_hz_start,
            preset.beat_hz_end,
            preset.duration_min,
            preset.mode,
            sample_rate,
        );
        let life_handle = Arc::clone(&self.life);
        let life = life_handle.lock();
        if life.output_active {
            let mut events: Vec<ParamEvent> =
                steps.iter().map(|&(id, v)| ParamEvent::set(id, v)).collect();
            events.extend(sweep.events());
            self.push(&events)?;
        } else {
            self.pending_sweep = Some(sweep);
        }

        for (id, v) in steps {
            self.values.set(id, v);
        }
        self.record_sweep(&sweep);
        info!("preset applied: {}", preset.name);
        Ok(())
    }

    pub fn query_state(&self) -> EngineStatus {
        let state = self.state();
        let elapsed_secs = match self.sample_rate {
            Some(sr) if sr > 0 => self.clock.frames() as f64 / sr as f64,
            _ => 0.0,
        };
        EngineStatus {
            state,
            running: state == EngineState::Running,
            sample_rate: self.sample_rate,
            elapsed_secs,
        }
    }

    pub fn session_summary(&self) -> SessionSummary {
        self.session.summary()
    }

    /// Release the output and the render node. Every later operation fails
    /// with [`EngineError::Disposed`]; disposing twice is a no-op.
    pub fn dispose(&mut self) {
        let pending = {
            let mut life = self.life.lock();
            if life.state == EngineState::Disposed {
                return;
            }
            life.cancel_pending_suspend();
            if let Some(mut output) = life.output.take() {
                output.close();
            }
            life.output_active = false;
            life.state = EngineState::Disposed;
            self.suspend_thread.take()
        };
        if let Some(handle) = pending {
            let _ = handle.join();
        }
        self.events = None;
        self.session.stop();
        info!("engine disposed");
    }

    /// Step every lane to its target, amplitude to silence, then re-arm a
    /// sweep scheduled while idle.
    fn reset_events(&self) -> Vec<ParamEvent> {
        let mut events: Vec<ParamEvent> = ParamId::ALL
            .iter()
            .map(|&id| match id {
                ParamId::Amplitude => ParamEvent::set(id, 0.0),
                _ => ParamEvent::set(id, self.values.get(id)),
            })
            .collect();
        if let Some(sweep) = &self.pending_sweep {
            events.extend(sweep.beat_events());
        }
        events
    }

    fn record_sweep(&mut self, sweep: &Sweep) {
        self.values.base_freq = sweep.base;
        self.values.mode = sweep.mode;
        self.values.beat_hz = sweep.end;
    }

    fn require_initialized(&self) -> Result<u32> {
        match self.state() {
            EngineState::Disposed => Err(EngineError::Disposed),
            EngineState::Uninitialized => Err(EngineError::NotInitialized),
            _ => self.sample_rate.ok_or(EngineError::NotInitialized),
        }
    }

    fn frames(&self, ms: u32) -> u64 {
        EngineConfig::ms_to_frames(ms, self.sample_rate.unwrap_or(0))
    }

    /// Queue events all-or-nothing.
    fn push(&mut self, events: &[ParamEvent]) -> Result<()> {
        let prod = self.events.as_mut().ok_or(EngineError::NotInitialized)?;
        if prod.vacant_len() < events.len() {
            warn!("parameter event queue full, dropping {} event(s)", events.len());
            return Err(EngineError::QueueFull);
        }
        for ev in events {
            if prod.try_push(*ev).is_err() {
                return Err(EngineError::QueueFull);
            }
        }
        Ok(())
    }
}

impl<B: AudioBackend> Drop for EngineController<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A clamped beat sweep, already converted to frames.
#[derive(Debug, Clone, Copy)]
struct Sweep {
    base: f32,
    start: f32,
    end: f32,
    frames: u64,
    mode: Mode,
}

impl Sweep {
    fn new(base_freq: f32, beat_start: f32, beat_end: f32, minutes: f32, mode: Mode, sample_rate: u32) -> Self {
        let minutes = if minutes.is_finite() { minutes.max(0.0) } else { 0.0 };
        Self {
            base: ParamId::BaseFreq.clamp(base_freq),
            start: ParamId::BeatHz.clamp(beat_start),
            end: ParamId::BeatHz.clamp(beat_end),
            frames: (minutes as f64 * 60.0 * sample_rate as f64).round() as u64,
            mode,
        }
    }

    fn events(&self) -> Vec<ParamEvent> {
        let mut events = vec![
            ParamEvent::set(ParamId::BaseFreq, self.base),
            ParamEvent::set(ParamId::Mode, self.mode.as_value()),
        ];
        events.extend(self.beat_events());
        events
    }

    fn beat_events(&self) -> Vec<ParamEvent> {
        let mut events = vec![ParamEvent::set(ParamId::BeatHz, self.start)];
        if self.start != self.end {
            events.push(ParamEvent::ramp(ParamId::BeatHz, self.end, self.frames));
        }
        events
    }
}

fn suspend_if_current<O: AudioOutput>(life: &Mutex<Lifecycle<O>>, token: u64) {
    let mut guard = life.lock();
    let life = &mut *guard;
    if life.suspend_token != token || life.state != EngineState::Suspended || !life.output_active {
        return;
    }
    if let Some(output) = life.output.as_mut() {
        output.suspend();
    }
    life.output_active = false;
    life.cancel_suspend = None;
    debug!("deferred suspend fired");
}
