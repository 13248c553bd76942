//! Per-parameter linear automation, evaluated on the render thread.
//!
//! Each lane holds a single segment `(from, to, start, end)` in frames. A new
//! request replaces the segment, starting from the value the old one had
//! reached at the frame the request is applied, so overlapping ramps never
//! produce a jump.

use crate::command::{EventKind, ParamEvent};
use crate::generator::{BlockParams, ParamInput};
use crate::params::{ParamId, ParamValues, PARAM_COUNT};

/// Largest block the render side will hand to the generator in one call.
pub const MAX_BLOCK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Automation {
    from: f64,
    to: f64,
    start: u64,
    end: u64,
}

impl Automation {
    pub fn new(value: f32) -> Self {
        Self { from: value as f64, to: value as f64, start: 0, end: 0 }
    }

    /// Value at `frame`. Frames before the segment start return the start
    /// value; frames at or past the end return the target exactly.
    #[inline]
    pub fn value_at(&self, frame: u64) -> f32 {
        if frame >= self.end {
            return self.to as f32;
        }
        if frame <= self.start {
            return self.from as f32;
        }
        let t = (frame - self.start) as f64 / (self.end - self.start) as f64;
        (self.from + (self.to - self.from) * t) as f32
    }

    pub fn target(&self) -> f32 {
        self.to as f32
    }

    /// True when the lane holds a constant value from `frame` on.
    #[inline]
    pub fn is_steady_at(&self, frame: u64) -> bool {
        frame >= self.end
    }

    pub fn set_value(&mut self, value: f32, frame: u64) {
        self.from = value as f64;
        self.to = value as f64;
        self.start = frame;
        self.end = frame;
    }

    pub fn ramp_to(&mut self, target: f32, frame: u64, frames: u64) {
        if frames == 0 {
            self.set_value(target, frame);
            return;
        }
        let live = self.value_at(frame);
        self.from = live as f64;
        self.to = target as f64;
        self.start = frame;
        self.end = frame.saturating_add(frames);
    }

    pub fn hold(&mut self, frame: u64) {
        let live = self.value_at(frame);
        self.set_value(live, frame);
    }

    pub fn apply(&mut self, kind: EventKind, frame: u64) {
        match kind {
            EventKind::SetValue(v) => self.set_value(v, frame),
            EventKind::RampTo { target, frames } => self.ramp_to(target, frame, frames),
            EventKind::Hold => self.hold(frame),
        }
    }
}

/// All seven lanes plus the scratch curves a block is rendered into.
pub struct AutomationBank {
    lanes: [Automation; PARAM_COUNT],
    curves: Box<[[f32; MAX_BLOCK]; PARAM_COUNT]>,
}

impl AutomationBank {
    pub fn new(initial: &ParamValues) -> Self {
        let lanes = ParamId::ALL.map(|id| Automation::new(initial.get(id)));
        Self { lanes, curves: Box::new([[0.0; MAX_BLOCK]; PARAM_COUNT]) }
    }

    pub fn lane(&self, id: ParamId) -> &Automation {
        &self.lanes[id.index()]
    }

    pub fn apply(&mut self, event: ParamEvent, frame: u64) {
        self.lanes[event.param.index()].apply(event.kind, frame);
    }

    pub fn value_at(&self, id: ParamId, frame: u64) -> f32 {
        self.lanes[id.index()].value_at(frame)
    }

    /// Resolve every lane for the block `[block_start, block_start + n)`.
    ///
    /// Steady lanes are passed as scalars; lanes mid-ramp are rendered into
    /// their per-sample curve. `n` is capped at `MAX_BLOCK`.
    pub fn resolve(&mut self, block_start: u64, n: usize) -> BlockParams<'_> {
        let n = n.min(MAX_BLOCK);
        let mut steady = [None; PARAM_COUNT];
        for (idx, lane) in self.lanes.iter().enumerate() {
            if lane.is_steady_at(block_start) {
                steady[idx] = Some(lane.target());
                continue;
            }
            let curve = &mut self.curves[idx][..n];
            for (i, slot) in curve.iter_mut().enumerate() {
                *slot = lane.value_at(block_start + i as u64);
            }
        }

        let curves = &*self.curves;
        let input = move |id: ParamId| match steady[id.index()] {
            Some(v) => ParamInput::Scalar(v),
            None => ParamInput::Curve(&curves[id.index()][..n]),
        };
        BlockParams {
            base_freq: input(ParamId::BaseFreq),
            beat_hz: input(ParamId::BeatHz),
            amplitude: input(ParamId::Amplitude),
            mode: input(ParamId::Mode),
            tuning_reference: input(ParamId::TuningReference),
            noise_level: input(ParamId::NoiseLevel),
            isochronic_depth: input(ParamId::IsochronicDepth),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn ramp_is_monotonic_and_lands_on_target() {
        let mut amp = Automation::new(0.2);
        amp.ramp_to(0.8, 1000, 480);
        let mut prev = amp.value_at(1000);
        assert_abs_diff_eq!(prev, 0.2, epsilon = 1e-7);
        for frame in 1001..=1480 {
            let v = amp.value_at(frame);
            assert!(v >= prev, "frame {frame}: {v} < {prev}");
            prev = v;
        }
        assert_eq!(amp.value_at(1480), 0.8);
        assert_eq!(amp.value_at(5000), 0.8);
    }

    #[test]
    fn restart_continues_from_live_value() {
        let mut amp = Automation::new(0.2);
        amp.ramp_to(0.8, 0, 100);
        let before = amp.value_at(50);
        amp.ramp_to(0.4, 50, 100);
        let after = amp.value_at(50);
        assert_eq!(before, after);
        assert_abs_diff_eq!(after, 0.5, epsilon = 1e-6);
        // neither the old target nor the new one
        assert!(after != 0.8 && after != 0.4);
        assert_abs_diff_eq!(amp.value_at(100), 0.45, epsilon = 1e-6);
        assert_eq!(amp.value_at(150), 0.4);
    }

    #[test]
    fn step_and_hold() {
        let mut lane = Automation::new(4.0);
        lane.ramp_to(10.0, 0, 600);
        lane.hold(300);
        assert_abs_diff_eq!(lane.value_at(300), 7.0, epsilon = 1e-5);
        assert_abs_diff_eq!(lane.value_at(10_000), 7.0, epsilon = 1e-5);
        lane.set_value(1.0, 400);
        assert_eq!(lane.value_at(400), 1.0);
        assert!(lane.is_steady_at(400));
    }

    #[test]
    fn zero_length_ramp_is_a_step() {
        let mut lane = Automation::new(4.0);
        lane.ramp_to(6.0, 10, 0);
        assert_eq!(lane.value_at(10), 6.0);
        assert!(lane.is_steady_at(10));
    }

    #[test]
    fn long_sweep_interpolates_linearly() {
        let sr = 48_000u64;
        let mut beat = Automation::new(4.0);
        beat.ramp_to(10.0, 0, 1200 * sr);
        assert_eq!(beat.value_at(0), 4.0);
        assert_abs_diff_eq!(beat.value_at(600 * sr), 7.0, epsilon = 1e-5);
        assert_eq!(beat.value_at(1200 * sr), 10.0);
    }

    #[test]
    fn bank_passes_scalars_for_steady_lanes() {
        let mut bank = AutomationBank::new(&ParamValues::default());
        bank.apply(ParamEvent::ramp(ParamId::Amplitude, 1.0, 256), 0);
        let block = bank.resolve(0, 128);
        assert!(matches!(block.base_freq, ParamInput::Scalar(v) if v == 200.0));
        match block.amplitude {
            ParamInput::Curve(c) => {
                assert_eq!(c.len(), 128);
                assert_abs_diff_eq!(c[0], 0.2, epsilon = 1e-6);
                assert!(c[127] > c[0]);
            }
            ParamInput::Scalar(_) => panic!("amplitude should be ramping"),
        }
        let later = bank.resolve(256, 128);
        assert!(matches!(later.amplitude, ParamInput::Scalar(v) if v == 1.0));
    }
}
