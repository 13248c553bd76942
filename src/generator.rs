//! Sample-accurate oscillator bank for binaural, monaural and isochronic tones.
//!
//! The generator runs on the audio rendering thread. It never allocates,
//! locks or logs; it reads one value per parameter per sample and advances
//! four phase accumulators that stay wrapped into `[0, 2π)` so that hours of
//! playback lose no precision.
//!
//! Parameter values are taken as given. Clamping to the documented domains is
//! the controller's job.

use std::f64::consts::TAU;

use rand::rngs::SmallRng;

use crate::dsp::{make_rng, tpdf_dither, NoiseColor, NoiseSource};
use crate::params::{Mode, ParamValues, TUNING_BASE_HZ};

/// One parameter's input for a block: a block-constant scalar or a
/// per-sample automation curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamInput<'a> {
    Scalar(f32),
    Curve(&'a [f32]),
}

impl ParamInput<'_> {
    /// Value at sample `i`. A curve of length one is broadcast; a curve
    /// shorter than the block repeats its last value.
    #[inline]
    pub fn at(&self, i: usize) -> f32 {
        match *self {
            ParamInput::Scalar(v) => v,
            ParamInput::Curve(c) => match c.get(i) {
                Some(&v) => v,
                None => c.last().copied().unwrap_or(0.0),
            },
        }
    }
}

/// The seven parameter inputs for one block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockParams<'a> {
    pub base_freq: ParamInput<'a>,
    pub beat_hz: ParamInput<'a>,
    pub amplitude: ParamInput<'a>,
    pub mode: ParamInput<'a>,
    pub tuning_reference: ParamInput<'a>,
    pub noise_level: ParamInput<'a>,
    pub isochronic_depth: ParamInput<'a>,
}

impl BlockParams<'static> {
    /// Block-constant inputs taken from a full value set.
    pub fn constant(values: &ParamValues) -> Self {
        Self {
            base_freq: ParamInput::Scalar(values.base_freq),
            beat_hz: ParamInput::Scalar(values.beat_hz),
            amplitude: ParamInput::Scalar(values.amplitude),
            mode: ParamInput::Scalar(values.mode.as_value()),
            tuning_reference: ParamInput::Scalar(values.tuning_reference),
            noise_level: ParamInput::Scalar(values.noise_level),
            isochronic_depth: ParamInput::Scalar(values.isochronic_depth),
        }
    }
}

/// Phase accumulators in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OscillatorState {
    pub left: f64,
    pub right: f64,
    /// Reserved; wrapped but never advanced.
    pub aux: f64,
    pub beat: f64,
}

impl OscillatorState {
    #[inline]
    fn wrap_all(&mut self) {
        self.left = wrap_phase(self.left);
        self.right = wrap_phase(self.right);
        self.aux = wrap_phase(self.aux);
        self.beat = wrap_phase(self.beat);
    }
}

/// Bring a phase that has just been advanced past `2π` back into range.
///
/// A single subtraction is enough because the per-sample increment is far
/// below `2π`. Subtracting exactly `2π` leaves `sin(phase)` unchanged.
#[inline]
pub fn wrap_phase(phase: f64) -> f64 {
    if phase >= TAU {
        phase - TAU
    } else {
        phase
    }
}

/// Isochronic pulse envelope. Never drops below `1 - depth`.
#[inline]
pub fn isochronic_envelope(depth: f32, beat_phase: f64) -> f32 {
    (1.0 - depth) + depth * (0.5 + 0.5 * beat_phase.sin() as f32)
}

/// Stereo tone generator.
pub struct SignalGenerator {
    sample_rate: f64,
    phases: OscillatorState,
    noise: NoiseSource,
    rng: SmallRng,
    dither_scale: f32,
}

impl SignalGenerator {
    pub fn new(sample_rate: f32, noise_color: NoiseColor, dither_scale: f32, seed: Option<u64>) -> Self {
        Self {
            sample_rate: sample_rate.max(1.0) as f64,
            phases: OscillatorState::default(),
            noise: NoiseSource::new(noise_color),
            rng: make_rng(seed),
            dither_scale,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }

    pub fn phases(&self) -> OscillatorState {
        self.phases
    }

    pub fn dither_scale(&self) -> f32 {
        self.dither_scale
    }

    /// Render `min(left.len(), right.len())` samples.
    pub fn process(&mut self, params: &BlockParams<'_>, left: &mut [f32], right: &mut [f32]) {
        let n = left.len().min(right.len());
        let w = TAU / self.sample_rate;

        for i in 0..n {
            let base = params.base_freq.at(i);
            let beat = params.beat_hz.at(i) as f64;
            let amp = params.amplitude.at(i);
            let mode = Mode::from_value(params.mode.at(i));
            let tuning = params.tuning_reference.at(i);
            let noise_level = params.noise_level.at(i);
            let depth = params.isochronic_depth.at(i);

            let f = (base * (tuning / TUNING_BASE_HZ)) as f64;
            let ph = &mut self.phases;

            let (mut l, mut r) = match mode {
                Mode::Binaural => {
                    ph.left += w * f;
                    ph.right += w * (f + beat);
                    (ph.left.sin() as f32 * amp, ph.right.sin() as f32 * amp)
                }
                Mode::Monaural => {
                    ph.left += w * f;
                    ph.right += w * (f + beat);
                    let s = 0.5 * (ph.left.sin() + ph.right.sin()) as f32 * amp;
                    (s, s)
                }
                Mode::Isochronic => {
                    ph.beat += w * beat;
                    let lfo = isochronic_envelope(depth, ph.beat);
                    ph.left += w * f;
                    let s = ph.left.sin() as f32 * amp * lfo;
                    (s, s)
                }
            };

            if noise_level > 0.0 {
                let n = self.noise.next(&mut self.rng) * noise_level;
                l += n;
                r += n;
            }

            l += tpdf_dither(&mut self.rng, self.dither_scale);
            r += tpdf_dither(&mut self.rng, self.dither_scale);

            left[i] = l;
            right[i] = r;

            self.phases.wrap_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SR: f32 = 48_000.0;

    fn values(mode: Mode, base: f32, beat: f32, amp: f32) -> ParamValues {
        ParamValues {
            base_freq: base,
            beat_hz: beat,
            amplitude: amp,
            mode,
            tuning_reference: 432.0,
            noise_level: 0.0,
            isochronic_depth: 0.5,
        }
    }

    fn render(gen: &mut SignalGenerator, v: &ParamValues, n: usize) -> (Vec<f32>, Vec<f32>) {
        let mut l = vec![0.0; n];
        let mut r = vec![0.0; n];
        gen.process(&BlockParams::constant(v), &mut l, &mut r);
        (l, r)
    }

    fn rising_crossings(x: &[f32]) -> usize {
        x.windows(2).filter(|w| w[0] < 0.0 && w[1] >= 0.0).count()
    }

    #[test]
    fn consecutive_blocks_match_one_large_block() {
        let mut v = values(Mode::Binaural, 220.0, 7.5, 0.5);
        v.noise_level = 0.3;
        for mode in [Mode::Binaural, Mode::Monaural, Mode::Isochronic] {
            v.mode = mode;
            let mut split = SignalGenerator::new(SR, NoiseColor::Pink, 1e-5, Some(9));
            let mut whole = SignalGenerator::new(SR, NoiseColor::Pink, 1e-5, Some(9));
            let (mut l, mut r) = render(&mut split, &v, 128);
            let (l2, r2) = render(&mut split, &v, 128);
            l.extend(l2);
            r.extend(r2);
            let (wl, wr) = render(&mut whole, &v, 256);
            for i in 0..256 {
                assert_abs_diff_eq!(l[i], wl[i], epsilon = 1e-6);
                assert_abs_diff_eq!(r[i], wr[i], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn wrap_preserves_sine() {
        let eps = 1e-3;
        let steps = 1000;
        for k in 0..steps {
            let p = TAU + eps * k as f64 / steps as f64;
            let wrapped = wrap_phase(p);
            assert!((0.0..TAU).contains(&wrapped));
            assert_abs_diff_eq!(p.sin(), wrapped.sin(), epsilon = 1e-12);
        }
        assert_eq!(wrap_phase(1.0), 1.0);
    }

    #[test]
    fn phases_stay_bounded_over_long_runs() {
        let mut gen = SignalGenerator::new(SR, NoiseColor::White, 0.0, Some(1));
        let mut v = values(Mode::Binaural, 2000.0, 120.0, 1.0);
        v.tuning_reference = 600.0;
        let mut l = vec![0.0; 1024];
        let mut r = vec![0.0; 1024];
        for block in 0..1000 {
            v.mode = if block % 2 == 0 { Mode::Binaural } else { Mode::Isochronic };
            gen.process(&BlockParams::constant(&v), &mut l, &mut r);
            let ph = gen.phases();
            for p in [ph.left, ph.right, ph.aux, ph.beat] {
                assert!((0.0..TAU).contains(&p), "phase escaped: {p}");
            }
            assert!(l.iter().chain(r.iter()).all(|s| s.is_finite()));
        }
    }

    #[test]
    fn binaural_channels_coincide_without_beat() {
        let mut gen = SignalGenerator::new(SR, NoiseColor::Pink, 0.0, Some(2));
        let v = values(Mode::Binaural, 300.0, 0.0, 0.7);
        let (l, r) = render(&mut gen, &v, 4800);
        assert_eq!(l, r);
    }

    #[test]
    fn binaural_scenario_frequencies_and_gain() {
        let mut gen = SignalGenerator::new(SR, NoiseColor::Pink, 1e-5, Some(3));
        let v = values(Mode::Binaural, 220.0, 10.0, 0.2);
        let (l, r) = render(&mut gen, &v, SR as usize);
        let cl = rising_crossings(&l) as i64;
        let cr = rising_crossings(&r) as i64;
        assert!((cl - 220).abs() <= 1, "left crossings {cl}");
        assert!((cr - 230).abs() <= 1, "right crossings {cr}");
        let peak_l = l.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        let peak_r = r.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert_abs_diff_eq!(peak_l, 0.2, epsilon = 1e-3);
        assert_abs_diff_eq!(peak_r, 0.2, epsilon = 1e-3);
    }

    #[test]
    fn tuning_reference_scales_carrier() {
        let mut gen = SignalGenerator::new(SR, NoiseColor::Pink, 0.0, Some(4));
        let mut v = values(Mode::Binaural, 216.0, 0.1, 0.5);
        v.tuning_reference = 528.0;
        let (l, _) = render(&mut gen, &v, SR as usize);
        let c = rising_crossings(&l) as i64;
        assert!((c - 264).abs() <= 1, "crossings {c}");
    }

    #[test]
    fn monaural_sends_the_same_mix_to_both_ears() {
        let mut gen = SignalGenerator::new(SR, NoiseColor::Pink, 0.0, Some(5));
        let v = values(Mode::Monaural, 200.0, 4.0, 0.6);
        let (l, r) = render(&mut gen, &v, 48_000);
        assert_eq!(l, r);
        // the 4 Hz beat shows up as an amplitude envelope reaching ~0 and ~amp
        let peak = l.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert_abs_diff_eq!(peak, 0.6, epsilon = 5e-3);
        // nulls every 250 ms, the first at 125 ms
        let quiet = l
            .chunks(240)
            .map(|w| w.iter().fold(0.0f32, |m, s| m.max(s.abs())))
            .fold(f32::MAX, f32::min);
        assert!(quiet < 0.3, "beat envelope never dipped: {quiet}");
    }

    #[test]
    fn isochronic_scenario_envelope_range() {
        let mut gen = SignalGenerator::new(SR, NoiseColor::Pink, 1e-5, Some(6));
        let mut v = values(Mode::Isochronic, 200.0, 6.0, 1.0);
        v.isochronic_depth = 0.5;
        let (l, r) = render(&mut gen, &v, SR as usize);
        for (a, b) in l.iter().zip(&r) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-4);
        }
        // one carrier period at 200 Hz is 240 samples
        let peaks: Vec<f32> = l
            .chunks(240)
            .map(|w| w.iter().fold(0.0f32, |m, s| m.max(s.abs())))
            .collect();
        let lo = peaks.iter().copied().fold(f32::MAX, f32::min);
        let hi = peaks.iter().copied().fold(0.0f32, f32::max);
        assert_abs_diff_eq!(lo, 0.5, epsilon = 0.02);
        assert_abs_diff_eq!(hi, 1.0, epsilon = 0.02);
        // six pulses a second: the envelope drops through its midpoint six times
        let dips = peaks.windows(2).filter(|w| w[0] >= 0.75 && w[1] < 0.75).count() as i64;
        assert!((dips - 6).abs() <= 1, "pulses {dips}");
        let c = rising_crossings(&l) as i64;
        assert!((c - 200).abs() <= 1, "carrier crossings {c}");
    }

    #[test]
    fn isochronic_envelope_extremes() {
        let trough = 1.5 * std::f64::consts::PI;
        assert_abs_diff_eq!(isochronic_envelope(1.0, trough), 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(isochronic_envelope(1.0, 0.5 * std::f64::consts::PI), 1.0, epsilon = 1e-7);
        for k in 0..64 {
            let phase = TAU * k as f64 / 64.0;
            assert_eq!(isochronic_envelope(0.0, phase), 1.0);
            assert!(isochronic_envelope(0.3, phase) >= 0.7 - 1e-6);
        }
    }

    #[test]
    fn curves_override_scalars_per_sample() {
        let mut gen = SignalGenerator::new(SR, NoiseColor::Pink, 0.0, Some(8));
        let amp: Vec<f32> = (0..64).map(|i| if i < 32 { 0.0 } else { 1.0 }).collect();
        let mut params = BlockParams::constant(&values(Mode::Binaural, 440.0, 10.0, 0.0));
        params.amplitude = ParamInput::Curve(&amp);
        let mut l = vec![0.0; 64];
        let mut r = vec![0.0; 64];
        gen.process(&params, &mut l, &mut r);
        assert!(l[..32].iter().all(|s| *s == 0.0));
        assert!(l[32..].iter().any(|s| s.abs() > 0.1));
        assert_eq!(ParamInput::Curve(&[0.25]).at(40), 0.25);
    }

    #[test]
    fn noise_is_identical_in_both_channels() {
        let mut gen = SignalGenerator::new(SR, NoiseColor::White, 0.0, Some(10));
        let mut v = values(Mode::Isochronic, 200.0, 6.0, 0.0);
        v.noise_level = 1.0;
        let (l, r) = render(&mut gen, &v, 4096);
        assert_eq!(l, r);
        assert!(l.iter().any(|s| s.abs() > 1e-3));
    }

    #[test]
    fn output_is_finite_at_domain_edges() {
        for (base, beat, tuning) in [(20.0, 0.1, 400.0), (2000.0, 120.0, 600.0)] {
            for mode in [Mode::Binaural, Mode::Monaural, Mode::Isochronic] {
                let mut gen = SignalGenerator::new(8_000.0, NoiseColor::Pink, 1e-5, Some(11));
                let mut v = values(mode, base, beat, 1.0);
                v.tuning_reference = tuning;
                v.noise_level = 1.0;
                v.isochronic_depth = 1.0;
                let (l, r) = render(&mut gen, &v, 8_000);
                assert!(l.iter().chain(r.iter()).all(|s| s.is_finite()));
            }
        }
    }
}
