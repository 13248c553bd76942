use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Gain applied to the plain white-noise layer so it sits at a level
/// comparable to the pink filter's output.
pub const WHITE_NOISE_GAIN: f32 = 0.1;

/// Spectral color of the ambient noise layer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NoiseColor {
    #[default]
    Pink,
    White,
}

/// Streaming noise source. One call yields one mono sample; no allocation.
#[derive(Debug, Clone)]
pub struct NoiseSource {
    color: NoiseColor,
    // pink filter states
    b0: f32,
    b1: f32,
    b2: f32,
    b3: f32,
    b4: f32,
    b5: f32,
}

impl NoiseSource {
    pub fn new(color: NoiseColor) -> Self {
        Self { color, b0: 0.0, b1: 0.0, b2: 0.0, b3: 0.0, b4: 0.0, b5: 0.0 }
    }

    pub fn color(&self) -> NoiseColor {
        self.color
    }

    #[inline]
    pub fn next(&mut self, rng: &mut SmallRng) -> f32 {
        let w = rng.gen::<f32>() * 2.0 - 1.0;
        match self.color {
            NoiseColor::White => w * WHITE_NOISE_GAIN,
            NoiseColor::Pink => {
                // Paul Kellet's economy filter bank
                self.b0 = 0.99886 * self.b0 + w * 0.0555179;
                self.b1 = 0.99332 * self.b1 + w * 0.0750759;
                self.b2 = 0.96900 * self.b2 + w * 0.1538520;
                self.b3 = 0.86650 * self.b3 + w * 0.3104856;
                self.b4 = 0.55000 * self.b4 + w * 0.5329522;
                self.b5 = -0.7616 * self.b5 - w * 0.0168980;
                (self.b0 + self.b1 + self.b2 + self.b3 + self.b4 + self.b5) * 0.11
            }
        }
    }
}

/// Triangular-distributed dither: `(u1 + u2 - 1) * scale`, in `(-scale, scale)`.
#[inline]
pub fn tpdf_dither(rng: &mut SmallRng, scale: f32) -> f32 {
    (rng.gen::<f32>() + rng.gen::<f32>() - 1.0) * scale
}

/// Build the render-side RNG, fixed when a seed is configured.
pub fn make_rng(seed: Option<u64>) -> SmallRng {
    match seed {
        Some(s) => SmallRng::seed_from_u64(s),
        None => SmallRng::from_entropy(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pink_noise_is_bounded_and_centered() {
        let mut rng = make_rng(Some(7));
        let mut noise = NoiseSource::new(NoiseColor::Pink);
        let n = 200_000;
        let mut sum = 0.0f64;
        for _ in 0..n {
            let v = noise.next(&mut rng);
            assert!(v.is_finite());
            assert!(v.abs() < 1.0, "pink sample out of range: {v}");
            sum += v as f64;
        }
        assert!((sum / n as f64).abs() < 0.05);
    }

    #[test]
    fn white_noise_respects_gain() {
        let mut rng = make_rng(Some(1));
        let mut noise = NoiseSource::new(NoiseColor::White);
        for _ in 0..10_000 {
            assert!(noise.next(&mut rng).abs() <= WHITE_NOISE_GAIN);
        }
    }

    #[test]
    fn dither_stays_inaudible() {
        let mut rng = make_rng(Some(3));
        let k = 1.0e-5;
        let mut nonzero = false;
        for _ in 0..10_000 {
            let d = tpdf_dither(&mut rng, k);
            assert!(d.abs() <= k);
            nonzero |= d != 0.0;
        }
        assert!(nonzero);
    }

    #[test]
    fn seeded_rng_is_reproducible() {
        let mut a = make_rng(Some(42));
        let mut b = make_rng(Some(42));
        for _ in 0..16 {
            assert_eq!(tpdf_dither(&mut a, 1.0), tpdf_dither(&mut b, 1.0));
        }
    }
}
