use rand::Rng;
use skillnet_network::DifficultyTier;

use crate::TrainingSample;

/// How a tier reshapes training targets.
///
/// Targets are first pushed away from or pulled toward `0.5`:
///
/// ```text
/// t' = sign(t - 0.5) * |2 (t - 0.5)|^(1 / sharpness) / 2 + 0.5
/// ```
///
/// `sharpness > 1` sharpens (a decent move looks clearly good), `sharpness < 1`
/// flattens (every move looks about as good as any other), and `1` leaves the
/// target unchanged. Uniform noise in `±noise_level` is then added and the
/// result clamped into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationProfile {
    pub sharpness: f64,
    pub noise_level: f64,
}

impl CalibrationProfile {
    #[must_use]
    pub const fn for_tier(tier: DifficultyTier) -> Self {
        let (sharpness, noise_level) = match tier {
            DifficultyTier::Beginner => (0.5, 0.25),
            DifficultyTier::Easy => (0.75, 0.15),
            DifficultyTier::Medium => (1.0, 0.08),
            DifficultyTier::Hard => (1.5, 0.04),
            DifficultyTier::Expert => (2.0, 0.01),
        };
        Self {
            sharpness,
            noise_level,
        }
    }

    /// Deterministic part of the calibration.
    #[must_use]
    pub fn sharpen(&self, target: f64) -> f64 {
        let centered = target - 0.5;
        let magnitude = (2.0 * centered.abs()).powf(self.sharpness.recip()) / 2.0;
        (magnitude.copysign(centered) + 0.5).clamp(0.0, 1.0)
    }

    pub fn calibrate<R>(&self, target: f64, rng: &mut R) -> f64
    where
        R: Rng + ?Sized,
    {
        let noise = if self.noise_level > 0.0 {
            rng.random_range(-self.noise_level..=self.noise_level)
        } else {
            0.0
        };
        (self.sharpen(target) + noise).clamp(0.0, 1.0)
    }
}

/// Returns a calibrated copy of `samples` for `tier`; features are untouched.
pub fn calibrate_samples<R>(
    samples: &[TrainingSample],
    tier: DifficultyTier,
    rng: &mut R,
) -> Vec<TrainingSample>
where
    R: Rng + ?Sized,
{
    let profile = CalibrationProfile::for_tier(tier);
    samples
        .iter()
        .map(|sample| TrainingSample {
            features: sample.features.clone(),
            target: profile.calibrate(sample.target, rng),
        })
        .collect()
}
