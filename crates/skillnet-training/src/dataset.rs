use log::debug;
use rand::{Rng, seq::SliceRandom as _};
use serde::{Deserialize, Serialize};

/// One recorded decision point: the features the bot saw and how good the
/// situation turned out to be, in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub features: Vec<f64>,
    pub outcome: f64,
}

/// Records of one match in play order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory {
    pub records: Vec<ReplayRecord>,
}

impl Trajectory {
    #[must_use]
    pub fn new(records: Vec<ReplayRecord>) -> Self {
        Self { records }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub features: Vec<f64>,
    pub target: f64,
}

/// Builds supervised samples from trajectories.
///
/// Each record is paired with the record that follows it: the features come
/// from the earlier record and the target is the later record's outcome, so
/// the network learns to predict where a decision leads. The last record of a
/// trajectory never becomes an input.
///
/// Pairs whose features do not have `input_size` finite values, or whose
/// outcome is not a finite value in `[0, 1]`, are dropped.
#[must_use]
pub fn extract_samples(trajectories: &[Trajectory], input_size: usize) -> Vec<TrainingSample> {
    let mut samples = vec![];
    let mut dropped = 0;
    for trajectory in trajectories {
        for pair in trajectory.records.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            let features_ok = current.features.len() == input_size
                && current.features.iter().all(|x| x.is_finite());
            let outcome_ok = next.outcome.is_finite() && (0.0..=1.0).contains(&next.outcome);
            if features_ok && outcome_ok {
                samples.push(TrainingSample {
                    features: current.features.clone(),
                    target: next.outcome,
                });
            } else {
                dropped += 1;
            }
        }
    }
    if dropped > 0 {
        debug!(
            "dropped {dropped} malformed record pairs (expected {input_size} features, outcome in [0, 1])"
        );
    }
    samples
}

/// Randomly moves `fraction` of the trajectories into a validation set.
///
/// Splitting whole trajectories keeps consecutive, highly correlated records
/// on the same side. Returns `(training, validation)`.
pub fn split_validation<R>(
    mut trajectories: Vec<Trajectory>,
    fraction: f64,
    rng: &mut R,
) -> (Vec<Trajectory>, Vec<Trajectory>)
where
    R: Rng + ?Sized,
{
    trajectories.shuffle(rng);
    #[expect(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let count = (trajectories.len() as f64 * fraction.clamp(0.0, 1.0)).round() as usize;
    let validation = trajectories.split_off(trajectories.len() - count);
    (trajectories, validation)
}
