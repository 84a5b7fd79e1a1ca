use std::sync::Arc;

use log::{debug, info, warn};
use rand::{
    Rng, SeedableRng as _,
    seq::{SliceRandom as _, index},
};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};
use skillnet_network::{DifficultyTier, LearningRate, Network, NetworkError};
use skillnet_store::ModelStore;

use crate::{
    Hyperparameters, TrainingError, TrainingSample, Trajectory, calibrate_samples,
    extract_samples,
};

/// Parameters of a training run, shared by every tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Name under which models are loaded and saved.
    pub model_name: String,
    pub epochs: usize,
    pub batch_size: usize,
    /// Replaces the learning rate of the loaded model when set.
    pub learning_rate: Option<f64>,
    /// Save every this many epochs; `0` disables checkpoints.
    pub checkpoint_interval: usize,
    /// Measure accuracy every this many epochs; `0` only measures at the end.
    pub evaluation_interval: usize,
    /// Upper bound on the samples scored by one accuracy measurement.
    pub evaluation_sample_size: usize,
    /// Makes shuffling, calibration noise and evaluation subsets reproducible.
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_name: "move_quality".to_owned(),
            epochs: 100,
            batch_size: 32,
            learning_rate: None,
            checkpoint_interval: 10,
            evaluation_interval: 5,
            evaluation_sample_size: 500,
            seed: None,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.model_name.is_empty() {
            return Err(TrainingError::configuration("model name must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(TrainingError::configuration("batch size must be positive"));
        }
        if self.evaluation_sample_size == 0 {
            return Err(TrainingError::configuration(
                "evaluation sample size must be positive",
            ));
        }
        if let Some(rate) = self.learning_rate {
            LearningRate::new(rate)?;
        }
        Ok(())
    }
}

/// Progress of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EpochStats {
    /// 1-based epoch number.
    pub epoch: usize,
    /// Mean squared error over every sample of the epoch.
    pub mean_error: f64,
    /// Set on evaluation epochs.
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub tier: DifficultyTier,
    pub sample_count: usize,
    pub epochs: Vec<EpochStats>,
    pub final_accuracy: Option<f64>,
    /// Set when the run used hyperparameters chosen by a search.
    pub hyperparameters: Option<Hyperparameters>,
    /// Whether the final model was written to the store.
    pub saved: bool,
}

impl TrainingReport {
    fn empty(tier: DifficultyTier) -> Self {
        Self {
            tier,
            sample_count: 0,
            epochs: vec![],
            final_accuracy: None,
            hyperparameters: None,
            saved: false,
        }
    }

    #[must_use]
    pub fn epochs_run(&self) -> usize {
        self.epochs.len()
    }

    #[must_use]
    pub fn final_error(&self) -> Option<f64> {
        self.epochs.last().map(|stats| stats.mean_error)
    }
}

/// The trained network together with how it got there.
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub network: Network,
    pub report: TrainingReport,
}

/// Where periodic snapshots of a run go.
pub(crate) struct Checkpoint<'a> {
    store: &'a ModelStore,
    name: &'a str,
    tier: DifficultyTier,
    interval: usize,
}

impl Checkpoint<'_> {
    fn save_if_due(&self, network: &Network, epoch: usize) {
        if self.interval == 0 || epoch % self.interval != 0 {
            return;
        }
        match self.store.save_model(self.name, self.tier, network) {
            Ok(_) => debug!("{}: checkpoint saved at epoch {epoch}", self.tier),
            Err(err) => warn!(
                "{}: checkpoint at epoch {epoch} failed, continuing: {err}",
                self.tier
            ),
        }
    }
}

/// Trains networks held by a [`ModelStore`].
///
/// The trainer never mutates a cached network in place: it trains a private
/// copy and publishes it through checkpoints and the final save.
#[derive(Debug)]
pub struct Trainer {
    store: Arc<ModelStore>,
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(store: Arc<ModelStore>, config: TrainingConfig) -> Result<Self, TrainingError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    #[must_use]
    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub(crate) fn rng(&self, tier: DifficultyTier) -> Pcg32 {
        match self.config.seed {
            Some(seed) => Pcg32::seed_from_u64(seed.wrapping_add(tier.ordinal() as u64)),
            None => Pcg32::from_rng(&mut rand::rng()),
        }
    }

    /// The current model of `tier`, unchanged.
    pub(crate) fn untouched(&self, tier: DifficultyTier) -> TrainingRun {
        let network = self
            .store
            .load_model(&self.config.model_name, tier)
            .read()
            .clone();
        TrainingRun {
            network,
            report: TrainingReport::empty(tier),
        }
    }

    /// Continues training the stored model of `tier` on `dataset`.
    ///
    /// The model is loaded (or created) through the store, trained for the
    /// configured number of epochs on tier-calibrated targets, checkpointed
    /// periodically and saved at the end. A dataset without a single usable
    /// sample is a no-op: nothing is trained or saved.
    pub fn train(
        &self,
        tier: DifficultyTier,
        dataset: &[Trajectory],
    ) -> Result<TrainingRun, TrainingError> {
        let mut run = self.untouched(tier);
        if let Some(rate) = self.config.learning_rate {
            run.network.set_learning_rate(LearningRate::new(rate)?);
        }

        let samples = extract_samples(dataset, run.network.input_size());
        if samples.is_empty() {
            info!("{tier}: no usable training samples, keeping the current model");
            return Ok(run);
        }

        let mut rng = self.rng(tier);
        let samples = calibrate_samples(&samples, tier, &mut rng);
        run.report = self.fit_and_save(tier, &mut run.network, &samples, &mut rng)?;
        Ok(run)
    }

    /// Full training run on already calibrated samples, with checkpoints and a
    /// final save.
    pub(crate) fn fit_and_save<R>(
        &self,
        tier: DifficultyTier,
        network: &mut Network,
        samples: &[TrainingSample],
        rng: &mut R,
    ) -> Result<TrainingReport, TrainingError>
    where
        R: Rng + ?Sized,
    {
        info!(
            "{tier}: training {} on {} samples for {} epochs (learning rate {})",
            network.architecture(),
            samples.len(),
            self.config.epochs,
            network.learning_rate().get()
        );
        let checkpoint = Checkpoint {
            store: &self.store,
            name: &self.config.model_name,
            tier,
            interval: self.config.checkpoint_interval,
        };
        let (epochs, final_accuracy) = self.run_epochs(
            tier,
            network,
            samples,
            self.config.epochs,
            Some(&checkpoint),
            rng,
        )?;

        self.store
            .save_model(&self.config.model_name, tier, network)?;
        info!(
            "{tier}: saved model to {}",
            self.store
                .model_path(&self.config.model_name, tier)
                .display()
        );

        Ok(TrainingReport {
            tier,
            sample_count: samples.len(),
            epochs,
            final_accuracy: Some(final_accuracy),
            hyperparameters: None,
            saved: true,
        })
    }

    /// The epoch loop shared by full runs and search passes.
    ///
    /// Returns per-epoch statistics and the accuracy after the last epoch.
    pub(crate) fn run_epochs<R>(
        &self,
        tier: DifficultyTier,
        network: &mut Network,
        samples: &[TrainingSample],
        epochs: usize,
        checkpoint: Option<&Checkpoint<'_>>,
        rng: &mut R,
    ) -> Result<(Vec<EpochStats>, f64), NetworkError>
    where
        R: Rng + ?Sized,
    {
        let interval = self.config.evaluation_interval;
        let limit = self.config.evaluation_sample_size;
        let mut order: Vec<usize> = (0..samples.len()).collect();
        let mut stats = Vec::with_capacity(epochs);
        let mut inputs = Vec::with_capacity(self.config.batch_size);
        let mut targets = Vec::with_capacity(self.config.batch_size);

        for epoch in 1..=epochs {
            order.shuffle(rng);
            let mut total = 0.0;
            for batch in order.chunks(self.config.batch_size) {
                inputs.clear();
                targets.clear();
                for &i in batch {
                    inputs.push(samples[i].features.as_slice());
                    targets.push(samples[i].target);
                }
                total += network.train_batch(&inputs, &targets)? * as_f64(batch.len());
            }
            let mean_error = total / as_f64(samples.len());

            let accuracy = if interval > 0 && epoch % interval == 0 {
                let accuracy = evaluate_accuracy(network, samples, limit, rng)?;
                info!(
                    "{tier}: epoch {epoch}/{epochs}: error {mean_error:.6}, accuracy {:.1}%",
                    accuracy * 100.0
                );
                Some(accuracy)
            } else {
                debug!("{tier}: epoch {epoch}/{epochs}: error {mean_error:.6}");
                None
            };
            stats.push(EpochStats {
                epoch,
                mean_error,
                accuracy,
            });

            if let Some(checkpoint) = checkpoint {
                checkpoint.save_if_due(network, epoch);
            }
        }

        let final_accuracy = match stats.last().and_then(|last| last.accuracy) {
            Some(accuracy) => accuracy,
            None => evaluate_accuracy(network, samples, limit, rng)?,
        };
        Ok((stats, final_accuracy))
    }
}

/// Fraction of samples whose score falls on the same side of `0.5` as the target.
///
/// At most `limit` randomly chosen samples are scored. Returns `0.0` when
/// there is nothing to score.
pub fn evaluate_accuracy<R>(
    network: &Network,
    samples: &[TrainingSample],
    limit: usize,
    rng: &mut R,
) -> Result<f64, NetworkError>
where
    R: Rng + ?Sized,
{
    let count = samples.len().min(limit);
    if count == 0 {
        return Ok(0.0);
    }
    let correct = if count == samples.len() {
        count_correct(network, samples.iter())?
    } else {
        count_correct(
            network,
            index::sample(rng, samples.len(), count)
                .into_iter()
                .map(|i| &samples[i]),
        )?
    };
    Ok(as_f64(correct) / as_f64(count))
}

fn count_correct<'a, I>(network: &Network, samples: I) -> Result<usize, NetworkError>
where
    I: IntoIterator<Item = &'a TrainingSample>,
{
    let mut correct = 0;
    for sample in samples {
        let score = network.predict(&sample.features)?;
        if (score >= 0.5) == (sample.target >= 0.5) {
            correct += 1;
        }
    }
    Ok(correct)
}

#[expect(clippy::cast_precision_loss)]
fn as_f64(n: usize) -> f64 {
    n as f64
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::SeedableRng as _;
    use skillnet_network::{ActivationFunction, Architecture};
    use tempfile::TempDir;

    use super::*;
    use crate::ReplayRecord;

    const NAME: &str = "move_quality";

    fn store(dir: &TempDir) -> Arc<ModelStore> {
        let architecture = Architecture::new(
            vec![2, 4, 1],
            vec![ActivationFunction::Tanh, ActivationFunction::Linear],
        )
        .unwrap();
        Arc::new(ModelStore::new(
            dir.path(),
            architecture,
            LearningRate::new(0.05).unwrap(),
        ))
    }

    fn config() -> TrainingConfig {
        TrainingConfig {
            model_name: NAME.to_owned(),
            epochs: 60,
            batch_size: 4,
            checkpoint_interval: 20,
            evaluation_interval: 10,
            seed: Some(7),
            ..TrainingConfig::default()
        }
    }

    /// Two-record trajectories whose first record is on the side of the
    /// diagonal given by the second record's outcome.
    fn separable_dataset() -> Vec<Trajectory> {
        (0..40_i32)
            .map(|i| {
                let x = f64::from(i % 10 + 1) / 10.0;
                let (features, outcome) = if i % 2 == 0 {
                    (vec![x, -x], 1.0)
                } else {
                    (vec![-x, x], 0.0)
                };
                Trajectory::new(vec![
                    ReplayRecord {
                        features,
                        outcome: 0.5,
                    },
                    ReplayRecord {
                        features: vec![0.0, 0.0],
                        outcome,
                    },
                ])
            })
            .collect()
    }

    #[test]
    fn test_config_validation() {
        assert!(config().validate().is_ok());
        let bad = [
            TrainingConfig {
                batch_size: 0,
                ..config()
            },
            TrainingConfig {
                learning_rate: Some(0.0),
                ..config()
            },
            TrainingConfig {
                model_name: String::new(),
                ..config()
            },
            TrainingConfig {
                evaluation_sample_size: 0,
                ..config()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: TrainingConfig = serde_json::from_str(r#"{"epochs": 3}"#).unwrap();
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, TrainingConfig::default().batch_size);
        assert_eq!(config.model_name, "move_quality");
    }

    #[test]
    fn test_empty_dataset_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let trainer = Trainer::new(Arc::clone(&store), config()).unwrap();

        let run = trainer.train(DifficultyTier::Easy, &[]).unwrap();
        assert_eq!(run.report.epochs_run(), 0);
        assert!(!run.report.saved);
        assert_eq!(run.network, store.default_network(DifficultyTier::Easy));
        assert!(!store.model_path(NAME, DifficultyTier::Easy).exists());

        // features of the wrong length are not usable either
        let dataset = vec![Trajectory::new(vec![
            ReplayRecord {
                features: vec![1.0, 2.0, 3.0],
                outcome: 0.5,
            },
            ReplayRecord {
                features: vec![1.0, 2.0, 3.0],
                outcome: 0.5,
            },
        ])];
        let run = trainer.train(DifficultyTier::Easy, &dataset).unwrap();
        assert!(!run.report.saved);
    }

    #[test]
    fn test_training_learns_and_saves() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let trainer = Trainer::new(Arc::clone(&store), config()).unwrap();

        let run = trainer
            .train(DifficultyTier::Medium, &separable_dataset())
            .unwrap();
        let report = &run.report;
        assert_eq!(report.sample_count, 40);
        assert_eq!(report.epochs_run(), 60);
        assert!(report.saved);
        assert_eq!(
            report
                .epochs
                .iter()
                .filter(|stats| stats.accuracy.is_some())
                .count(),
            6
        );
        assert!(report.final_error().unwrap() < report.epochs[0].mean_error);
        assert!(report.final_accuracy.unwrap() >= 0.9);

        let cached = store.load_model(NAME, DifficultyTier::Medium);
        assert_eq!(*cached.read(), run.network);
        assert!(store.model_path(NAME, DifficultyTier::Medium).is_file());
    }

    #[test]
    fn test_learning_rate_override() {
        let dir = TempDir::new().unwrap();
        let config = TrainingConfig {
            learning_rate: Some(0.02),
            epochs: 2,
            ..config()
        };
        let trainer = Trainer::new(store(&dir), config).unwrap();
        let run = trainer
            .train(DifficultyTier::Hard, &separable_dataset())
            .unwrap();
        assert_eq!(run.network.learning_rate(), LearningRate::new(0.02).unwrap());
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let run = || {
            let dir = TempDir::new().unwrap();
            let trainer = Trainer::new(store(&dir), config()).unwrap();
            trainer
                .train(DifficultyTier::Beginner, &separable_dataset())
                .unwrap()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.network, b.network);
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn test_failed_final_save_is_returned() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs_block(&store.model_path(NAME, DifficultyTier::Expert));
        let trainer = Trainer::new(store, config()).unwrap();

        let err = trainer
            .train(DifficultyTier::Expert, &separable_dataset())
            .unwrap_err();
        assert!(matches!(err, TrainingError::Store(_)));
    }

    fn fs_block(path: &std::path::Path) {
        std::fs::create_dir_all(path.join("occupied")).unwrap();
    }

    #[test]
    fn test_evaluate_accuracy() {
        let network = Network::from_parts(
            vec![1, 1],
            vec![array![[1.0]]],
            vec![array![0.0]],
            vec![ActivationFunction::Linear],
            LearningRate::new(0.1).unwrap(),
        )
        .unwrap();
        let samples = vec![
            TrainingSample {
                features: vec![0.9],
                target: 1.0,
            },
            TrainingSample {
                features: vec![0.2],
                target: 0.0,
            },
            TrainingSample {
                features: vec![0.8],
                target: 0.1,
            },
        ];
        let mut rng = Pcg32::seed_from_u64(1);

        let accuracy = evaluate_accuracy(&network, &samples, 10, &mut rng).unwrap();
        approx::assert_abs_diff_eq!(accuracy, 2.0 / 3.0, epsilon = 1e-12);

        let subset = evaluate_accuracy(&network, &samples, 2, &mut rng).unwrap();
        assert!(subset == 0.5 || subset == 1.0, "{subset}");

        assert_eq!(evaluate_accuracy(&network, &[], 10, &mut rng).unwrap(), 0.0);
    }

    #[test]
    fn test_checkpoint_saves_on_interval_multiples() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let network = store.default_network(DifficultyTier::Hard);
        let path = store.model_path(NAME, DifficultyTier::Hard);
        let checkpoint = Checkpoint {
            store: &store,
            name: NAME,
            tier: DifficultyTier::Hard,
            interval: 2,
        };

        checkpoint.save_if_due(&network, 1);
        assert!(!path.exists());
        assert!(!store.is_cached(NAME, DifficultyTier::Hard));

        checkpoint.save_if_due(&network, 2);
        assert!(path.is_file());
        assert!(store.is_cached(NAME, DifficultyTier::Hard));
    }

    #[test]
    fn test_checkpoint_with_zero_interval_never_saves() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let network = store.default_network(DifficultyTier::Easy);
        let checkpoint = Checkpoint {
            store: &store,
            name: NAME,
            tier: DifficultyTier::Easy,
            interval: 0,
        };
        for epoch in 0..5 {
            checkpoint.save_if_due(&network, epoch);
        }
        assert!(!store.model_path(NAME, DifficultyTier::Easy).exists());
    }

    #[test]
    fn test_failed_checkpoint_lets_training_continue() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.model_path(NAME, DifficultyTier::Medium);
        std::fs::create_dir_all(path.join("occupied")).unwrap();
        let checkpoint = Checkpoint {
            store: &store,
            name: NAME,
            tier: DifficultyTier::Medium,
            interval: 1,
        };
        let trainer = Trainer::new(Arc::clone(&store), config()).unwrap();
        let mut network = store.default_network(DifficultyTier::Medium);
        let samples = vec![
            TrainingSample {
                features: vec![1.0, 0.0],
                target: 1.0,
            },
            TrainingSample {
                features: vec![-1.0, 0.0],
                target: 0.0,
            },
        ];
        let mut rng = Pcg32::seed_from_u64(3);

        let (stats, _) = trainer
            .run_epochs(
                DifficultyTier::Medium,
                &mut network,
                &samples,
                3,
                Some(&checkpoint),
                &mut rng,
            )
            .unwrap();
        assert_eq!(stats.len(), 3);
        assert!(path.is_dir());
        assert!(!store.is_cached(NAME, DifficultyTier::Medium));
    }
}
