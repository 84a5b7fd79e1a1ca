use std::fmt;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use skillnet_network::{Architecture, DifficultyTier, LearningRate, Network};

use crate::{
    Trainer, TrainingError, TrainingRun, Trajectory, calibrate_samples, evaluate_accuracy,
    extract_samples,
};

/// Grid explored by [`Trainer::search_hyperparameters`].
///
/// Candidates are visited with the learning rate as the outer loop. ELU
/// alphas are only explored when the tier's architecture uses ELU.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub learning_rates: Vec<f64>,
    pub elu_alphas: Vec<f64>,
    /// Epochs of each candidate's short training pass.
    pub search_epochs: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            learning_rates: vec![0.001, 0.005, 0.01, 0.05],
            elu_alphas: vec![0.5, 1.0, 1.5],
            search_epochs: 10,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.learning_rates.is_empty() {
            return Err(TrainingError::configuration(
                "search grid has no learning rates",
            ));
        }
        if self.elu_alphas.is_empty() {
            return Err(TrainingError::configuration("search grid has no ELU alphas"));
        }
        if let Some(alpha) = self.elu_alphas.iter().find(|alpha| !alpha.is_finite()) {
            return Err(TrainingError::configuration(format!(
                "ELU alpha {alpha} is not finite"
            )));
        }
        if self.search_epochs == 0 {
            return Err(TrainingError::configuration(
                "search epochs must be positive",
            ));
        }
        for &rate in &self.learning_rates {
            LearningRate::new(rate)?;
        }
        Ok(())
    }

    fn grid(&self, tune_alpha: bool) -> Result<Vec<Hyperparameters>, TrainingError> {
        let mut grid = vec![];
        for &rate in &self.learning_rates {
            let learning_rate = LearningRate::new(rate)?;
            if tune_alpha {
                grid.extend(self.elu_alphas.iter().map(|&alpha| Hyperparameters {
                    learning_rate,
                    elu_alpha: Some(alpha),
                }));
            } else {
                grid.push(Hyperparameters {
                    learning_rate,
                    elu_alpha: None,
                });
            }
        }
        Ok(grid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Hyperparameters {
    pub learning_rate: LearningRate,
    /// `None` when the architecture has no ELU layer.
    pub elu_alpha: Option<f64>,
}

impl Hyperparameters {
    fn architecture(&self, base: &Architecture) -> Architecture {
        match self.elu_alpha {
            Some(alpha) => base.with_elu_alpha(alpha),
            None => base.clone(),
        }
    }
}

impl fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "learning rate {}", self.learning_rate.get())?;
        if let Some(alpha) = self.elu_alpha {
            write!(f, ", ELU alpha {alpha}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateScore {
    pub hyperparameters: Hyperparameters,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchReport {
    pub tier: DifficultyTier,
    /// Every candidate in grid order.
    pub candidates: Vec<CandidateScore>,
    /// Highest accuracy; the earliest candidate wins ties.
    pub best: CandidateScore,
    /// No validation samples were available, so candidates were scored on
    /// their own training samples.
    pub scored_on_training_set: bool,
}

#[derive(Debug, Clone)]
pub struct TuningRun {
    pub search: Option<SearchReport>,
    pub run: TrainingRun,
}

impl Trainer {
    /// Scores every grid candidate with a short training pass.
    ///
    /// Each candidate starts from a fresh network built from the tier's
    /// canonical architecture (with the candidate's ELU alpha on a private
    /// copy), trains for `search.search_epochs` epochs without checkpoints
    /// and is scored on `validation`. Nothing is saved.
    ///
    /// Candidates are scored against raw validation targets, while the
    /// accuracy logged during training uses calibrated targets, so the two
    /// figures are not comparable.
    ///
    /// Returns `None` when `dataset` has no usable samples.
    pub fn search_hyperparameters(
        &self,
        tier: DifficultyTier,
        dataset: &[Trajectory],
        validation: &[Trajectory],
        search: &SearchConfig,
    ) -> Result<Option<SearchReport>, TrainingError> {
        search.validate()?;
        let base = self.store().canonical_architecture(tier);
        let samples = extract_samples(dataset, base.input_size());
        if samples.is_empty() {
            info!("{tier}: no usable training samples, skipping hyperparameter search");
            return Ok(None);
        }
        let samples = calibrate_samples(&samples, tier, &mut self.rng(tier));

        let mut holdout = extract_samples(validation, base.input_size());
        let scored_on_training_set = holdout.is_empty();
        if scored_on_training_set {
            warn!("{tier}: no validation samples, scoring candidates on the training samples");
            holdout.clone_from(&samples);
        }

        let seed = tier.init_seed(base);
        let mut candidates = vec![];
        let mut best: Option<CandidateScore> = None;
        for hyperparameters in search.grid(base.has_elu())? {
            let mut network =
                Network::new(&hyperparameters.architecture(base), hyperparameters.learning_rate, seed);
            let mut rng = self.rng(tier);
            self.run_epochs(
                tier,
                &mut network,
                &samples,
                search.search_epochs,
                None,
                &mut rng,
            )?;
            let accuracy = evaluate_accuracy(&network, &holdout, holdout.len(), &mut rng)?;
            info!(
                "{tier}: candidate {hyperparameters}: accuracy {:.1}%",
                accuracy * 100.0
            );

            let score = CandidateScore {
                hyperparameters,
                accuracy,
            };
            if best.is_none_or(|best| accuracy > best.accuracy) {
                best = Some(score);
            }
            candidates.push(score);
        }

        let Some(best) = best else {
            return Ok(None);
        };
        info!(
            "{tier}: best candidate {} with accuracy {:.1}%",
            best.hyperparameters,
            best.accuracy * 100.0
        );
        Ok(Some(SearchReport {
            tier,
            candidates,
            best,
            scored_on_training_set,
        }))
    }

    /// Searches the grid, then trains a fresh network with the winner.
    ///
    /// The full run behaves like [`Trainer::train`] (checkpoints, final
    /// save) except that it starts from scratch instead of the stored model.
    /// Without usable samples nothing is trained or saved.
    pub fn tune_and_train(
        &self,
        tier: DifficultyTier,
        dataset: &[Trajectory],
        validation: &[Trajectory],
        search: &SearchConfig,
    ) -> Result<TuningRun, TrainingError> {
        let Some(report) = self.search_hyperparameters(tier, dataset, validation, search)? else {
            return Ok(TuningRun {
                search: None,
                run: self.untouched(tier),
            });
        };

        let best = report.best.hyperparameters;
        let base = self.store().canonical_architecture(tier);
        let mut network = Network::new(
            &best.architecture(base),
            best.learning_rate,
            tier.init_seed(base),
        );
        let mut rng = self.rng(tier);
        let samples = calibrate_samples(
            &extract_samples(dataset, base.input_size()),
            tier,
            &mut rng,
        );
        let mut training = self.fit_and_save(tier, &mut network, &samples, &mut rng)?;
        training.hyperparameters = Some(best);

        Ok(TuningRun {
            search: Some(report),
            run: TrainingRun {
                network,
                report: training,
            },
        })
    }
}
