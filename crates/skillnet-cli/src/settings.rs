use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use skillnet_network::{Architecture, DifficultyTier, LearningRate};
use skillnet_store::ModelStore;
use skillnet_training::{SearchConfig, TrainingConfig};

use crate::util;

/// Contents of the training settings file.
///
/// Only `architecture` is required; everything else has a default.
///
/// ```json
/// {
///   "models_dir": "models",
///   "architecture": {
///     "layer_sizes": [24, 32, 1],
///     "activations": [{"type": "elu", "alpha": 1.0}, {"type": "linear"}]
///   },
///   "tiers": ["easy", "hard"],
///   "training": {"epochs": 50, "batch_size": 16},
///   "timeout_secs": 600
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TrainerSettings {
    #[serde(default = "default_models_dir")]
    pub(crate) models_dir: PathBuf,
    /// Canonical architecture of every tier without an override.
    pub(crate) architecture: Architecture,
    #[serde(default)]
    pub(crate) tier_architectures: BTreeMap<DifficultyTier, Architecture>,
    /// Learning rate of freshly created models.
    #[serde(default = "default_learning_rate")]
    pub(crate) default_learning_rate: f64,
    #[serde(default = "default_tiers")]
    pub(crate) tiers: Vec<DifficultyTier>,
    #[serde(default)]
    pub(crate) training: TrainingConfig,
    #[serde(default)]
    pub(crate) search: SearchConfig,
    /// Share of trajectories held out for scoring search candidates.
    #[serde(default = "default_validation_fraction")]
    pub(crate) validation_fraction: f64,
    /// How long to wait for all tiers before giving up on confirmation.
    #[serde(default = "default_timeout_secs")]
    pub(crate) timeout_secs: u64,
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_tiers() -> Vec<DifficultyTier> {
    DifficultyTier::ALL.to_vec()
}

fn default_validation_fraction() -> f64 {
    0.2
}

fn default_timeout_secs() -> u64 {
    3600
}

impl TrainerSettings {
    pub(crate) fn open(path: &std::path::Path) -> anyhow::Result<Self> {
        let settings: Self = util::read_json_file("settings", path)?;
        settings
            .validate()
            .with_context(|| format!("Invalid settings file: {}", path.display()))?;
        Ok(settings)
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        LearningRate::new(self.default_learning_rate)?;
        self.training.validate()?;
        anyhow::ensure!(
            (0.0..1.0).contains(&self.validation_fraction),
            "validation fraction must be in [0, 1), got {}",
            self.validation_fraction
        );
        let input_size = self.architecture.input_size();
        for (tier, architecture) in &self.tier_architectures {
            anyhow::ensure!(
                architecture.input_size() == input_size,
                "{tier} architecture takes {} inputs but the default takes {input_size}",
                architecture.input_size()
            );
        }
        Ok(())
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub(crate) fn build_store(&self) -> anyhow::Result<ModelStore> {
        let learning_rate = LearningRate::new(self.default_learning_rate)?;
        let store = self.tier_architectures.iter().fold(
            ModelStore::new(&self.models_dir, self.architecture.clone(), learning_rate),
            |store, (&tier, architecture)| store.with_tier_architecture(tier, architecture.clone()),
        );
        Ok(store)
    }
}
