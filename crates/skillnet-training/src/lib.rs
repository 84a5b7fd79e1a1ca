//! Training pipeline for difficulty-tiered decision networks.
//!
//! One replay dataset is turned into a separate model per [`DifficultyTier`]:
//!
//! ```text
//! Trajectory records
//!     ↓ pair each record with its successor      (dataset)
//! TrainingSample { features, target }
//!     ↓ sharpen/flatten + noise per tier          (calibration)
//! calibrated samples
//!     ↓ shuffled mini-batch epochs, checkpoints  (trainer)
//! Network saved through ModelStore
//! ```
//!
//! [`Trainer::search_hyperparameters`] runs short training passes over a
//! learning rate × ELU alpha grid before the full run, and [`Orchestrator`]
//! trains several tiers in parallel with a bounded wait for completion.
//!
//! [`DifficultyTier`]: skillnet_network::DifficultyTier

use skillnet_network::NetworkError;
use skillnet_store::StoreError;

pub use self::{calibration::*, dataset::*, orchestrator::*, search::*, trainer::*};

mod calibration;
mod dataset;
mod orchestrator;
mod search;
mod trainer;

/// Errors that abort a training run.
#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum TrainingError {
    #[display("invalid training configuration: {reason}")]
    #[from(skip)]
    Configuration { reason: String },
    #[display("{_0}")]
    Network(NetworkError),
    #[display("{_0}")]
    Store(StoreError),
    #[display("failed to start training workers: {_0}")]
    ThreadPool(rayon::ThreadPoolBuildError),
}

impl TrainingError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}
