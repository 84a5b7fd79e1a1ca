//! Feed-forward decision network used by the bot to score candidate actions.
//!
//! The crate is deliberately small: a linear stack of fully-connected layers,
//! one activation function per layer transition, and plain stochastic
//! gradient descent.
//!
//! # Components
//!
//! - [`ActivationFunction`] - scalar nonlinearity with its derivative
//! - [`Architecture`] - immutable topology template (layer sizes + activations)
//! - [`DifficultyTier`] - skill level a network is trained for
//! - [`Network`] - trainable weights and biases with forward and backward passes
//!
//! # Output Contract
//!
//! [`Network::predict`] always returns a value in `[0, 1]`. The first output
//! neuron is clamped regardless of the last activation's natural range, so
//! callers can treat the score as a bounded quality estimate.
//!
//! # Example
//!
//! ```
//! use skillnet_network::{ActivationFunction, Architecture, DifficultyTier, LearningRate, Network};
//!
//! let architecture = Architecture::new(
//!     vec![2, 4, 1],
//!     vec![ActivationFunction::Tanh, ActivationFunction::Linear],
//! )
//! .unwrap();
//! let learning_rate = LearningRate::new(0.05).unwrap();
//! let mut network = Network::for_tier(&architecture, DifficultyTier::Medium, learning_rate);
//!
//! let error = network.train(&[0.5, -0.5], 1.0).unwrap();
//! assert!(error >= 0.0);
//!
//! let score = network.predict(&[0.5, -0.5]).unwrap();
//! assert!((0.0..=1.0).contains(&score));
//! ```

pub use self::{activation::*, architecture::*, network::*, tier::*};

mod activation;
mod architecture;
mod network;
mod tier;

/// Errors raised by network construction, inference and training.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum NetworkError {
    /// The topology or a hyperparameter is unusable.
    #[display("invalid network configuration: {reason}")]
    Configuration { reason: String },
    /// An input vector does not match the input layer.
    #[display("input has {actual} values but the input layer expects {expected}")]
    InputSize { expected: usize, actual: usize },
    /// A batch has a different number of inputs and targets.
    #[display("batch has {inputs} inputs but {targets} targets")]
    SizeMismatch { inputs: usize, targets: usize },
}

impl NetworkError {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}
