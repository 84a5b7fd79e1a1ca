use std::{fmt, hash::Hasher as _};

use fxhash::FxHasher64;
use serde::{Deserialize, Serialize};

use crate::{ActivationFunction, NetworkError};

/// Immutable description of a network topology.
///
/// `layer_sizes[0]` is the input size and the last entry the output size.
/// There is exactly one activation per layer transition, so
/// `activations.len() == layer_sizes.len() - 1`.
///
/// Deserialization goes through [`Architecture::new`], so a malformed
/// configuration file is rejected instead of producing an unusable template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawArchitecture")]
pub struct Architecture {
    layer_sizes: Vec<usize>,
    activations: Vec<ActivationFunction>,
}

#[derive(Deserialize)]
struct RawArchitecture {
    layer_sizes: Vec<usize>,
    activations: Vec<ActivationFunction>,
}

impl TryFrom<RawArchitecture> for Architecture {
    type Error = NetworkError;

    fn try_from(raw: RawArchitecture) -> Result<Self, Self::Error> {
        Self::new(raw.layer_sizes, raw.activations)
    }
}

impl Architecture {
    /// Creates a validated architecture.
    ///
    /// Fails if there are fewer than two layers, a layer is empty, or the
    /// activation count does not match the number of transitions.
    pub fn new(
        layer_sizes: Vec<usize>,
        activations: Vec<ActivationFunction>,
    ) -> Result<Self, NetworkError> {
        if layer_sizes.len() < 2 {
            return Err(NetworkError::configuration(format!(
                "at least 2 layers are required, got {}",
                layer_sizes.len()
            )));
        }
        if let Some(index) = layer_sizes.iter().position(|&size| size == 0) {
            return Err(NetworkError::configuration(format!(
                "layer {index} has no neurons"
            )));
        }
        if activations.len() != layer_sizes.len() - 1 {
            return Err(NetworkError::configuration(format!(
                "{} layers need {} activations, got {}",
                layer_sizes.len(),
                layer_sizes.len() - 1,
                activations.len()
            )));
        }
        if let Some(index) = activations.iter().position(|activation| match activation {
            ActivationFunction::Elu { alpha } => !alpha.is_finite(),
            _ => false,
        }) {
            return Err(NetworkError::configuration(format!(
                "activation {index} has a non-finite ELU alpha"
            )));
        }
        Ok(Self {
            layer_sizes,
            activations,
        })
    }

    #[must_use]
    pub fn layer_sizes(&self) -> &[usize] {
        &self.layer_sizes
    }

    #[must_use]
    pub fn activations(&self) -> &[ActivationFunction] {
        &self.activations
    }

    #[must_use]
    pub fn input_size(&self) -> usize {
        self.layer_sizes[0]
    }

    #[must_use]
    pub fn output_size(&self) -> usize {
        self.layer_sizes[self.layer_sizes.len() - 1]
    }

    /// Number of weight matrices (layer transitions).
    #[must_use]
    pub fn transition_count(&self) -> usize {
        self.activations.len()
    }

    #[must_use]
    pub fn has_elu(&self) -> bool {
        self.activations.iter().any(|activation| activation.is_elu())
    }

    /// Returns a private copy whose ELU activations use `alpha`.
    ///
    /// The receiver is left untouched; hyperparameter search uses this to try
    /// candidate alphas without affecting templates shared with live models.
    #[must_use]
    pub fn with_elu_alpha(&self, alpha: f64) -> Self {
        Self {
            layer_sizes: self.layer_sizes.clone(),
            activations: self
                .activations
                .iter()
                .map(|activation| activation.with_elu_alpha(alpha))
                .collect(),
        }
    }

    /// Hash of the topology that is stable across processes and platforms.
    ///
    /// Used to derive reproducible initialization seeds.
    #[must_use]
    pub fn stable_hash(&self) -> u64 {
        let mut hasher = FxHasher64::default();
        hasher.write_u64(self.layer_sizes.len() as u64);
        for &size in &self.layer_sizes {
            hasher.write_u64(size as u64);
        }
        for activation in &self.activations {
            activation.hash_into(&mut hasher);
        }
        hasher.finish()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, size) in self.layer_sizes.iter().enumerate() {
            if i > 0 {
                write!(f, "-[{}]-", self.activations[i - 1].name())?;
            }
            write!(f, "{size}")?;
        }
        Ok(())
    }
}
