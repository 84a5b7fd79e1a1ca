use std::hash::Hasher;

use serde::{Deserialize, Serialize};

/// Per-layer activation function.
///
/// `derivative` is taken with respect to the pre-activation value, i.e. the
/// same `x` that is passed to [`Self::activate`]. ReLU is not differentiable at
/// zero; the convention here is `derivative(0) = 0`.
///
/// Serialized with a `type` tag so persisted models are self-describing:
///
/// ```text
/// {"type": "relu"}
/// {"type": "elu", "alpha": 1.0}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivationFunction {
    Linear,
    Relu,
    Elu { alpha: f64 },
    Tanh,
}

impl ActivationFunction {
    /// Shorthand for [`Self::Elu`].
    #[must_use]
    pub const fn elu(alpha: f64) -> Self {
        Self::Elu { alpha }
    }

    #[must_use]
    pub fn activate(self, x: f64) -> f64 {
        match self {
            Self::Linear => x,
            Self::Relu => x.max(0.0),
            Self::Elu { alpha } => {
                if x > 0.0 {
                    x
                } else {
                    alpha * x.exp_m1()
                }
            }
            Self::Tanh => x.tanh(),
        }
    }

    #[must_use]
    pub fn derivative(self, x: f64) -> f64 {
        match self {
            Self::Linear => 1.0,
            Self::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Elu { alpha } => {
                if x > 0.0 {
                    1.0
                } else {
                    alpha * x.exp()
                }
            }
            Self::Tanh => {
                let t = x.tanh();
                1.0 - t * t
            }
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Relu => "relu",
            Self::Elu { .. } => "elu",
            Self::Tanh => "tanh",
        }
    }

    /// Returns a copy with the ELU `alpha` replaced; other variants are returned unchanged.
    #[must_use]
    pub const fn with_elu_alpha(self, alpha: f64) -> Self {
        match self {
            Self::Elu { .. } => Self::Elu { alpha },
            other => other,
        }
    }

    #[must_use]
    pub const fn is_elu(self) -> bool {
        matches!(self, Self::Elu { .. })
    }

    pub(crate) fn hash_into<H>(self, hasher: &mut H)
    where
        H: Hasher,
    {
        match self {
            Self::Linear => hasher.write_u8(0),
            Self::Relu => hasher.write_u8(1),
            Self::Elu { alpha } => {
                hasher.write_u8(2);
                hasher.write_u64(alpha.to_bits());
            }
            Self::Tanh => hasher.write_u8(3),
        }
    }
}
