use serde::{Deserialize, Serialize};

use crate::Architecture;

/// Skill level a model is trained for, ordered from most forgiving to most exacting.
///
/// The tier is part of a model's identity and selects how training targets are
/// recalibrated, so one replay dataset yields a distinct model per tier.
///
/// Parsing is case-insensitive (`"expert"`, `"Expert"`); display and
/// serialization use the lowercase name, which is also the prefix of the
/// persisted model file.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::FromStr,
)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    #[display("beginner")]
    Beginner,
    #[display("easy")]
    Easy,
    #[display("medium")]
    Medium,
    #[display("hard")]
    Hard,
    #[display("expert")]
    Expert,
}

const SEED_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

impl DifficultyTier {
    pub const LEN: usize = 5;

    pub const ALL: [Self; Self::LEN] = [
        Self::Beginner,
        Self::Easy,
        Self::Medium,
        Self::Hard,
        Self::Expert,
    ];

    /// Position in [`Self::ALL`]; `Beginner` is 0.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// Deterministic initialization seed for a fresh network of `architecture` at this tier.
    ///
    /// Derived from `(ordinal + 1) * constant * architecture hash`, so
    /// retraining from scratch with the same configuration reproduces the
    /// same initial weights.
    #[must_use]
    pub fn init_seed(self, architecture: &Architecture) -> u64 {
        (self.ordinal() as u64 + 1)
            .wrapping_mul(SEED_MULTIPLIER)
            .wrapping_mul(architecture.stable_hash())
    }
}
