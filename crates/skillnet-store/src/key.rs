use std::fmt;

use serde::{Deserialize, Serialize};
use skillnet_network::DifficultyTier;

/// Identity of a persisted model: its name and the tier it was trained for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelKey {
    pub name: String,
    pub tier: DifficultyTier,
}

impl ModelKey {
    pub fn new(name: impl Into<String>, tier: DifficultyTier) -> Self {
        Self {
            name: name.into(),
            tier,
        }
    }

    /// File name of the model without extension, e.g. `hard_move_quality`.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.tier, self.name)
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.tier)
    }
}
