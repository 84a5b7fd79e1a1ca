use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use log::{debug, warn};
use parking_lot::RwLock;
use skillnet_network::{Architecture, DifficultyTier, LearningRate, Network};

use crate::{ModelFile, ModelKey, StoreError};

/// A cached network handle.
///
/// Many readers may score with the network concurrently; training takes the
/// write lock. Trainers normally work on a private clone and only publish the
/// result through [`ModelStore::save_model`].
///
/// A save caches a new handle holding a copy of the saved network. Handles
/// obtained before the save keep the old network and never see the update.
pub type SharedNetwork = Arc<RwLock<Network>>;

/// File-backed model registry with a concurrent in-memory cache.
///
/// Within one store, loading the same key twice yields the same
/// [`SharedNetwork`] instance until the entry is replaced by a save or dropped
/// by [`Self::invalidate`] / [`Self::clear_cache`].
#[derive(Debug)]
pub struct ModelStore {
    models_dir: PathBuf,
    default_architecture: Architecture,
    tier_architectures: BTreeMap<DifficultyTier, Architecture>,
    default_learning_rate: LearningRate,
    cache: DashMap<ModelKey, SharedNetwork>,
}

impl ModelStore {
    pub fn new(
        models_dir: impl Into<PathBuf>,
        default_architecture: Architecture,
        default_learning_rate: LearningRate,
    ) -> Self {
        Self {
            models_dir: models_dir.into(),
            default_architecture,
            tier_architectures: BTreeMap::new(),
            default_learning_rate,
            cache: DashMap::new(),
        }
    }

    /// Overrides the canonical architecture used for `tier`'s default models.
    #[must_use]
    pub fn with_tier_architecture(mut self, tier: DifficultyTier, architecture: Architecture) -> Self {
        self.tier_architectures.insert(tier, architecture);
        self
    }

    #[must_use]
    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    #[must_use]
    pub fn default_learning_rate(&self) -> LearningRate {
        self.default_learning_rate
    }

    /// Architecture a freshly created model of `tier` is built from.
    #[must_use]
    pub fn canonical_architecture(&self, tier: DifficultyTier) -> &Architecture {
        self.tier_architectures
            .get(&tier)
            .unwrap_or(&self.default_architecture)
    }

    /// A freshly initialized network for `tier`, seeded from the tier and its
    /// canonical architecture.
    #[must_use]
    pub fn default_network(&self, tier: DifficultyTier) -> Network {
        Network::for_tier(
            self.canonical_architecture(tier),
            tier,
            self.default_learning_rate,
        )
    }

    #[must_use]
    pub fn model_path(&self, name: &str, tier: DifficultyTier) -> PathBuf {
        self.path_for(&ModelKey::new(name, tier))
    }

    fn path_for(&self, key: &ModelKey) -> PathBuf {
        self.models_dir.join(format!("{}.json", key.file_stem()))
    }

    fn read_network(&self, key: &ModelKey) -> Result<Network, StoreError> {
        let path = self.path_for(key);
        let file = ModelFile::open(&path)?;
        file.to_network()
            .map_err(|source| StoreError::Network { path, source })
    }

    /// Returns the cached network for `(name, tier)`, loading it on a miss.
    ///
    /// Any failure to read the model file is logged and answered with
    /// [`Self::default_network`], which is then cached like a loaded model.
    pub fn load_model(&self, name: &str, tier: DifficultyTier) -> SharedNetwork {
        let key = ModelKey::new(name, tier);
        if let Some(entry) = self.cache.get(&key) {
            return Arc::clone(entry.value());
        }

        let network = match self.read_network(&key) {
            Ok(network) => {
                debug!("loaded model {key} from {}", self.path_for(&key).display());
                network
            }
            Err(err) => {
                warn!("{err}; using a fresh default model for {key}");
                self.default_network(tier)
            }
        };

        // another thread may have loaded the same key meanwhile; keep its instance
        let entry = self
            .cache
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(network)));
        Arc::clone(entry.value())
    }

    /// Persists `network` and makes a copy of it the cached instance for the key.
    ///
    /// On failure the cache is left untouched.
    pub fn save_model(
        &self,
        name: &str,
        tier: DifficultyTier,
        network: &Network,
    ) -> Result<SharedNetwork, StoreError> {
        let key = ModelKey::new(name, tier);
        let path = self.path_for(&key);
        ModelFile::from_network(&key, network).save(&path)?;
        debug!("saved model {key} to {}", path.display());

        let shared = Arc::new(RwLock::new(network.clone()));
        self.cache.insert(key, Arc::clone(&shared));
        Ok(shared)
    }

    /// Drops the cached entry so the next load rereads the file.
    pub fn invalidate(&self, name: &str, tier: DifficultyTier) {
        self.cache.remove(&ModelKey::new(name, tier));
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn is_cached(&self, name: &str, tier: DifficultyTier) -> bool {
        self.cache.contains_key(&ModelKey::new(name, tier))
    }

    /// Keys currently held in the cache, sorted.
    #[must_use]
    pub fn cached_keys(&self) -> Vec<ModelKey> {
        let mut keys: Vec<_> = self.cache.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }
}
