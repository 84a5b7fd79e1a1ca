//! Persistence and in-memory caching of trained networks.
//!
//! Models are addressed by a [`ModelKey`] (model name + difficulty tier) and
//! stored as one JSON file per key:
//!
//! ```text
//! <models_dir>/<tier>_<name>.json
//! ```
//!
//! [`ModelStore::load_model`] never fails: a missing or unreadable file is
//! replaced by a freshly initialized network built from the tier's canonical
//! architecture, so callers always get something they can train or query.

use std::path::PathBuf;

pub use self::{key::*, model_file::*, store::*};

mod key;
mod model_file;
mod store;

/// Errors raised while reading or writing model files.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum StoreError {
    #[display("I/O error on model file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[display("malformed model file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display(
        "model file {} has format version {found}, expected {expected}",
        path.display()
    )]
    Version {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[display("model file {} is inconsistent: {source}", path.display())]
    Network {
        path: PathBuf,
        source: skillnet_network::NetworkError,
    },
}
